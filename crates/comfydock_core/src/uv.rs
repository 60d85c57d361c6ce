use std::{path::PathBuf, process::Command};

use crate::CoreError;

/// What a sync run did (or, for dry runs, would do).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub changed: bool,
    pub output: String,
}

/// Seam for the Python package manager. The production implementation
/// shells out to uv; tests substitute a recording fake.
pub trait PackageManager {
    /// Reconcile the virtual environment with the manifest and lock file.
    fn sync(&self, all_groups: bool, dry_run: bool) -> Result<SyncReport, CoreError>;

    /// Whether the environment already matches the lock (dry-run check).
    fn is_in_sync(&self) -> Result<bool, CoreError> {
        Ok(!self.sync(true, true)?.changed)
    }
}

/// Drives the `uv` binary with a fixed project directory (the environment's
/// metadata directory) and an explicit virtual-environment path.
#[derive(Debug, Clone)]
pub struct UvClient {
    project_dir: PathBuf,
    venv_dir: PathBuf,
    cache_dir: Option<PathBuf>,
}

impl UvClient {
    pub fn new(project_dir: impl Into<PathBuf>, venv_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            venv_dir: venv_dir.into(),
            cache_dir: None,
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    fn run(&self, args: &[&str]) -> Result<String, CoreError> {
        let mut command = Command::new("uv");
        command
            .args(args)
            .current_dir(&self.project_dir)
            .env("UV_PROJECT_ENVIRONMENT", &self.venv_dir);
        if let Some(cache_dir) = &self.cache_dir {
            command.env("UV_CACHE_DIR", cache_dir);
        }

        let output = command
            .output()
            .map_err(|source| CoreError::UvSpawn { source })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(format!("{stdout}{stderr}"))
        } else {
            Err(CoreError::UvCommand {
                command: args.join(" "),
                code: output.status.code().unwrap_or(-1),
                conflicts: parse_conflicts(&stderr),
                stdout,
                stderr,
            })
        }
    }
}

impl PackageManager for UvClient {
    fn sync(&self, all_groups: bool, dry_run: bool) -> Result<SyncReport, CoreError> {
        let mut args = vec!["sync"];
        if all_groups {
            args.push("--all-groups");
        }
        if dry_run {
            args.push("--dry-run");
        }
        let output = self.run(&args)?;
        let changed = output_signals_changes(&output);
        tracing::debug!("uv sync {}: changed={changed}", if dry_run { "(dry run)" } else { "" });
        Ok(SyncReport { changed, output })
    }
}

/// uv's resolver explains conflicts in prose paragraphs starting with
/// "Because" and summarizing with "No solution found".
fn parse_conflicts(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with("Because")
                || line.starts_with("And because")
                || line.contains("No solution found")
                || line.contains("your requirements are unsatisfiable")
        })
        .map(str::to_string)
        .collect()
}

fn output_signals_changes(output: &str) -> bool {
    output.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("Would ")
            || line.starts_with("Installed ")
            || line.starts_with("Uninstalled ")
            || line.starts_with('+')
            || line.starts_with('-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_lines_are_extracted() {
        let stderr = "\
  x No solution found when resolving dependencies:
  Because torch==2.4.1 depends on numpy<2 and you require numpy>=2, we can conclude your requirements are unsatisfiable.
  hint: try relaxing the constraint
";
        let conflicts = parse_conflicts(stderr);
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts[0].contains("No solution found"));
        assert!(conflicts[1].starts_with("Because"));
    }

    #[test]
    fn change_detection_from_output() {
        assert!(output_signals_changes("Would install 3 packages\n"));
        assert!(output_signals_changes(" + numpy==2.1.0\n"));
        assert!(!output_signals_changes("Audited 41 packages in 12ms\n"));
    }
}
