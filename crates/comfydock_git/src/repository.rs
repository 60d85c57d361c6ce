use std::{
    path::{Path, PathBuf},
    process::Command,
};

use fs_err as fs;
use indexmap::IndexMap;

use crate::GitError;

/// Ignore rules written into every environment metadata repository.
const GITIGNORE: &str = "# Staging area
staging/

# Staging metadata
metadata/

# logs
logs/

# Python cache
__pycache__/
*.pyc

# Temporary files
*.tmp
*.bak
";

/// Lifecycle state of the metadata repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    Uninitialized,
    Clean,
    Dirty,
}

/// One commit in the environment history, labeled with its ordinal version.
/// The oldest commit is `v1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub label: String,
    pub hash: String,
    pub message: String,
    pub date: String,
}

/// Change classification for a workflow file in the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowChange {
    Modified,
    Added,
    Deleted,
}

impl WorkflowChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowChange::Modified => "modified",
            WorkflowChange::Added => "added",
            WorkflowChange::Deleted => "deleted",
        }
    }
}

/// A porcelain status entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub index: char,
    pub worktree: char,
    pub path: String,
}

/// Wrapper around the external `git` binary, pinned to one repository path
/// (the environment's metadata directory).
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
}

impl GitRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(args)
            .output()
            .map_err(|source| GitError::Spawn { source })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(GitError::CommandFailed {
                command: args.join(" "),
                code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    fn config_get(&self, key: &str) -> Option<String> {
        self.run(&["config", "--get", key])
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn is_initialized(&self) -> bool {
        self.path.join(".git").exists()
    }

    pub fn state(&self) -> Result<RepoState, GitError> {
        if !self.is_initialized() {
            return Ok(RepoState::Uninitialized);
        }
        if self.has_uncommitted_changes()? {
            Ok(RepoState::Dirty)
        } else {
            Ok(RepoState::Clean)
        }
    }

    /// Configure a local commit identity when none is set, preferring the
    /// environment, then the OS user and hostname, then a fixed default.
    pub fn ensure_identity(&self) -> Result<(), GitError> {
        if self.config_get("user.name").is_some() && self.config_get("user.email").is_some() {
            return Ok(());
        }

        let name = std::env::var("GIT_AUTHOR_NAME")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| std::env::var("USER").ok().filter(|v| !v.is_empty()))
            .or_else(|| std::env::var("USERNAME").ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| comfydock_consts::DEFAULT_GIT_AUTHOR.to_string());

        let email = std::env::var("GIT_AUTHOR_EMAIL")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| {
                let user = std::env::var("USER").ok().filter(|v| !v.is_empty())?;
                let host = std::env::var("HOSTNAME").ok().filter(|v| !v.is_empty())?;
                Some(format!("{user}@{host}"))
            })
            .unwrap_or_else(|| comfydock_consts::DEFAULT_GIT_EMAIL.to_string());

        self.run(&["config", "user.name", &name])?;
        self.run(&["config", "user.email", &email])?;
        tracing::info!("set local git identity: {name} <{email}>");
        Ok(())
    }

    /// Initialize the repository: `git init`, identity, ignore rules, and an
    /// initial commit when the working tree is non-empty.
    pub fn initialize_environment_repo(&self, initial_message: &str) -> Result<(), GitError> {
        fs::create_dir_all(&self.path)?;
        self.run(&["init"])?;
        self.ensure_identity()?;
        fs::write(self.path.join(".gitignore"), GITIGNORE)?;

        let non_empty = fs::read_dir(&self.path)?.next().is_some();
        if non_empty {
            self.commit_all(initial_message)?;
            tracing::info!("created initial commit: {initial_message}");
        }
        Ok(())
    }

    /// Stage everything and commit. Returns `false` when there was nothing
    /// to commit.
    pub fn commit_all(&self, message: &str) -> Result<bool, GitError> {
        self.ensure_identity()?;
        self.run(&["add", "-A"])?;
        if !self.has_staged_changes()? {
            tracing::debug!("nothing to commit");
            return Ok(false);
        }
        self.run(&["commit", "-m", message])?;
        Ok(true)
    }

    fn has_staged_changes(&self) -> Result<bool, GitError> {
        // `diff --cached --quiet` exits 1 when the index differs from HEAD.
        // Before the first commit HEAD does not exist; fall back to status.
        match self.run(&["diff", "--cached", "--quiet"]) {
            Ok(_) => Ok(false),
            Err(GitError::CommandFailed { code: 1, .. }) => Ok(true),
            Err(GitError::CommandFailed { .. }) => {
                Ok(!self.status_porcelain()?.is_empty())
            }
            Err(err) => Err(err),
        }
    }

    pub fn has_uncommitted_changes(&self) -> Result<bool, GitError> {
        Ok(!self.status_porcelain()?.is_empty())
    }

    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>, GitError> {
        let output = self.run(&["status", "--porcelain"])?;
        let mut entries = Vec::new();
        for line in output.lines() {
            if line.len() < 4 {
                continue;
            }
            let mut chars = line.chars();
            let index = chars.next().unwrap_or(' ');
            let worktree = chars.next().unwrap_or(' ');
            let rest = line[3..].trim();
            // Renames are reported as "old -> new"; keep the new path.
            let path = rest
                .rsplit_once(" -> ")
                .map(|(_, new)| new)
                .unwrap_or(rest)
                .trim_matches('"')
                .to_string();
            entries.push(StatusEntry {
                index,
                worktree,
                path,
            });
        }
        Ok(entries)
    }

    /// Version history, oldest first, labeled `v1..vN`.
    pub fn get_version_history(&self, limit: usize) -> Result<Vec<Version>, GitError> {
        let count_arg = format!("-n{limit}");
        let output = match self.run(&["log", "--pretty=format:%H|%s|%aI", count_arg.as_str()]) {
            Ok(output) => output,
            // An empty repository has no HEAD yet.
            Err(GitError::CommandFailed { code: 128, .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut versions: Vec<Version> = output
            .lines()
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let mut parts = line.splitn(3, '|');
                Some(Version {
                    label: String::new(),
                    hash: parts.next()?.to_string(),
                    message: parts.next()?.to_string(),
                    date: parts.next()?.to_string(),
                })
            })
            .collect();
        versions.reverse();
        for (ordinal, version) in versions.iter_mut().enumerate() {
            version.label = format!("v{}", ordinal + 1);
        }
        Ok(versions)
    }

    /// Map a `vN` label (or a commit hash passed through) to a full hash.
    pub fn resolve_version(&self, version: &str) -> Result<String, GitError> {
        let is_hash = version.len() >= 7
            && version.chars().all(|c| c.is_ascii_hexdigit());
        if is_hash {
            return Ok(version.to_string());
        }
        self.get_version_history(1000)?
            .into_iter()
            .find(|v| v.label == version)
            .map(|v| v.hash)
            .ok_or_else(|| GitError::VersionNotFound(version.to_string()))
    }

    /// Check the tree of `version` out into the working directory, leaving
    /// the result unstaged. Files that only exist in later versions are
    /// removed so the working tree matches the target tree.
    pub fn apply_version(&self, version: &str) -> Result<(), GitError> {
        let hash = self.resolve_version(version)?;
        tracing::info!("applying files from version {version} ({})", &hash[..8.min(hash.len())]);

        // Paths added since the target version must go away.
        let range = format!("{hash}..HEAD");
        let added = self.run(&["diff", "--name-only", "--diff-filter=A", range.as_str()])?;
        for path in added.lines().filter(|l| !l.is_empty()) {
            let absolute = self.path.join(path);
            if absolute.is_file() {
                fs::remove_file(&absolute)?;
            }
        }

        self.run(&["checkout", &hash, "--", "."])?;
        self.run(&["reset"])?;
        Ok(())
    }

    /// Throw away all uncommitted changes, restoring HEAD.
    pub fn discard_uncommitted(&self) -> Result<(), GitError> {
        tracing::info!("discarding uncommitted changes");
        self.run(&["checkout", "HEAD", "--", "."])?;
        Ok(())
    }

    /// The commit hash HEAD points at, or `None` before the first commit.
    pub fn head_commit(&self) -> Option<String> {
        self.run(&["rev-parse", "HEAD"])
            .ok()
            .map(|hash| hash.trim().to_string())
            .filter(|hash| !hash.is_empty())
    }

    /// Contents of `path` at `revision` (e.g. `HEAD`, a hash, or a label).
    pub fn show_file(&self, revision: &str, path: &str) -> Result<String, GitError> {
        let hash = if revision == "HEAD" {
            revision.to_string()
        } else {
            self.resolve_version(revision)?
        };
        let spec = format!("{hash}:{path}");
        self.run(&["show", spec.as_str()])
    }

    /// Unified diff of `path` against HEAD.
    pub fn diff_file(&self, path: &str) -> Result<String, GitError> {
        self.run(&["diff", "--", path])
    }

    /// Per-workflow change classification from the porcelain status,
    /// restricted to the committed workflows directory.
    pub fn get_workflow_changes(&self) -> Result<IndexMap<String, WorkflowChange>, GitError> {
        let prefix = format!("{}/", comfydock_consts::TRACKED_WORKFLOWS_DIR);
        let mut changes = IndexMap::new();
        for entry in self.status_porcelain()? {
            if !entry.path.starts_with(&prefix) || !entry.path.ends_with(".json") {
                continue;
            }
            let name = Path::new(&entry.path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let change = if entry.worktree == 'M' || entry.index == 'M' {
                WorkflowChange::Modified
            } else if entry.worktree == 'D' || entry.index == 'D' {
                WorkflowChange::Deleted
            } else if entry.worktree == '?' || entry.index == 'A' {
                WorkflowChange::Added
            } else {
                continue;
            };
            changes.insert(name, change);
        }
        Ok(changes)
    }
}
