use std::{path::Path, process::Command};

use comfydock_git::GitRepository;
use comfydock_manifest::Manifest;

use crate::CoreError;

/// Options for creating a new environment.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Interpreter floor written to `requires-python` and pinned in
    /// `.python-version`.
    pub python_version: String,
    /// Git ref of the ComfyUI checkout (tag or branch). `None` clones the
    /// default branch.
    pub comfyui_ref: Option<String>,
    /// Restore the ComfyUI checkout by copying this directory instead of
    /// cloning. Used when a cached checkout is available.
    pub comfyui_source: Option<std::path::PathBuf>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            python_version: "3.12".to_string(),
            comfyui_ref: None,
            comfyui_source: None,
        }
    }
}

/// Lay a new environment down on disk: metadata directory with a seeded
/// manifest, interpreter pin, ComfyUI checkout (clone or cache restore),
/// and an initialized metadata repository with the first version committed.
pub fn create_environment_on_disk(
    name: &str,
    env_path: &Path,
    options: &CreateOptions,
) -> Result<(), CoreError> {
    if env_path.exists() {
        return Err(CoreError::EnvironmentExists(name.to_string()));
    }

    let cec_path = env_path.join(comfydock_consts::CEC_DIR);
    fs_err::create_dir_all(cec_path.join(comfydock_consts::TRACKED_WORKFLOWS_DIR))?;

    let comfyui_version = options.comfyui_ref.as_deref().unwrap_or("master");
    let manifest_contents = seed_manifest(name, &options.python_version, comfyui_version);
    Manifest::create(
        cec_path.join(comfydock_consts::MANIFEST_FILE),
        &manifest_contents,
    )?;
    fs_err::write(
        cec_path.join(comfydock_consts::PYTHON_VERSION_FILE),
        format!("{}\n", options.python_version),
    )?;

    let comfyui_path = env_path.join(comfydock_consts::COMFYUI_DIR);
    match &options.comfyui_source {
        Some(source) => {
            tracing::info!("restoring ComfyUI checkout from {}", source.display());
            copy_tree(source, &comfyui_path)?;
        }
        None => {
            tracing::info!("cloning ComfyUI ({comfyui_version})");
            clone_comfyui(&comfyui_path, options.comfyui_ref.as_deref())?;
        }
    }
    fs_err::create_dir_all(comfyui_path.join(comfydock_consts::CUSTOM_NODES_DIR))?;
    fs_err::create_dir_all(comfyui_path.join(comfydock_consts::ACTIVE_WORKFLOWS_DIR))?;

    let git = GitRepository::new(&cec_path);
    git.initialize_environment_repo("Initial environment setup")?;

    tracing::info!("created environment '{name}' at {}", env_path.display());
    Ok(())
}

fn seed_manifest(name: &str, python_version: &str, comfyui_version: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect();
    format!(
        r#"[project]
name = "{slug}"
version = "0.1.0"
requires-python = ">={python_version}"
dependencies = []

[tool.comfydock]
comfyui_version = "{comfyui_version}"
python_version = "{python_version}"
"#
    )
}

fn clone_comfyui(target: &Path, reference: Option<&str>) -> Result<(), CoreError> {
    let mut command = Command::new("git");
    command.args(["clone", "--depth", "1"]);
    if let Some(reference) = reference {
        command.args(["--branch", reference]);
    }
    command
        .arg(comfydock_consts::DEFAULT_COMFYUI_REPO)
        .arg(target);
    let output = command.output().map_err(|source| {
        CoreError::Git(comfydock_git::GitError::Spawn { source })
    })?;
    if !output.status.success() {
        return Err(CoreError::Git(comfydock_git::GitError::CommandFailed {
            command: "clone".to_string(),
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }));
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    fs_err::create_dir_all(to)?;
    for entry in fs_err::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs_err::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_layout_and_initial_version() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("my-env");

        // Use a local stand-in checkout so no network is involved.
        let checkout = dir.path().join("comfyui-cache");
        fs_err::create_dir_all(&checkout).unwrap();
        fs_err::write(checkout.join("main.py"), "print('comfyui')").unwrap();

        let options = CreateOptions {
            comfyui_source: Some(checkout),
            ..CreateOptions::default()
        };
        create_environment_on_disk("my-env", &env_path, &options).unwrap();

        assert!(env_path.join(".cec/pyproject.toml").is_file());
        assert!(env_path.join(".cec/.python-version").is_file());
        assert!(env_path.join(".cec/workflows").is_dir());
        assert!(env_path.join("ComfyUI/main.py").is_file());
        assert!(env_path.join("ComfyUI/custom_nodes").is_dir());

        let git = GitRepository::new(env_path.join(".cec"));
        let versions = git.get_version_history(5).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].message, "Initial environment setup");
    }

    #[test]
    fn refuses_to_overwrite_existing_environment() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("taken");
        fs_err::create_dir_all(&env_path).unwrap();

        let err =
            create_environment_on_disk("taken", &env_path, &CreateOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::EnvironmentExists(_)));
    }

    #[test]
    fn seeded_manifest_parses_and_carries_tool_metadata() {
        let contents = seed_manifest("My Env", "3.12", "v0.3.60");
        let manifest =
            Manifest::from_str_at(Path::new("/tmp/pyproject.toml"), &contents).unwrap();
        assert_eq!(manifest.project_name().as_deref(), Some("my-env"));
        assert_eq!(manifest.tool_value("comfyui_version").as_deref(), Some("v0.3.60"));
        assert_eq!(manifest.tool_value("python_version").as_deref(), Some("3.12"));
    }
}
