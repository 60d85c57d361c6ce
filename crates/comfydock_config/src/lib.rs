//! Workspace-level configuration, persisted as JSON in the workspace
//! metadata directory.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read workspace config at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workspace config at {}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write workspace config to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Persisted workspace settings. Unknown keys are preserved across
/// round-trips by serde's default map behavior being avoided; the file is
/// rewritten wholesale, so the struct is the schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    /// The environment commands default to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_environment: Option<String>,

    /// The shared content-addressed models directory all environments link
    /// against.
    pub models_directory: PathBuf,

    /// API token for the civitai model host, used for gated downloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub civitai_api_token: Option<String>,

    /// Whether multi-candidate node mappings auto-select the best rank
    /// instead of asking.
    #[serde(default = "default_auto_select")]
    pub auto_select_ambiguous: bool,
}

fn default_auto_select() -> bool {
    true
}

impl WorkspaceConfig {
    pub fn new(models_directory: impl Into<PathBuf>) -> Self {
        Self {
            active_environment: None,
            models_directory: models_directory.into(),
            civitai_api_token: None,
            auto_select_ambiguous: true,
        }
    }

    pub fn config_path(metadata_dir: &Path) -> PathBuf {
        metadata_dir.join(comfydock_consts::WORKSPACE_CONFIG_FILE)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs_err::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs_err::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(self).expect("config serializes");
            fs_err::write(path, contents)
        };
        write().map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("saved workspace config to {}", path.display());
        Ok(())
    }
}
