use miette::Diagnostic;
use thiserror::Error;

/// A remediation the driver can print as an executable command when a node
/// conflicts with existing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRemediation {
    pub description: String,
    pub command: String,
}

#[derive(Debug, Error, Diagnostic)]
pub enum CoreError {
    #[error("no workspace found at {}", path.display())]
    #[diagnostic(help("run `comfydock init` to create one"))]
    WorkspaceNotFound { path: std::path::PathBuf },

    #[error("environment '{0}' not found")]
    EnvironmentNotFound(String),

    #[error("environment '{0}' already exists")]
    EnvironmentExists(String),

    #[error("environment '{name}' is corrupt: {reason}")]
    #[diagnostic(help("delete and re-create the environment, or restore a previous version"))]
    EnvironmentCorrupt { name: String, reason: String },

    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    #[error("node '{identifier}' conflicts with existing state")]
    NodeConflict {
        identifier: String,
        remediations: Vec<ConflictRemediation>,
    },

    #[error("uncommitted changes present; pass force or confirm via strategy")]
    UncommittedChanges {
        git_changes: bool,
        workflow_changes: bool,
    },

    #[error("rollback cancelled")]
    RollbackCancelled,

    #[error("uv {command} failed with exit code {code}")]
    UvCommand {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
        /// Parsed dependency-conflict lines, when the failure was a solver
        /// conflict.
        conflicts: Vec<String>,
    },

    #[error("failed to run uv: {source}")]
    #[diagnostic(help("is uv installed and on PATH?"))]
    UvSpawn {
        #[source]
        source: std::io::Error,
    },

    #[error("resolution failed for '{0}': no candidates and the strategy declined to pick")]
    ResolutionFailed(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Manifest(#[from] comfydock_manifest::ManifestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Git(#[from] comfydock_git::GitError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ModelIndex(#[from] comfydock_model_index::ModelIndexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Download(#[from] comfydock_model_index::DownloadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] comfydock_registry::RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] comfydock_config::ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Workflow(#[from] comfydock_workflow::WorkflowError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
