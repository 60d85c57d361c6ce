use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GitError {
    #[error("git {command} failed with exit code {code}\n{stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("failed to run git: {source}")]
    #[diagnostic(help("is git installed and on PATH?"))]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("version '{0}' not found in history")]
    VersionNotFound(String),

    #[error("not a git repository: {}", path.display())]
    NotARepository { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
