use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ModelIndexError {
    #[error("model index database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("model with hash {0} not found in index")]
    ModelNotFound(String),

    #[error("file does not exist or is not a regular file: {}", path.display())]
    InvalidFile { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, Diagnostic)]
pub enum DownloadError {
    #[error("download of {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("download of {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write downloaded file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] ModelIndexError),
}
