use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("'{0}' not found")]
    NotFound(String),

    #[error("registry unavailable: {source}")]
    #[diagnostic(help("check your network connection and try again"))]
    Unavailable {
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("invalid repository URL: {0}")]
    InvalidUrl(String),

    #[error("node cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("failed to extract archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("git clone of {url} failed: {stderr}")]
    CloneFailed { url: String, stderr: String },

    #[error("node mappings file not found at {0}")]
    MappingsNotFound(String),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
