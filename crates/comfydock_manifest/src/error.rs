use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while navigating or mutating the TOML structure itself.
#[derive(Debug, Error, Diagnostic)]
pub enum TomlError {
    #[error("'{part}' in '{table}' is not a table")]
    TableError { part: String, table: String },

    #[error("'{array}' in '{table}' is not an array")]
    ArrayError { array: String, table: String },
}

impl TomlError {
    pub fn table_error(part: &str, table: &str) -> Self {
        TomlError::TableError {
            part: part.to_string(),
            table: table.to_string(),
        }
    }

    pub fn array_error(array: &str, table: &str) -> Self {
        TomlError::ArrayError {
            array: array.to_string(),
            table: table.to_string(),
        }
    }
}

/// Errors raised by the manifest store.
#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    #[error("manifest not found at {}", path.display())]
    #[diagnostic(help("run `comfydock env create` to initialize the environment"))]
    NotFound { path: PathBuf },

    #[error("invalid manifest at {}: {reason}", path.display())]
    Invalid {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<toml_edit::TomlError>,
    },

    #[error("failed to write manifest to {}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Toml(#[from] TomlError),
}

impl ManifestError {
    pub(crate) fn invalid(path: &std::path::Path, reason: impl Into<String>) -> Self {
        ManifestError::Invalid {
            path: path.to_path_buf(),
            reason: reason.into(),
            source: None,
        }
    }
}
