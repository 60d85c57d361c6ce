use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    #[error("failed to parse workflow JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("workflow has no nodes")]
    Empty,
}
