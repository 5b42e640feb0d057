#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Binding failed: {0}")]
    Binding(String),

    #[error("No usable output artifact: {0}")]
    NoOutput(String),

    #[error("Workflow template error ({path}): {reason}")]
    Template { path: String, reason: String },

    #[error("LoRA catalog error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
