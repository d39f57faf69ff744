use thiserror::Error;

/// Errors raised outside the thought chain itself.
///
/// Structural problems with a submitted thought are not errors of this type:
/// they are typed rejections (see [`crate::validation::ValidationError`]) and
/// leave the session usable.
#[derive(Debug, Error)]
pub enum SequentialThinkingError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown prompt: {0}")]
    UnknownPrompt(String),

}

/// Convert SequentialThinkingError to MCP-compatible ErrorData
impl From<SequentialThinkingError> for rmcp::model::ErrorData {
    fn from(err: SequentialThinkingError) -> Self {
        match err {
            SequentialThinkingError::UnknownPrompt(_) | SequentialThinkingError::InvalidConfig { .. } => {
                rmcp::model::ErrorData::invalid_params(err.to_string(), None)
            }
            _ => rmcp::model::ErrorData::internal_error(err.to_string(), None),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SequentialThinkingError>;
