use thiserror::Error;

#[derive(Debug, Error)]
pub enum SvarflytError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Query backend errors
    #[error("Query backend request failed: {0}")]
    QueryBackend(String),

    #[error("Query backend not ready: {0}")]
    NotReady(String),

    // State container errors
    #[error("State field missing: {0}")]
    MissingField(String),

    #[error("State field {field} has wrong type: {message}")]
    FieldType { field: String, message: String },

    #[error("State field {field} changed type from {from} to {to}")]
    FieldTypeChanged {
        field: String,
        from: &'static str,
        to: &'static str,
    },

    // Graph errors
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Node {node} returned unknown branch '{branch}'")]
    UnknownBranch { node: String, branch: String },

    #[error("Fan-out join incomplete: {filled} of {expected} slots filled")]
    JoinIncomplete { filled: usize, expected: usize },

    // Dispatch errors
    #[error("Agent {0} mangler!")]
    UnknownAgent(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SvarflytError>;
