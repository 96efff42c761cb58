// Standardized error types for MCPMan

use thiserror::Error;

/// Crate-wide error type. Variants correspond to the error kinds in
/// the external interfaces table; most are surfaced to the downstream
/// client as `isError:true` content rather than propagated.
#[derive(Error, Debug)]
pub enum McpManError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("failed to connect to server '{0}': {1}")]
    ConnectFailed(String, String),

    #[error("server '{0}' requires authorization: {1}")]
    Unauthorized(String, String),

    #[error("server '{0}' is not connected")]
    ServerNotConnected(String),

    #[error("tool '{0}' not found; available: {1}")]
    ToolNotFound(String, String),

    #[error("validation failed at {path}: {message}")]
    ValidationError { path: String, message: String },

    #[error("Line {line}, Column {column}: {message}")]
    TypeCheckFailed {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("execution error: {0}")]
    ExecutionError(String),

    #[error("tool result for '{0}' has no text content part")]
    NoTextContent(String),

    #[error("sandbox execution timed out")]
    TimedOut,

    #[error("code generation exhausted after {attempts} attempts: {last_error}")]
    CodeGenExhausted { attempts: u32, last_error: String },

    #[error("internal type surface bug: generated type text failed to compile: {0}")]
    InternalTypeSurfaceBug(String),

    #[error("server '{0}' already configured")]
    ServerAlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience alias for `Result` using [`McpManError`].
pub type Result<T> = std::result::Result<T, McpManError>;

impl McpManError {
    /// Render as a string suitable for the `isError:true` tool-result
    /// boundary. Most variants already `Display` acceptably; this exists
    /// as a seam for future per-kind formatting.
    pub fn to_tool_text(&self) -> String {
        self.to_string()
    }
}

impl From<String> for McpManError {
    fn from(s: String) -> Self {
        McpManError::Other(s)
    }
}

impl From<&str> for McpManError {
    fn from(s: &str) -> Self {
        McpManError::Other(s.to_string())
    }
}

impl From<tokio::task::JoinError> for McpManError {
    fn from(err: tokio::task::JoinError) -> Self {
        McpManError::Other(err.to_string())
    }
}

impl From<McpManError> for String {
    fn from(err: McpManError) -> Self {
        err.to_string()
    }
}
