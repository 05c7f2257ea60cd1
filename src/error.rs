//! Error types shared by the server and the client.
//!
//! Maps store, provider, and transport failures to MCP-friendly error responses.

/// User directory MCP errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum McpError {
    /// A candidate user record failed validation. One message per field.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Unknown user, tool, resource, template, or prompt.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing user file could not be read or decoded.
    #[error("failed to read user store '{path}': {reason}")]
    StoreRead {
        /// Path of the backing file
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// The backing user file could not be written.
    #[error("failed to write user store '{path}': {reason}")]
    StoreWrite {
        /// Path of the backing file
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// Text generation provider failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// Unknown tool requested.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArg(String),

    /// Invalid argument value.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArg {
        /// Argument name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Error response returned by the remote peer.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i32,
        /// Error message sent by the peer
        message: String,
    },

    /// JSON-RPC protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        McpError::Provider(err.to_string())
    }
}

impl From<dialoguer::Error> for McpError {
    fn from(err: dialoguer::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

/// JSON-RPC error codes.
pub mod rpc_codes {
    /// Parse error - Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - Invalid method parameter(s).
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl McpError {
    /// Convert to JSON-RPC error code.
    pub fn rpc_code(&self) -> i32 {
        match self {
            McpError::UnknownTool(_) => rpc_codes::METHOD_NOT_FOUND,
            McpError::MissingArg(_)
            | McpError::InvalidArg { .. }
            | McpError::Validation(_)
            | McpError::NotFound(_) => rpc_codes::INVALID_PARAMS,
            McpError::Protocol(_) => rpc_codes::INVALID_REQUEST,
            McpError::Rpc { code, .. } => *code,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }

    /// Whether the interactive loop may report this error and keep running.
    ///
    /// Malformed server replies are shown like any other failed action.
    /// Provider and transport failures abort the session instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            McpError::Validation(_)
                | McpError::NotFound(_)
                | McpError::StoreRead { .. }
                | McpError::StoreWrite { .. }
                | McpError::UnknownTool(_)
                | McpError::MissingArg(_)
                | McpError::InvalidArg { .. }
                | McpError::Rpc { .. }
                | McpError::Protocol(_)
        )
    }
}

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;
