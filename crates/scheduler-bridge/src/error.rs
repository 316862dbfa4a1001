//! Error types for the bridge and the tool layer.

use std::borrow::Cow;
use thiserror::Error;

/// Failures talking to the host scheduler.
///
/// `Clone` so that one failed connect attempt can be handed to every caller
/// that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The socket did not accept the connection within the connect timeout
    #[error("Timed out connecting to scheduler after {seconds}s")]
    ConnectTimeout {
        /// Configured timeout
        seconds: u64,
    },

    /// The socket refused or failed the connection
    #[error("Failed to connect to scheduler: {0}")]
    Connect(String),

    /// The connection dropped before a reply arrived
    #[error("Scheduler connection closed before a response was received")]
    ConnectionClosed,

    /// Writing the request line failed
    #[error("Failed to send request to scheduler: {0}")]
    Write(String),

    /// The request could not be encoded
    #[error("Failed to encode scheduler request: {0}")]
    Encode(String),

    /// The host answered with an error
    #[error("{0}")]
    Remote(String),

    /// The client has been shut down
    #[error("Scheduler bridge is shut down")]
    Closed,
}

impl BridgeError {
    /// Whether a later call may succeed without intervention
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. } | Self::Connect(_) | Self::ConnectionClosed | Self::Write(_)
        )
    }
}

/// Failures surfaced to the agent as `isError` tool results.
///
/// The `Display` text is what the agent reads, so it stays short and plain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Missing or conflicting arguments
    #[error("{0}")]
    Validation(String),

    /// Tool name not in the catalog
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The scheduler call itself failed
    #[error("{0}")]
    Bridge(#[from] BridgeError),
}

impl ToolError {
    /// Creates a new validation error.
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short category label used in logs
    #[must_use]
    pub fn kind(&self) -> Cow<'static, str> {
        match self {
            Self::Validation(_) => "validation".into(),
            Self::UnknownTool(_) => "unknown_tool".into(),
            Self::Bridge(BridgeError::Remote(_)) => "scheduler".into(),
            Self::Bridge(error) if error.is_transport() => "transport".into(),
            Self::Bridge(_) => "bridge".into(),
        }
    }
}

/// Convenience type alias for `Result<T, BridgeError>`.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_is_passed_through_verbatim() {
        let error = ToolError::from(BridgeError::Remote("Task 3 not found".to_string()));
        assert_eq!(error.to_string(), "Task 3 not found");
        assert_eq!(error.kind(), "scheduler");
    }

    #[test]
    fn test_transport_classification() {
        assert!(BridgeError::ConnectTimeout { seconds: 5 }.is_transport());
        assert!(BridgeError::ConnectionClosed.is_transport());
        assert!(!BridgeError::Remote("nope".into()).is_transport());
        assert!(!BridgeError::Closed.is_transport());
    }

    #[test]
    fn test_kind_separates_transport_from_shutdown() {
        let dropped = ToolError::from(BridgeError::Write("broken pipe".into()));
        assert_eq!(dropped.kind(), "transport");

        let closed = ToolError::from(BridgeError::Closed);
        assert_eq!(closed.kind(), "bridge");

        let encode = ToolError::from(BridgeError::Encode("bad".into()));
        assert_eq!(encode.kind(), "bridge");
    }

    #[test]
    fn test_timeout_message_names_duration() {
        let error = BridgeError::ConnectTimeout { seconds: 5 };
        assert!(error.to_string().contains("5s"));
    }

    #[test]
    fn test_unknown_tool_message() {
        let error = ToolError::UnknownTool("delete_everything".to_string());
        assert_eq!(error.to_string(), "Unknown tool: delete_everything");
        assert_eq!(error.kind(), "unknown_tool");
    }
}
