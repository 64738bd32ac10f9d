use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`ProviderError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Top-level error type for service provider operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ProviderError {
    /// Connection establishment or replacement errors.
    Connection(ConnectionError),

    /// A well-formed command reply indicating server-side failure (`ok: 0`).
    CommandFailed(CommandFailedError),

    /// Structurally invalid combination of caller-supplied arguments.
    InvalidArgument(String),

    /// Invariant violations the caller cannot recover from.
    Internal(String),

    /// MongoDB driver errors, propagated unchanged.
    MongoDb(mongodb::error::Error),

    /// I/O errors.
    Io(io::Error),
}

/// Connection-specific errors.
///
/// Failures of this kind never corrupt the previously active connection:
/// the connection manager keeps operating against the prior client when a
/// reconnect or authentication attempt fails.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish or verify a connection.
    ConnectionFailed(String),

    /// Invalid connection URI.
    InvalidUri(String),

    /// Authentication handshake failed while building a replacement client.
    AuthenticationFailed(String),
}

/// A command reply came back with `ok: 0`.
///
/// Carries the original command spec (rendered as JSON) for diagnostics,
/// plus the server's `errmsg` when one was present in the reply.
#[derive(Debug)]
pub struct CommandFailedError {
    /// The command spec that was sent, rendered as JSON.
    pub command: String,

    /// Server-provided error message, if any.
    pub errmsg: Option<String>,
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Connection(e) => write!(f, "Connection error: {e}"),
            ProviderError::CommandFailed(e) => write!(f, "{e}"),
            ProviderError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            ProviderError::Internal(msg) => write!(f, "Internal error: {msg}"),
            ProviderError::MongoDb(e) => format_mongodb_error(f, e),
            ProviderError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::AuthenticationFailed(msg) => {
                write!(f, "Authentication failed: {msg}")
            }
        }
    }
}

impl fmt::Display for CommandFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.errmsg {
            Some(errmsg) => write!(f, "Command {} failed: {errmsg}", self.command),
            None => write!(f, "Command {} failed", self.command),
        }
    }
}

impl std::error::Error for ProviderError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for CommandFailedError {}

/* ========================= Conversions to ProviderError ========================= */

impl From<io::Error> for ProviderError {
    fn from(err: io::Error) -> Self {
        ProviderError::Io(err)
    }
}

impl From<mongodb::error::Error> for ProviderError {
    fn from(err: mongodb::error::Error) -> Self {
        ProviderError::MongoDb(err)
    }
}

impl From<ConnectionError> for ProviderError {
    fn from(err: ConnectionError) -> Self {
        ProviderError::Connection(err)
    }
}

impl From<CommandFailedError> for ProviderError {
    fn from(err: CommandFailedError) -> Self {
        ProviderError::CommandFailed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display_with_errmsg() {
        let err = CommandFailedError {
            command: r#"{"ping":1}"#.to_string(),
            errmsg: Some("no such command".to_string()),
        };
        assert_eq!(
            err.to_string(),
            r#"Command {"ping":1} failed: no such command"#
        );
    }

    #[test]
    fn test_command_failed_display_without_errmsg() {
        let err = CommandFailedError {
            command: r#"{"dropDatabase":1}"#.to_string(),
            errmsg: None,
        };
        assert_eq!(err.to_string(), r#"Command {"dropDatabase":1} failed"#);
    }

    #[test]
    fn test_connection_error_wraps_into_provider_error() {
        let err: ProviderError = ConnectionError::AuthenticationFailed("bad creds".to_string()).into();
        assert!(matches!(err, ProviderError::Connection(_)));
        assert_eq!(
            err.to_string(),
            "Connection error: Authentication failed: bad creds"
        );
    }
}
