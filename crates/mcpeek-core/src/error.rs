use std::time::Duration;
use thiserror::Error;

/// Boxed error used as the `source` of wrapping variants.
///
/// Keeping the concrete cause behind `dyn Error` (instead of a typed field)
/// lets cause-chain walkers downcast every link, including nested
/// [`McpeekError`] values.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A convenience `Result` alias using [`McpeekError`].
pub type McpeekResult<T> = Result<T, McpeekError>;

/// Top-level error type for mcpeek.
#[derive(Error, Debug)]
pub enum McpeekError {
    /// Invalid configuration, filter combination or workflow file.
    #[error("Config error: {0}")]
    Config(String),

    /// Establishing the underlying connection failed (spawn, TCP dial).
    #[error("failed to connect to {target}: {source}")]
    Dial {
        /// What was being dialed: a command line, an image or a URL.
        target: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// I/O on an established connection failed.
    #[error("{message}: {source}")]
    Transport {
        /// Operation that failed.
        message: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// A request or handshake step did not complete in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The peer spoke something that is not valid MCP.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered with a JSON-RPC error object.
    #[error("MCP error {code}: {message}")]
    Server {
        /// JSON-RPC error code.
        code: i64,
        /// Error message reported by the server.
        message: String,
    },

    /// The server rejected our credentials.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Unexpected HTTP status from a remote server.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Response status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The operation was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation ran past its deadline.
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Every connection attempt failed with a transient error.
    #[error("server '{server}': giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Server name.
        server: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: BoxError,
    },

    /// A connection attempt failed with a non-retryable error.
    #[error("server '{server}': connection failed after {attempts} attempt(s): {source}")]
    ConnectFailed {
        /// Server name.
        server: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error of the failing attempt.
        #[source]
        source: BoxError,
    },

    /// The session is not open (never opened, or already closed).
    #[error("session '{0}' is not connected")]
    NotConnected(String),

    /// An error talking to the MCP registry.
    #[error("Registry error: {0}")]
    Registry(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl McpeekError {
    /// Wrap a dial failure, keeping the cause chain intact.
    pub fn dial(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Dial {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Wrap a transport failure, keeping the cause chain intact.
    pub fn transport(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            message: message.into(),
            source: source.into(),
        }
    }

    /// True for [`McpeekError::Cancelled`] and [`McpeekError::DeadlineExceeded`].
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded(_))
    }

    /// Attempt count carried by connection-manager outcomes.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetriesExhausted { attempts, .. } | Self::ConnectFailed { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_exhausted_message_carries_attempts() {
        let err = McpeekError::RetriesExhausted {
            server: "github".into(),
            attempts: 3,
            source: Box::new(McpeekError::Timeout("initialize".into())),
        };
        assert_eq!(err.attempts(), Some(3));
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"), "{msg}");
        assert!(msg.contains("initialize"), "{msg}");
    }

    #[test]
    fn test_source_is_downcastable() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = McpeekError::dial("http://localhost:1", inner);
        let source = err.source().unwrap();
        let io = source.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_cancellation_family() {
        assert!(McpeekError::Cancelled.is_cancellation());
        assert!(McpeekError::DeadlineExceeded(Duration::from_secs(1)).is_cancellation());
        assert!(!McpeekError::Config("x".into()).is_cancellation());
        assert_eq!(McpeekError::Cancelled.attempts(), None);
    }
}
