//! Error types for the back-end server.

use std::net::SocketAddr;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the back-end server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Configured address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the peer went away while the response was written.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ServerError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        let gone = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(ServerError::from(gone).is_disconnect());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!ServerError::from(denied).is_disconnect());
        assert!(!ServerError::Config("empty secret".into()).is_disconnect());
    }

    #[test]
    fn error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:80: denied");
    }
}
