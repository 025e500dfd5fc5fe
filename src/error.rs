//! Error types for the bot library.

use thiserror::Error;

/// Convenience type alias for Results using [`BotError`].
pub type Result<T, E = BotError> = std::result::Result<T, E>;

/// Top-level errors produced by the bot engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BotError {
    /// Failed to establish the TCP connection.
    #[error("connect error: {0}")]
    Connect(#[source] std::io::Error),

    /// TLS handshake failure.
    #[error("tls error: {0}")]
    Tls(#[source] std::io::Error),

    /// The host string could not be used as a TLS server name.
    #[error("invalid host for tls: {0}")]
    InvalidHost(String),

    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Incoming line exceeded the maximum allowed length.
    #[error("line too long: {actual} bytes (limit: {limit})")]
    LineTooLong {
        /// Actual line length.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// Session hijacking cannot be combined with a TLS connection.
    #[error("cannot hijack a TLS session")]
    HijackOverTls,

    /// The session handoff exchange failed partway through.
    ///
    /// Once the successor has connected to the handoff socket, a failure to
    /// move the descriptor or the session state across leaves neither side
    /// with a usable connection, so this is not recovered from.
    #[error("session handoff failed: {0}")]
    Handoff(String),

    /// The capability map could not be encoded or decoded.
    #[error("capability map encoding: {0}")]
    CapMap(#[from] serde_json::Error),

    /// `run` was invoked while a previous run is still active.
    #[error("bot is already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BotError::LineTooLong {
            actual: 9000,
            limit: 8191,
        };
        assert_eq!(format!("{}", err), "line too long: 9000 bytes (limit: 8191)");

        let err = BotError::Handoff("no transferable socket".into());
        assert_eq!(
            format!("{}", err),
            "session handoff failed: no transferable socket"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: BotError = io_err.into();
        assert!(matches!(err, BotError::Io(_)));
    }
}
