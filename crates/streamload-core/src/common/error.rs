//! Error types for a single load-test session.
//!
//! Every failure a session can hit is captured by [`Error`]. None of them are
//! retried: the session logs the error, reports completion and exits. The
//! coordinator never sees these values, only the session's identity.
//!
//! ## Error Cases
//! - `InvalidEndpoint`: The configured server address cannot form a URI.
//! - `Connect` / `ConnectTimeout` / `Tls`: The transport could not be dialed.
//! - `Greeting`: The optional unary pre-flight call failed.
//! - `StreamOpen`: The bidirectional stream could not be opened.
//! - `Send`: The initial message could not be written to the stream.
//! - `Receive`: The server terminated the stream with a non-OK status.
//! - `CloseSend`: The send half of the stream could not be closed.
//! - `Cancelled`: The harness asked the session to unwind.

use core::time::Duration;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for a streaming session.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The server address could not be turned into a valid endpoint.
    #[error("Invalid endpoint `{addr}`: {reason}")]
    InvalidEndpoint { addr: String, reason: String },

    /// The underlying channel failed to connect.
    #[error("Connect error: {0}")]
    Connect(#[from] tonic::transport::Error),

    /// Dialing did not finish within the configured timeout.
    #[error("Connect to `{addr}` timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// TLS setup or handshake failed.
    #[error("TLS error: {reason}")]
    Tls { reason: String },

    /// The unary `SayHello` call returned an error status.
    #[error("Greeting failed: {0}")]
    Greeting(Status),

    /// The stream could not be opened on an established connection.
    #[error("Stream open error: {context}")]
    StreamOpen { context: String },

    /// Writing to the request half of the stream failed.
    #[error("Send error: {context}")]
    Send { context: String },

    /// The response half of the stream failed with a status.
    #[error("Receive error: {0}")]
    Receive(Status),

    /// Closing the request half of the stream failed.
    #[error("Close send error: {context}")]
    CloseSend { context: String },

    /// The session was cancelled during harness shutdown.
    #[error("Session cancelled")]
    Cancelled,
}

impl Error {
    /// Short label for the lifecycle phase the error belongs to, used as a
    /// structured log field.
    pub const fn phase(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint { .. }
            | Self::Connect(_)
            | Self::ConnectTimeout { .. }
            | Self::Tls { .. } => "connect",
            Self::Greeting(_) => "greeting",
            Self::StreamOpen { .. } => "open",
            Self::Send { .. } => "send",
            Self::Receive(_) => "receive",
            Self::CloseSend { .. } => "close_send",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` if the session never got a usable connection.
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEndpoint { .. }
                | Self::Connect(_)
                | Self::ConnectTimeout { .. }
                | Self::Tls { .. }
                | Self::StreamOpen { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_follow_the_session_lifecycle() {
        let timeout = Error::ConnectTimeout {
            addr: "localhost:1".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(timeout.phase(), "connect");
        assert!(timeout.is_connection_error());

        let open = Error::StreamOpen {
            context: "not ready".to_string(),
        };
        assert_eq!(open.phase(), "open");
        assert!(open.is_connection_error());

        let recv = Error::Receive(Status::unavailable("gone"));
        assert_eq!(recv.phase(), "receive");
        assert!(!recv.is_connection_error());

        assert_eq!(Error::Cancelled.phase(), "cancelled");
    }

    #[test]
    fn display_includes_context() {
        let err = Error::InvalidEndpoint {
            addr: "::bad".to_string(),
            reason: "invalid authority".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid endpoint `::bad`: invalid authority");
    }
}
