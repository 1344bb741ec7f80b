//! Error types for the notification channel.
//!
//! None of these escape the channel actor: transport errors become a
//! scheduled reconnect and protocol errors drop the offending frame.

use thiserror::Error;

/// A frame that could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or lacked a string `type`.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Connection-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint URL could not be used.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The connection attempt failed (refused, handshake rejected, DNS, TLS).
    #[error("connect failed: {0}")]
    Connect(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connect(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = ProtocolError::from(json_err);
        assert!(err.to_string().starts_with("malformed frame"));
    }

    #[test]
    fn connect_display() {
        let err = TransportError::Connect("connection refused".into());
        assert_eq!(err.to_string(), "connect failed: connection refused");
    }

    #[test]
    fn tungstenite_error_converts() {
        let err: TransportError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
