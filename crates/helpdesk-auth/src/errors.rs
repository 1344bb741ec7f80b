//! Auth error types.

/// Errors that can occur during session operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The API answered with a non-success status.
    #[error("request rejected ({status}): {detail}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// The `detail` field of the error body, or the raw body.
        detail: String,
    },

    /// An operation needed a session but none is active.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The configured base URL could not be used.
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
}

impl AuthError {
    /// Whether the server refused the credentials (401/403).
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Rejected { status: 401 | 403, .. })
    }
}
