//! Error types shared across the help-desk client crates.
//!
//! Each crate layers its own `thiserror` enum on top; [`HelpdeskError`]
//! covers the domain-level failures that are not tied to a transport.

use thiserror::Error;

/// Domain-level error.
#[derive(Debug, Error)]
pub enum HelpdeskError {
    /// A role string did not match any known role.
    #[error("unknown role: {0}")]
    InvalidRole(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_role_display() {
        let err = HelpdeskError::InvalidRole("guest".into());
        assert_eq!(err.to_string(), "unknown role: guest");
    }
}
