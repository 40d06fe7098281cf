//! Error types for orbit wire types.

use thiserror::Error;

/// Errors raised while encoding or decoding control frames.
#[derive(Debug, Error)]
pub enum TypesError {
    /// JSON encoding failed
    #[error("serialization failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Frame is not valid JSON, has no known shape, or lacks a required field
    #[error("malformed control message: {0}")]
    Decode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = serde_json::from_str::<u32>("x").unwrap_err();
        let err = TypesError::Decode(err);
        assert!(err.to_string().starts_with("malformed control message:"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}
