//! Error types for orbit-relay.
//!
//! Only startup and transport failures surface as errors. Everything that
//! goes wrong inside a connection (bad frames, offline peers) is logged and
//! absorbed by the session.

/// Main error type for orbit-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Invalid bind address.
    #[error("invalid bind address {address}: {source}")]
    BindAddress {
        /// The configured address.
        address: String,
        /// Parse failure.
        source: std::net::AddrParseError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A write to a peer connection could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PeerWriteError {
    /// The peer's writer has shut down.
    #[error("peer connection closed")]
    Closed,
    /// The peer's queue stayed full for the whole write timeout.
    #[error("peer connection stalled")]
    Stalled,
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_address_error_names_address() {
        let source = "nope".parse::<std::net::SocketAddr>().unwrap_err();
        let err = RelayError::BindAddress {
            address: "nope".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("invalid bind address nope"));
    }

    #[test]
    fn peer_write_error_display() {
        assert_eq!(PeerWriteError::Closed.to_string(), "peer connection closed");
        assert_eq!(PeerWriteError::Stalled.to_string(), "peer connection stalled");
    }
}
