//! Error types for the session layer.

use skulk_transport::ConnectionId;

/// Errors that can occur while tracking connections.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No record exists for the connection (never registered, or already
    /// removed on disconnect).
    #[error("connection {0} not found")]
    NotFound(ConnectionId),

    /// The connection id was registered twice.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),
}
