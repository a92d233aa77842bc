use crate::types::ConnectionId;

/// Errors surfaced to the transport collaborator.
///
/// Per-member delivery failures (a recipient's connection being closed)
/// never show up here: the fan-out engine absorbs them, see [`SendError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("invalid handle {conn}: {reason}")]
    InvalidHandle { conn: ConnectionId, reason: String },

    #[error("invalid room name: {name:?}")]
    InvalidRoom { name: String },
}

impl RelayError {
    pub(crate) fn invalid_handle(conn: ConnectionId, reason: impl Into<String>) -> Self {
        RelayError::InvalidHandle {
            conn,
            reason: reason.into(),
        }
    }
}

/// Outcome of a single non-blocking send to one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The peer is gone: liveness flag cleared or its receiver dropped.
    #[error("connection closed")]
    Closed,

    /// The peer's outbound queue is at capacity.
    #[error("outbound queue full")]
    Full,
}

impl<T> From<tokio::sync::mpsc::error::TrySendError<T>> for SendError {
    fn from(e: tokio::sync::mpsc::error::TrySendError<T>) -> Self {
        match e {
            tokio::sync::mpsc::error::TrySendError::Full(_) => SendError::Full,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        }
    }
}
