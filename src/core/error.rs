//! Error taxonomy for session coordination.
//!
//! Errors fall into two families: transport-classified failures, which the
//! executor may retry locally, and application-level conditions, which are
//! surfaced to the caller unchanged and never retried. A session performs no
//! automatic re-creation once `SessionExpired` or `SessionClosed` is reached;
//! callers must open a new session.

use crate::transport::TransportError;
use thiserror::Error;

/// Error conditions surfaced by the session coordination layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Network or timeout failure at the transport boundary.
    ///
    /// Retriable for queries and keepalives; retriable with the *same*
    /// sequence number for commands.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The server rejected a command because its write condition did not hold.
    #[error("write condition failed")]
    PreconditionFailed,

    /// The server rejected a command because the write lock is held elsewhere.
    #[error("write lock failed")]
    WriteLockFailed,

    /// The server no longer recognizes the session identifier.
    ///
    /// The local session transitions to closed and all pending and future
    /// calls fail with this condition.
    #[error("session expired by the server")]
    SessionExpired,

    /// The session was closed locally by the caller.
    ///
    /// Calls made after closure fail immediately without a network round trip.
    #[error("session closed")]
    SessionClosed,

    /// The caller-supplied deadline elapsed before a definitive response.
    ///
    /// For a command the server-side outcome is indeterminate: the command may
    /// or may not have been applied. Do not assume success or failure.
    #[error("call cancelled before a definitive response")]
    Cancelled,

    /// Malformed local input, such as a non-positive partition count.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl SessionError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Check if the executor may retry the failed call locally.
    ///
    /// Only transport-classified transient failures qualify; application
    /// statuses and lifecycle conditions never do.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_retriable())
    }

    /// Check if this error terminates the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::SessionClosed)
    }
}

/// Result type using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
