//! Transport boundary consumed from the environment.
//!
//! A transport handle is an established connection to one partition's server
//! endpoint, owned externally and passed in. The coordination layer is
//! agnostic to dialing, TLS, and serialization; it requires only two call
//! shapes: unary request/response and server-streaming. A handle is shared
//! by every session bound to its partition and must support concurrent use
//! by independent calls.

use crate::headers::{Frame, Reply};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failures at the transport boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection was reset before a definitive response arrived.
    #[error("connection reset")]
    ConnectionReset,

    /// The call deadline elapsed with no definitive server outcome.
    #[error("request timed out")]
    Timeout,

    /// The underlying connection is gone and will not recover.
    #[error("transport closed")]
    Closed,

    /// The call was rejected outright by the endpoint.
    #[error("call rejected: {message}")]
    Rejected { message: String },
}

impl TransportError {
    /// Create a Rejected error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Check if the failure is transient and safe to retry.
    ///
    /// A reset or timeout leaves the server outcome unknown; commands must
    /// replay the same sequence number so the server can de-duplicate.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ConnectionReset | Self::Timeout)
    }
}

/// Receiving side of a server-streaming call.
///
/// The stream terminates when the sender is dropped (clean server close) or
/// after yielding a transport error.
pub type ReplyStream = mpsc::Receiver<Result<Reply, TransportError>>;

/// An established connection to one partition's server endpoint.
///
/// `method` discriminates the remote operation the way an RPC method name
/// would; primitive adapters supply it from their call closures.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a unary request and wait for the response.
    async fn unary(&self, method: &str, request: Frame) -> Result<Reply, TransportError>;

    /// Open a server-streaming call.
    async fn server_stream(
        &self,
        method: &str,
        request: Frame,
    ) -> Result<ReplyStream, TransportError>;
}
