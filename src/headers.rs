//! Request and response headers carried on every call.
//!
//! The coordination layer treats payloads as opaque bytes; headers are the
//! only fields it interprets. Commands consume a per-session sequence number
//! used by the server for at-most-once, ordered application; queries carry
//! the last observed index as a read lower bound instead.

use bytes::Bytes;

/// A server-assigned session identifier.
///
/// Zero denotes an unassigned identifier, used on the create handshake
/// before the server has issued one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionId(pub u64);

impl SessionId {
    /// The pre-handshake identifier.
    pub const UNASSIGNED: SessionId = SessionId(0);

    /// Check whether the server has assigned this identifier.
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Acknowledgement of the last event sequence received on an open stream.
///
/// Carried on request headers so the server can trim delivered events and
/// resume streams without replaying acknowledged ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamAck {
    /// Locally assigned stream identifier.
    pub stream_id: u64,
    /// Last event sequence received on the stream.
    pub last_sequence: u64,
}

/// Header attached to every outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    /// Session identifier, unassigned on the create handshake.
    pub session_id: SessionId,

    /// Command sequence number. A command consumes the next number; queries
    /// and keepalives carry the last issued number without consuming one.
    pub sequence: u64,

    /// Highest response index observed by this session, bounding the
    /// staleness of replica reads.
    pub index: u64,

    /// Acknowledgements for every open event stream.
    pub streams: Vec<StreamAck>,
}

impl RequestHeader {
    /// Create the header for the session create handshake.
    pub fn handshake() -> Self {
        Self {
            session_id: SessionId::UNASSIGNED,
            sequence: 0,
            index: 0,
            streams: Vec::new(),
        }
    }
}

/// Status returned by the server in a response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// The operation was applied.
    Ok,
    /// Generic server-side failure.
    Error,
    /// The addressed replica is not the partition leader; the response may
    /// carry a leader hint. Retriable with the same sequence number.
    NotLeader,
    /// A write condition did not hold. Never retried.
    PreconditionFailed,
    /// The write lock is held elsewhere. Never retried.
    WriteLock,
    /// The session identifier is unknown to the server.
    SessionExpired,
}

/// Position of a pushed event within its source stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPosition {
    /// Stream the event belongs to.
    pub stream_id: u64,
    /// Intra-stream event sequence.
    pub sequence: u64,
}

/// Header attached to every incoming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Session identifier the response belongs to.
    pub session_id: SessionId,

    /// Position of the operation in the primitive's log. Monotonic
    /// non-decreasing across the lifetime of a session.
    pub index: u64,

    /// Response status.
    pub status: ResponseStatus,

    /// Partition-ordinal hint for the current leader, if known.
    pub leader: Option<u32>,

    /// Stream position for pushed events; absent on unary responses.
    pub stream: Option<StreamPosition>,
}

impl ResponseHeader {
    /// Create a successful response header.
    pub fn ok(session_id: SessionId, index: u64) -> Self {
        Self {
            session_id,
            index,
            status: ResponseStatus::Ok,
            leader: None,
            stream: None,
        }
    }

    /// Create a response header with the given status.
    pub fn status(session_id: SessionId, index: u64, status: ResponseStatus) -> Self {
        Self {
            session_id,
            index,
            status,
            leader: None,
            stream: None,
        }
    }

    /// Create an event response header positioned within a stream.
    pub fn event(session_id: SessionId, index: u64, stream_id: u64, sequence: u64) -> Self {
        Self {
            session_id,
            index,
            status: ResponseStatus::Ok,
            leader: None,
            stream: Some(StreamPosition {
                stream_id,
                sequence,
            }),
        }
    }
}

/// An outgoing request: interpreted header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: RequestHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with a payload.
    pub fn new(header: RequestHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a frame with an empty payload.
    pub fn header_only(header: RequestHeader) -> Self {
        Self {
            header,
            payload: Bytes::new(),
        }
    }
}

/// An incoming response: interpreted header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub header: ResponseHeader,
    pub payload: Bytes,
}

impl Reply {
    /// Create a reply with a payload.
    pub fn new(header: ResponseHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a reply with an empty payload.
    pub fn header_only(header: ResponseHeader) -> Self {
        Self {
            header,
            payload: Bytes::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_session_id() {
        assert!(!SessionId::UNASSIGNED.is_assigned());
        assert!(SessionId(7).is_assigned());
    }

    #[test]
    fn handshake_header_is_blank() {
        let header = RequestHeader::handshake();
        assert_eq!(header.session_id, SessionId::UNASSIGNED);
        assert_eq!(header.sequence, 0);
        assert_eq!(header.index, 0);
        assert!(header.streams.is_empty());
    }

    #[test]
    fn event_header_carries_position() {
        let header = ResponseHeader::event(SessionId(1), 5, 2, 3);
        assert_eq!(header.status, ResponseStatus::Ok);
        assert_eq!(
            header.stream,
            Some(StreamPosition {
                stream_id: 2,
                sequence: 3
            })
        );
    }
}
