//! Session state bookkeeping: lifecycle, sequencing, index, stream table.
//!
//! These fields are mutated by foreground command calls and the background
//! keepalive task alike, so the owning [`Session`](super::Session) guards
//! one `SessionState` behind a mutex. Header construction happens under
//! that lock so sequence numbers and indexes can never interleave across
//! concurrent calls.

use crate::core::error::{SessionError, SessionResult};
use crate::headers::{RequestHeader, SessionId, StreamAck};
use std::collections::HashMap;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No create call has succeeded yet.
    Unopened,
    /// The create handshake is in flight.
    Opening,
    /// The session is live; commands, queries, and watches are accepted.
    Open,
    /// A close or delete call is in flight.
    Closing,
    /// Terminal: the session was closed or expired.
    Closed,
    /// Terminal: the session was closed and the remote primitive state deleted.
    Deleted,
}

/// Mutable session state.
#[derive(Debug)]
pub struct SessionState {
    state: State,
    session_id: SessionId,
    /// Set when the server reported the session identifier unknown.
    expired: bool,
    /// Last command sequence number issued.
    sequence: u64,
    /// Highest response index observed.
    last_index: u64,
    next_stream_id: u64,
    /// Local stream id to last event sequence received.
    streams: HashMap<u64, u64>,
}

impl SessionState {
    /// Create state for an unopened session.
    pub fn new() -> Self {
        Self {
            state: State::Unopened,
            session_id: SessionId::UNASSIGNED,
            expired: false,
            sequence: 0,
            last_index: 0,
            next_stream_id: 0,
            streams: HashMap::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Server-assigned session identifier.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Last command sequence number issued.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Highest response index observed.
    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    /// Begin the create handshake.
    pub fn begin_open(&mut self) -> SessionResult<()> {
        if self.state != State::Unopened {
            return Err(SessionError::invalid_argument("session already opened"));
        }
        self.state = State::Opening;
        Ok(())
    }

    /// Record a successful create handshake.
    pub fn complete_open(&mut self, session_id: SessionId, index: u64) {
        self.session_id = session_id;
        self.last_index = index;
        self.state = State::Open;
    }

    /// Revert a failed create handshake. Creation is never retried.
    pub fn fail_open(&mut self) {
        self.state = State::Unopened;
    }

    /// Begin a caller-initiated close or delete.
    pub fn begin_close(&mut self) -> SessionResult<()> {
        match self.state {
            State::Open => {
                self.state = State::Closing;
                Ok(())
            }
            State::Closing | State::Closed | State::Deleted => Err(self.closed_error()),
            State::Unopened | State::Opening => {
                Err(SessionError::invalid_argument("session is not open"))
            }
        }
    }

    /// Finish a close or delete. The session reaches its terminal state
    /// whether or not the remote close call succeeded.
    pub fn complete_close(&mut self, deleted: bool) {
        self.state = if deleted { State::Deleted } else { State::Closed };
    }

    /// Force the session closed after a definitive expiry report.
    pub fn force_expire(&mut self) {
        self.expired = true;
        self.state = State::Closed;
    }

    /// The error every call fails with once the session is no longer open.
    pub fn closed_error(&self) -> SessionError {
        if self.expired {
            SessionError::SessionExpired
        } else {
            SessionError::SessionClosed
        }
    }

    /// Check that the session accepts new commands, queries, and watches.
    pub fn check_open(&self) -> SessionResult<()> {
        match self.state {
            State::Open => Ok(()),
            _ => Err(self.closed_error()),
        }
    }

    /// Record a response index. Indexes never regress.
    pub fn record_index(&mut self, index: u64) {
        if index > self.last_index {
            self.last_index = index;
        }
    }

    /// Build the header for the next command, consuming a sequence number.
    pub fn command_header(&mut self) -> RequestHeader {
        self.sequence += 1;
        RequestHeader {
            session_id: self.session_id,
            sequence: self.sequence,
            index: self.last_index,
            streams: self.stream_acks(),
        }
    }

    /// Build a query header. Queries do not consume sequence numbers; the
    /// carried index is the read lower bound.
    pub fn query_header(&self) -> RequestHeader {
        RequestHeader {
            session_id: self.session_id,
            sequence: self.sequence,
            index: self.last_index,
            streams: self.stream_acks(),
        }
    }

    /// Build a keepalive header carrying the current sequence and acks.
    pub fn keepalive_header(&self) -> RequestHeader {
        self.query_header()
    }

    /// Register a new event stream and return its local identifier.
    pub fn register_stream(&mut self) -> u64 {
        self.next_stream_id += 1;
        let stream_id = self.next_stream_id;
        self.streams.insert(stream_id, 0);
        stream_id
    }

    /// Record the last event sequence received on a stream.
    pub fn ack_stream(&mut self, stream_id: u64, sequence: u64) {
        if let Some(last) = self.streams.get_mut(&stream_id) {
            if sequence > *last {
                *last = sequence;
            }
        }
    }

    /// Drop a terminated stream from the acknowledgement table.
    pub fn unregister_stream(&mut self, stream_id: u64) {
        self.streams.remove(&stream_id);
    }

    /// Acknowledgements for every open stream, ordered by stream id.
    pub fn stream_acks(&self) -> Vec<StreamAck> {
        let mut acks: Vec<StreamAck> = self
            .streams
            .iter()
            .map(|(&stream_id, &last_sequence)| StreamAck {
                stream_id,
                last_sequence,
            })
            .collect();
        acks.sort_by_key(|ack| ack.stream_id);
        acks
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
