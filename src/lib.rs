//! Tether - client-side session coordination for partitioned, replicated primitives.
//!
//! Tether is the coordination layer a client application uses to talk to
//! replicated server-side data primitives (maps, logs, locks). Applications
//! never address the replicated backend directly: they open a *session* bound
//! to one primitive instance on one partition, and every command, query, and
//! watch for that primitive flows through the session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Primitive Adapters                         │
//! │         log │ map │ lock   (external to this crate)             │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Session                               │
//! │   lifecycle │ command/query executor │ keepalive │ stream relay │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Partition Router + Transport                   │
//! │        deterministic name routing │ opaque request/response     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Session configuration and defaults
//! - [`core::error`] - Error taxonomy and retry classification
//! - [`core::backoff`] - Exponential backoff policy
//!
//! ## Coordination
//! - [`headers`] - Request/response headers and sequencing metadata
//! - [`partition`] - Deterministic partition routing
//! - [`transport`] - Transport boundary consumed from the environment
//! - [`session`] - Session lifecycle, executor, keepalive, stream relay
//!
//! # Key Invariants
//!
//! - **SEQ-GAPLESS**: command sequence numbers per session are strictly
//!   increasing with no gaps; retries reuse, never skip, a sequence number
//! - **IDX-MONOTONE**: the last observed response index never regresses
//! - **CLOSED-FAST-FAIL**: after close, calls fail without a network round trip
//! - **RELAY-ORDER**: stream events are delivered in receipt order and the
//!   delivery conduit closes exactly once

// Core infrastructure
pub mod core;

// Header and sequencing types
pub mod headers;

// Partition routing
pub mod partition;

// Session coordination
pub mod session;

// Transport boundary
pub mod transport;

// Re-exports for convenience
pub use self::core::{
    backoff::ExponentialBackoff,
    config::{RetryConfig, SessionConfig},
    error::{SessionError, SessionResult},
};
pub use headers::{
    Frame, Reply, RequestHeader, ResponseHeader, ResponseStatus, SessionId, StreamAck,
    StreamPosition,
};
pub use partition::{select_partition, Partition, PartitionGroup, PartitionId, PrimitiveName};
pub use session::{Session, SessionHandler, State};
pub use transport::{ReplyStream, Transport, TransportError};
