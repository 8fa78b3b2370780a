//! Session coordination: lifecycle, executor, keepalive, stream relay.
//!
//! A [`Session`] binds a client to one primitive instance on one partition
//! for its entire lifetime. Commands flow through it with gapless sequence
//! numbers for at-most-once, ordered application; queries carry the last
//! observed index as a staleness bound; watches are bridged onto ordered
//! delivery conduits by the [`relay`] task. A background [`keepalive`]
//! driver renews the session strictly before its negotiated timeout.

pub mod keepalive;
pub mod relay;
pub mod state;

pub use state::State;

use crate::core::config::SessionConfig;
use crate::core::error::{SessionError, SessionResult};
use crate::headers::{Reply, RequestHeader, ResponseStatus};
use crate::partition::{Partition, PrimitiveName};
use crate::transport::{ReplyStream, Transport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use state::SessionState;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Primitive-specific lifecycle calls.
///
/// A primitive adapter implements this to translate the session lifecycle
/// into its own create/keepalive/close requests, issued through
/// [`Session::do_create`], [`Session::do_keep_alive`], and
/// [`Session::do_close`]. `delete` closes the session and deletes the remote
/// primitive's state.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Issue the create handshake for the primitive.
    async fn create(&self, session: &Arc<Session>) -> SessionResult<()>;

    /// Issue one keepalive call.
    async fn keep_alive(&self, session: &Arc<Session>) -> SessionResult<()>;

    /// Issue the close call.
    async fn close(&self, session: &Arc<Session>) -> SessionResult<()>;

    /// Issue the close-with-delete call.
    async fn delete(&self, session: &Arc<Session>) -> SessionResult<()>;
}

/// A stateful handle binding a client to one replicated primitive instance
/// on one partition.
pub struct Session {
    name: PrimitiveName,
    partition: Partition,
    config: SessionConfig,
    handler: Arc<dyn SessionHandler>,
    state: Mutex<SessionState>,
    /// Stops the keepalive driver and every open stream relay.
    shutdown_tx: watch::Sender<bool>,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Open a session for the named primitive on the given partition.
    ///
    /// Issues the handler's create handshake; on success the session records
    /// its server-assigned identifier, transitions to `Open`, and starts the
    /// keepalive driver. On failure the error is surfaced and nothing is
    /// retried: session creation has no automatic retry.
    pub async fn open(
        name: PrimitiveName,
        partition: Partition,
        handler: Arc<dyn SessionHandler>,
        config: SessionConfig,
    ) -> SessionResult<Arc<Self>> {
        config.validate()?;
        let (shutdown_tx, _) = watch::channel(false);
        let session = Arc::new(Self {
            name,
            partition,
            config,
            handler: Arc::clone(&handler),
            state: Mutex::new(SessionState::new()),
            shutdown_tx,
            keepalive: Mutex::new(None),
        });

        session.state.lock().begin_open()?;
        if let Err(err) = handler.create(&session).await {
            session.state.lock().fail_open();
            return Err(err);
        }
        {
            let state = session.state.lock();
            debug_assert_eq!(state.state(), State::Open);
            tracing::debug!(
                name = %session.name,
                partition = %session.partition.id(),
                session_id = %state.session_id(),
                "session opened"
            );
        }

        let driver = keepalive::spawn(Arc::clone(&session));
        *session.keepalive.lock() = Some(driver);
        Ok(session)
    }

    /// The primitive name this session is bound to.
    pub fn name(&self) -> &PrimitiveName {
        &self.name
    }

    /// The partition this session is bound to for its entire lifetime.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state.lock().state()
    }

    /// Server-assigned session identifier.
    pub fn session_id(&self) -> crate::headers::SessionId {
        self.state.lock().session_id()
    }

    /// Last command sequence number issued.
    pub fn sequence(&self) -> u64 {
        self.state.lock().sequence()
    }

    /// Highest response index observed.
    pub fn last_index(&self) -> u64 {
        self.state.lock().last_index()
    }

    /// Acknowledgements for every open event stream.
    pub fn stream_acks(&self) -> Vec<crate::headers::StreamAck> {
        self.state.lock().stream_acks()
    }

    /// Subscribe to the session shutdown signal.
    pub(crate) fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub(crate) fn handler(&self) -> Arc<dyn SessionHandler> {
        Arc::clone(&self.handler)
    }

    /// Record an event stream position for later keepalive acknowledgement.
    pub(crate) fn note_stream_event(&self, stream_id: u64, sequence: u64, index: u64) {
        let mut state = self.state.lock();
        state.ack_stream(stream_id, sequence);
        state.record_index(index);
    }

    /// Drop a terminated stream from the acknowledgement table.
    pub(crate) fn release_stream(&self, stream_id: u64) {
        self.state.lock().unregister_stream(stream_id);
    }

    /// Issue the create handshake call.
    ///
    /// Called from [`SessionHandler::create`]. On a successful status the
    /// session adopts the server-assigned identifier and transitions to
    /// `Open`. Creation is dispatched exactly once.
    pub async fn do_create<F, Fut>(&self, mut call: F) -> SessionResult<Reply>
    where
        F: FnMut(Arc<dyn Transport>, RequestHeader) -> Fut + Send,
        Fut: Future<Output = Result<Reply, TransportError>> + Send,
    {
        let header = RequestHeader::handshake();
        let reply = self
            .with_deadline(async {
                call(self.partition.transport(), header)
                    .await
                    .map_err(SessionError::from)
            })
            .await?;
        match reply.header.status {
            ResponseStatus::Ok => {
                let mut state = self.state.lock();
                state.complete_open(reply.header.session_id, reply.header.index);
                Ok(reply)
            }
            ResponseStatus::NotLeader => Err(TransportError::rejected(
                "create addressed a non-leader replica",
            )
            .into()),
            _ => self.settle(reply),
        }
    }

    /// Execute a command: a mutating call requiring a sequence number.
    ///
    /// The next sequence number is assigned before dispatch. Transient
    /// transport failures are retried with the *same* sequence number after
    /// exponential backoff, so server-side de-duplication keys on the
    /// sequence rather than the retry count. Application statuses are
    /// surfaced without retry. Fails fast once the session is closed.
    pub async fn do_command<F, Fut>(&self, mut call: F) -> SessionResult<Reply>
    where
        F: FnMut(Arc<dyn Transport>, RequestHeader) -> Fut + Send,
        Fut: Future<Output = Result<Reply, TransportError>> + Send,
    {
        let header = {
            let mut state = self.state.lock();
            state.check_open()?;
            state.command_header()
        };
        self.with_deadline(self.execute_with_retry(header, &mut call))
            .await
    }

    /// Execute a query: a non-mutating call bounded by the last observed
    /// index.
    ///
    /// Queries consume no sequence number and have no side effects to
    /// de-duplicate, so transient transport failures are retried up to the
    /// configured attempt limit.
    pub async fn do_query<F, Fut>(&self, mut call: F) -> SessionResult<Reply>
    where
        F: FnMut(Arc<dyn Transport>, RequestHeader) -> Fut + Send,
        Fut: Future<Output = Result<Reply, TransportError>> + Send,
    {
        let header = {
            let state = self.state.lock();
            state.check_open()?;
            state.query_header()
        };
        self.with_deadline(self.execute_with_retry(header, &mut call))
            .await
    }

    /// Issue one keepalive call carrying the current sequence number and
    /// stream acknowledgements.
    ///
    /// Called from [`SessionHandler::keep_alive`] on the driver's cadence;
    /// the driver, not this method, decides what to do with failures.
    pub async fn do_keep_alive<F, Fut>(&self, mut call: F) -> SessionResult<Reply>
    where
        F: FnMut(Arc<dyn Transport>, RequestHeader) -> Fut + Send,
        Fut: Future<Output = Result<Reply, TransportError>> + Send,
    {
        let header = {
            let state = self.state.lock();
            state.check_open()?;
            state.keepalive_header()
        };
        let reply = self
            .with_deadline(async {
                call(self.partition.transport(), header)
                    .await
                    .map_err(SessionError::from)
            })
            .await?;
        self.settle(reply)
    }

    /// Issue the close (or close-with-delete) call.
    ///
    /// Called from [`SessionHandler::close`] or [`SessionHandler::delete`]
    /// while the session is `Closing`.
    pub async fn do_close<F, Fut>(&self, mut call: F) -> SessionResult<Reply>
    where
        F: FnMut(Arc<dyn Transport>, RequestHeader) -> Fut + Send,
        Fut: Future<Output = Result<Reply, TransportError>> + Send,
    {
        let header = self.state.lock().keepalive_header();
        let reply = self
            .with_deadline(async {
                call(self.partition.transport(), header)
                    .await
                    .map_err(SessionError::from)
            })
            .await?;
        self.settle(reply)
    }

    /// Open a watch: a command whose response is a server-push stream.
    ///
    /// Non-blocking: returns the delivery conduit as soon as the stream is
    /// open. A dedicated relay task republishes decoded events onto the
    /// conduit in receipt order and closes it exactly once when the stream
    /// terminates or the session closes. The decoder may return `None` to
    /// drop handshake frames. No reconnection is attempted here; that is a
    /// primitive-level policy.
    pub async fn do_command_stream<O, OFut, D, E>(
        self: &Arc<Self>,
        open: O,
        decode: D,
    ) -> SessionResult<mpsc::Receiver<E>>
    where
        O: FnOnce(Arc<dyn Transport>, RequestHeader) -> OFut + Send,
        OFut: Future<Output = Result<ReplyStream, TransportError>> + Send,
        D: FnMut(Reply) -> Option<E> + Send + 'static,
        E: Send + 'static,
    {
        let (stream_id, header) = {
            let mut state = self.state.lock();
            state.check_open()?;
            let stream_id = state.register_stream();
            (stream_id, state.command_header())
        };
        let opened = self
            .with_deadline(async {
                open(self.partition.transport(), header)
                    .await
                    .map_err(SessionError::from)
            })
            .await;
        match opened {
            Ok(replies) => Ok(relay::spawn(Arc::clone(self), stream_id, replies, decode)),
            Err(err) => {
                self.state.lock().unregister_stream(stream_id);
                Err(err)
            }
        }
    }

    /// Close the session gracefully, preserving the remote primitive state.
    pub async fn close(self: &Arc<Self>) -> SessionResult<()> {
        self.shutdown(false).await
    }

    /// Close the session and delete the remote primitive state.
    pub async fn delete(self: &Arc<Self>) -> SessionResult<()> {
        self.shutdown(true).await
    }

    async fn shutdown(self: &Arc<Self>, delete: bool) -> SessionResult<()> {
        self.state.lock().begin_close()?;
        let _ = self.shutdown_tx.send(true);
        if let Some(driver) = self.keepalive.lock().take() {
            driver.abort();
        }

        let handler = self.handler();
        let result = if delete {
            handler.delete(self).await
        } else {
            handler.close(self).await
        };
        // Terminal regardless of the close call outcome.
        self.state.lock().complete_close(delete);
        tracing::debug!(
            name = %self.name,
            session_id = %self.session_id(),
            deleted = delete,
            "session closed"
        );
        result
    }

    /// Force the session closed after the server reported it unknown.
    fn expire(&self) {
        {
            let mut state = self.state.lock();
            tracing::warn!(
                name = %self.name,
                session_id = %state.session_id(),
                "server reported session expired; failing all pending and future calls"
            );
            state.force_expire();
        }
        let _ = self.shutdown_tx.send(true);
    }

    /// Dispatch with retry, reusing the header (and therefore the sequence
    /// number) across attempts.
    async fn execute_with_retry<F, Fut>(
        &self,
        header: RequestHeader,
        call: &mut F,
    ) -> SessionResult<Reply>
    where
        F: FnMut(Arc<dyn Transport>, RequestHeader) -> Fut + Send,
        Fut: Future<Output = Result<Reply, TransportError>> + Send,
    {
        let backoff = self.config.retry.backoff();
        let max_attempts = self.config.retry.max_attempts;
        let mut attempt: u32 = 0;
        loop {
            // A close racing a pending retry fails the in-flight call.
            {
                let state = self.state.lock();
                if !matches!(state.state(), State::Open) {
                    return Err(state.closed_error());
                }
            }

            let transient = match call(self.partition.transport(), header.clone()).await {
                Ok(reply) => match reply.header.status {
                    ResponseStatus::NotLeader => {
                        tracing::debug!(
                            partition = %self.partition.id(),
                            leader_hint = ?reply.header.leader,
                            "addressed a non-leader replica"
                        );
                        SessionError::from(TransportError::rejected("not the partition leader"))
                    }
                    _ => return self.settle(reply),
                },
                Err(err) if err.is_retriable() => SessionError::from(err),
                Err(err) => return Err(err.into()),
            };

            if attempt + 1 >= max_attempts {
                return Err(transient);
            }
            let delay = backoff.delay(attempt);
            tracing::debug!(
                sequence = header.sequence,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %transient,
                "retrying after transient failure"
            );
            attempt += 1;
            tokio::time::sleep(delay).await;
        }
    }

    /// Interpret a terminal response status.
    fn settle(&self, reply: Reply) -> SessionResult<Reply> {
        match reply.header.status {
            ResponseStatus::Ok => {
                self.state.lock().record_index(reply.header.index);
                Ok(reply)
            }
            ResponseStatus::PreconditionFailed => Err(SessionError::PreconditionFailed),
            ResponseStatus::WriteLock => Err(SessionError::WriteLockFailed),
            ResponseStatus::SessionExpired => {
                self.expire();
                Err(SessionError::SessionExpired)
            }
            ResponseStatus::NotLeader => {
                Err(TransportError::rejected("not the partition leader").into())
            }
            ResponseStatus::Error => Err(TransportError::rejected("server error").into()),
        }
    }

    /// Bound a dispatch by the configured per-call deadline.
    ///
    /// On expiry the in-flight call is abandoned and `Cancelled` returned;
    /// a cancelled command's server-side effect is indeterminate.
    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = SessionResult<T>>,
    ) -> SessionResult<T> {
        match self.config.call_timeout() {
            Some(deadline) => match tokio::time::timeout(deadline, fut).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Cancelled),
            },
            None => fut.await,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("partition", &self.partition.id())
            .field("state", &self.state())
            .finish()
    }
}
