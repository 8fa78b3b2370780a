//! Common test utilities.
//!
//! This module contains a scripted in-memory transport standing in for an
//! established partition connection, plus a minimal primitive handler.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether::{
    Frame, Partition, PartitionId, PrimitiveName, Reply, ReplyStream, ResponseHeader,
    ResponseStatus, Session, SessionConfig, SessionHandler, SessionId, SessionResult, Transport,
    TransportError,
};
use tokio::sync::mpsc;

/// Scripted outcome for the next transport call. Calls with no scripted
/// outcome succeed with an `Ok` status.
pub enum UnaryOutcome {
    /// Respond with the given status.
    Respond(ResponseStatus),
    /// Fail at the transport layer.
    Fail(TransportError),
    /// Never respond; used for deadline tests.
    Stall,
}

/// A recorded transport call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub frame: Frame,
}

/// In-memory transport acting as a well-behaved server unless scripted
/// otherwise.
pub struct MockTransport {
    next_session_id: AtomicU64,
    next_index: AtomicU64,
    calls: Mutex<Vec<RecordedCall>>,
    script: Mutex<VecDeque<UnaryOutcome>>,
    stream_tx: Mutex<Option<mpsc::Sender<Result<Reply, TransportError>>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_session_id: AtomicU64::new(100),
            next_index: AtomicU64::new(0),
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            stream_tx: Mutex::new(None),
        })
    }

    /// Queue an outcome for the next unscripted call.
    pub fn script(&self, outcome: UnaryOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Total number of transport calls observed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls for one method.
    pub fn count_method(&self, method: &str) -> usize {
        self.frames_for(method).len()
    }

    /// Request frames recorded for one method, in call order.
    pub fn frames_for(&self, method: &str) -> Vec<Frame> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == method)
            .map(|call| call.frame.clone())
            .collect()
    }

    /// Push one item onto the open server stream.
    pub async fn emit(&self, item: Result<Reply, TransportError>) {
        let tx = self
            .stream_tx
            .lock()
            .clone()
            .expect("no open server stream");
        tx.send(item).await.expect("stream receiver dropped");
    }

    /// Push one event reply onto the open server stream.
    pub async fn emit_event(&self, session_id: SessionId, index: u64, stream_id: u64, seq: u64) {
        let header = ResponseHeader::event(session_id, index, stream_id, seq);
        self.emit(Ok(Reply::new(header, Bytes::from(format!("event-{}", seq)))))
            .await;
    }

    /// Close the open server stream cleanly.
    pub fn close_stream(&self) {
        self.stream_tx.lock().take();
    }

    fn respond(&self, request: &Frame, status: ResponseStatus) -> Reply {
        let session_id = if request.header.session_id.is_assigned() {
            request.header.session_id
        } else {
            SessionId(self.next_session_id.fetch_add(1, Ordering::SeqCst))
        };
        let index = match status {
            ResponseStatus::Ok => self.next_index.fetch_add(1, Ordering::SeqCst) + 1,
            _ => self.next_index.load(Ordering::SeqCst),
        };
        Reply::header_only(ResponseHeader::status(session_id, index, status))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn unary(&self, method: &str, request: Frame) -> Result<Reply, TransportError> {
        self.calls.lock().push(RecordedCall {
            method: method.to_string(),
            frame: request.clone(),
        });
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(UnaryOutcome::Respond(ResponseStatus::Ok));
        match outcome {
            UnaryOutcome::Respond(status) => Ok(self.respond(&request, status)),
            UnaryOutcome::Fail(err) => Err(err),
            UnaryOutcome::Stall => {
                tokio::time::sleep(Duration::from_secs(86_400)).await;
                Err(TransportError::Timeout)
            }
        }
    }

    async fn server_stream(
        &self,
        method: &str,
        request: Frame,
    ) -> Result<ReplyStream, TransportError> {
        self.calls.lock().push(RecordedCall {
            method: method.to_string(),
            frame: request,
        });
        if let Some(outcome) = self.script.lock().pop_front() {
            if let UnaryOutcome::Fail(err) = outcome {
                return Err(err);
            }
        }
        let (tx, rx) = mpsc::channel(16);
        *self.stream_tx.lock() = Some(tx);
        Ok(rx)
    }
}

/// Handler issuing the lifecycle calls of a toy primitive.
pub struct TestHandler;

#[async_trait]
impl SessionHandler for TestHandler {
    async fn create(&self, session: &Arc<Session>) -> SessionResult<()> {
        session
            .do_create(|transport, header| async move {
                transport.unary("create", Frame::header_only(header)).await
            })
            .await
            .map(|_| ())
    }

    async fn keep_alive(&self, session: &Arc<Session>) -> SessionResult<()> {
        session
            .do_keep_alive(|transport, header| async move {
                transport
                    .unary("keepalive", Frame::header_only(header))
                    .await
            })
            .await
            .map(|_| ())
    }

    async fn close(&self, session: &Arc<Session>) -> SessionResult<()> {
        session
            .do_close(|transport, header| async move {
                transport.unary("close", Frame::header_only(header)).await
            })
            .await
            .map(|_| ())
    }

    async fn delete(&self, session: &Arc<Session>) -> SessionResult<()> {
        session
            .do_close(|transport, header| async move {
                transport.unary("delete", Frame::header_only(header)).await
            })
            .await
            .map(|_| ())
    }
}

/// Open a session against the mock transport.
pub async fn open_session(mock: &Arc<MockTransport>, config: SessionConfig) -> Arc<Session> {
    let transport: Arc<dyn Transport> = mock.clone();
    let partition = Partition::new(PartitionId(0), transport);
    Session::open(
        PrimitiveName::new("test", "primitive"),
        partition,
        Arc::new(TestHandler),
        config,
    )
    .await
    .expect("failed to open session")
}

/// Issue a command with an empty payload through the mock transport.
pub async fn do_test_command(session: &Session) -> SessionResult<Reply> {
    session
        .do_command(|transport, header| async move {
            transport.unary("command", Frame::header_only(header)).await
        })
        .await
}

/// Issue a query with an empty payload through the mock transport.
pub async fn do_test_query(session: &Session) -> SessionResult<Reply> {
    session
        .do_query(|transport, header| async move {
            transport.unary("query", Frame::header_only(header)).await
        })
        .await
}

/// A decoded watch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEvent {
    pub sequence: u64,
    pub payload: Bytes,
}

/// Open a watch that decodes event replies and drops handshake frames.
pub async fn open_test_watch(session: &Arc<Session>) -> SessionResult<mpsc::Receiver<TestEvent>> {
    session
        .do_command_stream(
            |transport, header| async move {
                transport
                    .server_stream("events", Frame::header_only(header))
                    .await
            },
            |reply| {
                reply.header.stream.map(|position| TestEvent {
                    sequence: position.sequence,
                    payload: reply.payload,
                })
            },
        )
        .await
}
