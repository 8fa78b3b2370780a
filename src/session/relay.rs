//! Event stream relay.
//!
//! Bridges a server-push stream onto a consumer-facing delivery conduit.
//! One dedicated task per open watch receives replies in order, records
//! each reply's stream position for keepalive acknowledgement, decodes it
//! into a typed event, and delivers it on a bounded channel. Events are
//! never dropped or reordered: a slow consumer blocks delivery, which in
//! turn blocks further receives from the network stream.
//!
//! The conduit closes exactly once, when the server stream ends cleanly,
//! fails, or the session shuts down. Consumers detect end-of-stream by
//! conduit closure; no reconnection is attempted here.

use super::Session;
use crate::headers::Reply;
use crate::transport::ReplyStream;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Spawn the relay task for a newly opened stream and return its conduit.
pub(crate) fn spawn<D, E>(
    session: Arc<Session>,
    stream_id: u64,
    mut replies: ReplyStream,
    mut decode: D,
) -> mpsc::Receiver<E>
where
    D: FnMut(Reply) -> Option<E> + Send + 'static,
    E: Send + 'static,
{
    let (tx, rx) = mpsc::channel(session.config().stream_buffer);
    let mut shutdown = session.shutdown_receiver();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!(stream_id, "session shutdown; closing event stream");
                        break;
                    }
                }
                next = replies.recv() => match next {
                    Some(Ok(reply)) => {
                        if let Some(position) = reply.header.stream {
                            session.note_stream_event(
                                stream_id,
                                position.sequence,
                                reply.header.index,
                            );
                        }
                        if let Some(event) = decode(reply) {
                            // Blocks when the consumer is slow; never drops.
                            if tx.send(event).await.is_err() {
                                tracing::debug!(stream_id, "consumer dropped; closing event stream");
                                break;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(
                            stream_id,
                            error = %err,
                            "event stream terminated with transport error"
                        );
                        break;
                    }
                    // Clean server close.
                    None => break,
                },
            }
        }
        session.release_stream(stream_id);
        // Dropping `tx` here closes the conduit exactly once.
    });

    rx
}
