//! Keepalive driver.
//!
//! One background task per open session renews the session strictly before
//! its negotiated timeout elapses. Each tick issues the handler's keepalive
//! call, which carries the current command sequence number and stream
//! acknowledgements. A failed keepalive is logged and tolerated; only an
//! explicit close or a definitive expiry report from the server terminates
//! the session.

use super::{Session, State};
use crate::core::error::SessionError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawn the keepalive driver for an open session.
///
/// The driver runs until the session's shutdown signal fires or the session
/// stops being open.
pub(crate) fn spawn(session: Arc<Session>) -> JoinHandle<()> {
    let interval = session.config().keepalive_interval();
    let handler = session.handler();
    let mut shutdown = session.shutdown_receiver();

    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match handler.keep_alive(&session).await {
                        Ok(()) => {
                            tracing::trace!(
                                session_id = %session.session_id(),
                                "keepalive renewed"
                            );
                        }
                        Err(SessionError::SessionExpired) => {
                            // The session was already forced closed.
                            break;
                        }
                        Err(err) => {
                            if session.state() != State::Open {
                                break;
                            }
                            // Not terminal on its own: the session closes only
                            // on explicit close or a definitive expiry report.
                            tracing::warn!(
                                session_id = %session.session_id(),
                                error = %err,
                                "keepalive failed; session retained"
                            );
                        }
                    }
                }
            }
        }
    })
}
