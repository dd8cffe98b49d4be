//! Receive loops.
//!
//! Glue between a [`Transport`](crate::Transport) and the
//! [`ReceptionDispatcher`]: one spawned task per receiver, each draining its
//! subscription inbox until cancelled.
//!
//! ## Error handling
//!
//! A message that fails (missing event type id, undecodable body, handler
//! error) is logged and the loop moves on to the next one. Redelivery and
//! dead-lettering belong to the broker, not to this loop.
//!
//! ## Concurrency
//!
//! Each loop holds a semaphore of `max_concurrent_calls` permits and takes a
//! permit before pulling the next message, so at most that many handlers of
//! one receiver run at once. With one permit, messages are handled strictly
//! in arrival order.
//!
//! ## Lifecycle
//!
//! Loops stop when the cancellation token fires or when the transport closes
//! the inbox, then wait for their in-flight handlers. Dropping the returned
//! handles does not stop them.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    // ---
    log_debug,
    log_error,
    log_warn,
    Envelope,
    Error,
    Receiver,
    ReceptionDispatcher,
    ReceptionOutcome,
    Result,
    TransportPtr,
};

/// Subscribe to every receiver of the dispatcher's registry and start one
/// receive loop per receiver.
///
/// All subscriptions are established before this returns, so messages sent
/// afterwards are deliverable. Each handler sees a child of `cancel`. Every
/// receiver runs at most `max_concurrent_calls` handlers at once (at least
/// one).
///
/// # Errors
///
/// Returns the first subscription failure. Loops already started for
/// earlier receivers are cancelled.
pub async fn spawn_receivers(
    transport: TransportPtr,
    dispatcher: Arc<ReceptionDispatcher>,
    cancel: CancellationToken,
    max_concurrent_calls: usize,
) -> Result<Vec<JoinHandle<()>>> {
    // ---
    let receivers = dispatcher.registry().receivers().to_vec();
    let mut joins = Vec::with_capacity(receivers.len());
    let started = cancel.child_token();
    let max_concurrent_calls = max_concurrent_calls.max(1);

    for receiver in receivers {
        let mut handle = match transport.subscribe(&receiver).await {
            Ok(h) => h,
            Err(e) => {
                log_error!("{}: failed to subscribe to {receiver}: {e}", transport.transport_id());
                started.cancel();
                return Err(e);
            }
        };

        let dispatcher = dispatcher.clone();
        let cancel = started.clone();
        let permits = Arc::new(Semaphore::new(max_concurrent_calls));

        log_debug!("{}: receive loop started for {receiver}", transport.transport_id());

        joins.push(tokio::spawn(async move {
            // ---
            let mut in_flight = JoinSet::new();

            loop {
                let permit = tokio::select! {
                    _ = cancel.cancelled() => break,
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let envelope = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = handle.inbox.recv() => match next {
                        Some(envelope) => envelope,
                        None => break,
                    },
                };

                let dispatcher = dispatcher.clone();
                let receiver = receiver.clone();
                let cancel = cancel.clone();
                in_flight.spawn(async move {
                    handle_one(&dispatcher, &receiver, envelope, cancel).await;
                    drop(permit);
                });

                // reap finished handlers
                while in_flight.try_join_next().is_some() {}
            }

            while in_flight.join_next().await.is_some() {}
            log_debug!("receive loop stopped for {receiver}");
        }));
    }

    Ok(joins)
}

/// Dispatch one message and log its failure, if any.
async fn handle_one(
    dispatcher: &ReceptionDispatcher,
    receiver: &Receiver,
    envelope: Envelope,
    cancel: CancellationToken,
) {
    // ---
    let message_id = envelope.message_id.clone();
    match dispatcher.dispatch(receiver, envelope, cancel).await {
        Ok(ReceptionOutcome::Ignored { .. }) | Ok(ReceptionOutcome::Handled { .. }) => {}
        Err(e @ Error::MissingEventTypeId { .. }) => {
            log_warn!("{receiver}: {e}");
        }
        Err(e) => {
            log_error!("{receiver}: message {message_id} failed: {e}");
        }
    }
}
