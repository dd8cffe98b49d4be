//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended for tests, local execution, and as the
//! reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! - A queue destination reaches every receiver of that queue.
//! - A topic destination fans out to every subscription of that topic.
//! - Once `subscribe()` returns successfully, envelopes sent *after* that
//!   point to a matching destination are deliverable.
//! - A batch is delivered in order, and batches are delivered in call order.
//! - A scheduled batch is delivered once its enqueue time has passed.
//!
//! A hub built with [`MemoryHub::recording`] keeps every
//! `send_batch`/`schedule_batch` call, so tests can inspect exactly how the
//! dispatch side paged its output. Other hubs keep nothing.
//!
//! Inboxes whose [`SubscriptionHandle`] was dropped are pruned on the next
//! delivery that reaches them and on every `subscribe()`.
//!
//! ## Non-Goals
//!
//! This transport does not emulate the failure modes, persistence, locking,
//! or redelivery of any specific broker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    lock_ignore_poison,
    log_debug,
    log_info,
    BusConfig,
    Destination,
    Envelope,
    Receiver,
    Result,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
};

type Subscriptions = HashMap<Receiver, Vec<mpsc::Sender<Envelope>>>;

/// One recorded `send_batch` or `schedule_batch` call.
#[derive(Clone, Debug)]
pub struct SentBatch {
    pub destination: Destination,
    pub messages: Vec<Envelope>,
    /// `Some` for `schedule_batch` calls.
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Shared broker for the in-memory transport.
///
/// All transports that share a hub can send to and receive from each other's
/// entities, exactly as clients of one namespace on a real broker would.
///
/// # Usage in Integration Tests
///
/// Parallel tests should each construct their own hub and pass it to
/// [`create_memory_transport_with_hub`]:
///
/// ```
/// # use mom_dispatch::{BusConfig, MemoryHub};
/// # async fn example() -> mom_dispatch::Result<()> {
/// let hub = MemoryHub::recording();
///
/// let publisher = mom_dispatch::create_memory_transport_with_hub(
///     &BusConfig::new("publisher"),
///     hub.clone(),
/// ).await?;
/// let consumer = mom_dispatch::create_memory_transport_with_hub(
///     &BusConfig::new("consumer"),
///     hub.clone(),
/// ).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<Subscriptions>,
    // None unless built with `recording()`
    batches: Option<Mutex<Vec<SentBatch>>>,
}

/// Drop inboxes whose handle is gone, and receivers left with none.
fn prune_closed(subs: &mut Subscriptions) {
    // ---
    subs.retain(|_, senders| {
        senders.retain(|sender| !sender.is_closed());
        !senders.is_empty()
    });
}

impl MemoryHub {
    /// Create a new, empty hub that keeps no batch log.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a new, empty hub that records every batch handed to it.
    ///
    /// The log grows with every send until [`clear_sent_batches`] is called;
    /// meant for tests.
    ///
    /// [`clear_sent_batches`]: Self::clear_sent_batches
    pub fn recording() -> Arc<Self> {
        Arc::new(Self {
            batches: Some(Mutex::default()),
            ..Self::default()
        })
    }

    pub fn is_recording(&self) -> bool {
        self.batches.is_some()
    }

    /// Every batch handed to the hub so far, in call order.
    ///
    /// Always empty unless the hub was built with [`recording`](Self::recording).
    pub fn sent_batches(&self) -> Vec<SentBatch> {
        // ---
        match &self.batches {
            Some(batches) => lock_ignore_poison(batches).clone(),
            None => Vec::new(),
        }
    }

    /// Batches sent to `destination`, in call order.
    pub fn sent_batches_to(&self, destination: &Destination) -> Vec<SentBatch> {
        // ---
        let Some(batches) = &self.batches else {
            return Vec::new();
        };
        lock_ignore_poison(batches)
            .iter()
            .filter(|b| &b.destination == destination)
            .cloned()
            .collect()
    }

    /// Forget the recorded batches.
    pub fn clear_sent_batches(&self) {
        if let Some(batches) = &self.batches {
            lock_ignore_poison(batches).clear();
        }
    }

    /// Number of live subscription inboxes on the hub.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.values().map(Vec::len).sum()
    }

    fn record(&self, destination: &Destination, messages: &[Envelope], scheduled_for: Option<DateTime<Utc>>) {
        // ---
        let Some(batches) = &self.batches else {
            return;
        };
        lock_ignore_poison(batches).push(SentBatch {
            destination: destination.clone(),
            messages: messages.to_vec(),
            scheduled_for,
        });
    }

    async fn deliver(&self, transport_id: &str, destination: &Destination, messages: Vec<Envelope>) {
        // ---
        // Snapshot the matching inboxes so no lock is held while sending
        let targets: Vec<(Receiver, Vec<mpsc::Sender<Envelope>>)> = {
            let subs = self.subscriptions.read().await;
            subs.iter()
                .filter(|(receiver, _)| receiver.listens_to(destination))
                .map(|(receiver, senders)| (receiver.clone(), senders.clone()))
                .collect()
        };

        let mut saw_closed = false;
        for (receiver, senders) in targets {
            log_debug!(
                "{transport_id}: deliver {} message(s) from {destination} to {receiver}",
                messages.len()
            );

            for sender in senders {
                for envelope in &messages {
                    // A closed channel is a dropped SubscriptionHandle.
                    if sender.send(envelope.clone()).await.is_err() {
                        log_info!("{transport_id}: inbox of {receiver} closed");
                        saw_closed = true;
                        break;
                    }
                }
            }
        }

        if saw_closed {
            prune_closed(&mut *self.subscriptions.write().await);
        }
    }

    async fn subscribe(&self, transport_id: &str, receiver: &Receiver, capacity: usize) -> SubscriptionHandle {
        // ---
        log_debug!("{transport_id}: subscribe to {receiver}");

        let (tx, rx) = mpsc::channel(capacity.max(1));

        let mut subs = self.subscriptions.write().await;
        prune_closed(&mut subs);
        subs.entry(receiver.clone()).or_default().push(tx);

        SubscriptionHandle { inbox: rx }
    }

    async fn close(&self, transport_id: &str) {
        // ---
        log_debug!("{transport_id}: closing transport...");

        let mut subs = self.subscriptions.write().await;
        subs.clear();
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory transport.
///
/// Routes envelopes through a shared [`MemoryHub`].
struct MemoryTransport {
    // ---
    base: TransportBase,
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    /// Record the batch if the hub is recording, and deliver it to every
    /// matching receiver.
    async fn send_batch(&self, destination: &Destination, messages: Vec<Envelope>) -> Result<()> {
        // ---
        self.hub.record(destination, &messages, None);
        self.hub
            .deliver(self.transport_id(), destination, messages)
            .await;
        Ok(())
    }

    /// Record the batch if the hub is recording, and deliver it once
    /// `enqueue_time` has passed.
    ///
    /// Envelopes carry `enqueue_time` in `scheduled_enqueue_time`. A time in
    /// the past delivers immediately.
    async fn schedule_batch(
        &self,
        destination: &Destination,
        mut messages: Vec<Envelope>,
        enqueue_time: DateTime<Utc>,
    ) -> Result<()> {
        // ---
        for envelope in &mut messages {
            envelope.scheduled_enqueue_time = Some(enqueue_time);
        }
        self.hub.record(destination, &messages, Some(enqueue_time));

        let delay = (enqueue_time - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if delay.is_zero() {
            self.hub
                .deliver(self.transport_id(), destination, messages)
                .await;
            return Ok(());
        }

        log_debug!(
            "{}: {} message(s) to {destination} scheduled for {enqueue_time}",
            self.transport_id(),
            messages.len()
        );

        let hub = self.hub.clone();
        let transport_id = self.base.transport_id.clone();
        let destination = destination.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            hub.deliver(&transport_id, &destination, messages).await;
        });

        Ok(())
    }

    /// Register a receiver on the shared hub.
    async fn subscribe(&self, receiver: &Receiver) -> Result<SubscriptionHandle> {
        Ok(self
            .hub
            .subscribe(self.transport_id(), receiver, self.base.inbox_capacity)
            .await)
    }

    /// Close the transport.
    ///
    /// Drops every subscription on the shared hub, which ends their inboxes.
    /// Transports sharing the hub are affected too; use per-test hubs to
    /// avoid this.
    async fn close(&self) -> Result<()> {
        self.hub.close(self.transport_id()).await;
        Ok(())
    }
}

/// Create a new in-memory transport using the process-global hub.
///
/// For isolated parallel testing, use [`create_memory_transport_with_hub`].
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if `config`
/// does not validate.
pub async fn create_memory_transport(config: &BusConfig) -> Result<TransportPtr> {
    // ---
    create_memory_transport_with_hub(config, global_hub()).await
}

/// Create a new in-memory transport using the provided hub.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if `config`
/// does not validate.
pub async fn create_memory_transport_with_hub(
    config: &BusConfig,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    config.validate()?;
    log_debug!("{}: create memory transport", config.transport_id);

    let transport = MemoryTransport {
        base: TransportBase::from(config),
        hub,
    };

    Ok(Arc::new(transport))
}
