// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the narrow interface the dispatch and reception layers
//! use to reach a queue/topic broker. It intentionally avoids any reference to
//! concrete brokers or client libraries.
//!
//! The transport layer is responsible only for delivering envelopes to
//! physical entities. Routing by payload type, correlation, batching and
//! handler lookup are handled elsewhere.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::ensure_not_empty;
use crate::{BusConfig, Envelope, Result};

/// Kind of broker entity a registration talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientKind {
    /// Point-to-point queue; usable for both sending and receiving.
    Queue,
    /// Publish side of a topic.
    Topic,
    /// Receive side of a topic.
    Subscription,
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        let name = match self {
            ClientKind::Queue => "Queue",
            ClientKind::Topic => "Topic",
            ClientKind::Subscription => "Subscription",
        };
        f.write_str(name)
    }
}

/// Opaque name of a physical queue or topic sender.
///
/// Resource ids are immutable, cheap to clone, and safe to share across
/// threads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(pub Arc<str>);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for ResourceId
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        ResourceId(value.into())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A physical send target: one queue or one topic.
///
/// Every envelope group produced by the dispatch sender maps to exactly one
/// destination.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    pub client_kind: ClientKind,
    pub resource_id: ResourceId,
}

impl Destination {
    /// Send to a queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) if
    /// `queue_name` is empty.
    pub fn queue(queue_name: &str) -> Result<Self> {
        // ---
        ensure_not_empty(queue_name, "queue_name")?;
        Ok(Self {
            client_kind: ClientKind::Queue,
            resource_id: ResourceId::from(queue_name),
        })
    }

    /// Publish to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) if
    /// `topic_name` is empty.
    pub fn topic(topic_name: &str) -> Result<Self> {
        // ---
        ensure_not_empty(topic_name, "topic_name")?;
        Ok(Self {
            client_kind: ClientKind::Topic,
            resource_id: ResourceId::from(topic_name),
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client_kind, self.resource_id)
    }
}

/// A physical receive source: one queue or one topic subscription.
///
/// The entity path of a queue is its name; the entity path of a subscription
/// is `{topic}/Subscriptions/{subscription}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Receiver {
    client_kind: ClientKind,
    entity_path: Arc<str>,
    source: Arc<str>,
}

impl Receiver {
    /// Receive from a queue.
    pub fn queue(queue_name: &str) -> Result<Self> {
        // ---
        ensure_not_empty(queue_name, "queue_name")?;
        Ok(Self {
            client_kind: ClientKind::Queue,
            entity_path: Arc::from(queue_name),
            source: Arc::from(queue_name),
        })
    }

    /// Receive from a subscription of a topic.
    pub fn subscription(topic_name: &str, subscription_name: &str) -> Result<Self> {
        // ---
        ensure_not_empty(topic_name, "topic_name")?;
        ensure_not_empty(subscription_name, "subscription_name")?;
        Ok(Self {
            client_kind: ClientKind::Subscription,
            entity_path: Arc::from(format!("{topic_name}/Subscriptions/{subscription_name}")),
            source: Arc::from(topic_name),
        })
    }

    pub fn client_kind(&self) -> ClientKind {
        self.client_kind
    }

    pub fn entity_path(&self) -> &str {
        &self.entity_path
    }

    /// Queue name, or topic name for a subscription.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether envelopes sent to `destination` reach this receiver.
    pub fn listens_to(&self, destination: &Destination) -> bool {
        // ---
        match (self.client_kind, destination.client_kind) {
            (ClientKind::Queue, ClientKind::Queue) | (ClientKind::Subscription, ClientKind::Topic) => {
                *self.source == *destination.resource_id.0
            }
            _ => false,
        }
    }
}

impl fmt::Display for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client_kind, self.entity_path)
    }
}

/// Shared base state for all transport implementations.
///
/// Each concrete transport embeds this as a field named `base`:
///
/// ```ignore
/// struct BrokerTransport {
///     base: TransportBase,
///     // ... broker specific fields
/// }
///
/// impl Transport for BrokerTransport {
///     fn base(&self) -> &TransportBase { &self.base }
/// }
/// ```
pub struct TransportBase {
    /// Unique identifier for this transport instance.
    pub transport_id: String,
    /// Capacity of each subscription inbox.
    pub inbox_capacity: usize,
}

impl From<&BusConfig> for TransportBase {
    fn from(config: &BusConfig) -> Self {
        // ---
        Self {
            transport_id: config.transport_id.clone(),
            inbox_capacity: config.inbox_capacity,
        }
    }
}

/// Handle returned from a successful subscription.
///
/// Dropping the handle unsubscribes the receiver.
pub struct SubscriptionHandle {
    // ---
    /// Receiver channel for delivered envelopes.
    pub inbox: mpsc::Receiver<Envelope>,
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - `send_batch()` and `schedule_batch()` deliver the batch in order; callers
///   never pass more messages than the configured page size.
/// - Once `subscribe()` returns successfully, messages sent *after* that point
///   to a matching destination are deliverable.
/// - Failures are reported, never retried silently.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Returns the transport_id of the transport.
    ///
    /// Default implementation delegates to `base()`.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Send one page of envelopes to a queue or topic.
    async fn send_batch(&self, destination: &Destination, messages: Vec<Envelope>) -> Result<()>;

    /// Hand one page of envelopes to the broker for delivery at
    /// `enqueue_time`.
    async fn schedule_batch(
        &self,
        destination: &Destination,
        messages: Vec<Envelope>,
        enqueue_time: DateTime<Utc>,
    ) -> Result<()>;

    /// Start receiving from a queue or subscription.
    async fn subscribe(&self, receiver: &Receiver) -> Result<SubscriptionHandle>;

    /// Close the transport and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// Cloning only increments a reference count; all clones share the same
/// underlying connection.
pub type TransportPtr = Arc<dyn Transport>;
