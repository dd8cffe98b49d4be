//! Public, transport-agnostic bus configuration.
//!
//! This type intentionally contains no broker-specific concepts (connection
//! strings, credentials, lock renewal). Transport implementations interpret
//! the few fields they need, such as the inbox capacity.

use crate::{Error, Result};

/// Largest number of messages handed to the transport in one batch call.
pub const DEFAULT_MAX_MESSAGES_PER_SEND: usize = 100;

/// Default buffer size of a receiver inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 16;

/// Handlers run one at a time per receiver unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 1;

/// Bus configuration.
///
/// # Example
///
/// ```
/// use mom_dispatch::BusConfig;
///
/// let config = BusConfig::new("billing-service")
///     .with_max_messages_per_send(50)
///     .with_inbox_capacity(64)
///     .with_max_concurrent_calls(4);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BusConfig {
    // ---
    /// Unique identifier for this bus instance, used for logging.
    pub transport_id: String,

    /// Page size used when batching outgoing envelopes.
    ///
    /// Each transport call carries at most this many messages.
    ///
    /// Default: 100
    pub max_messages_per_send: usize,

    /// Capacity of the channel backing each receiver subscription.
    ///
    /// Default: 16
    pub inbox_capacity: usize,

    /// Number of messages each receiver may be handling at once.
    ///
    /// With 1, a receiver's messages are handled strictly in arrival order.
    ///
    /// Default: 1
    pub max_concurrent_calls: usize,
}

impl BusConfig {
    /// Create a configuration with default limits.
    pub fn new(transport_id: impl Into<String>) -> Self {
        Self {
            transport_id: transport_id.into(),
            max_messages_per_send: DEFAULT_MAX_MESSAGES_PER_SEND,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
        }
    }

    /// Set the page size for batched sends.
    pub fn with_max_messages_per_send(mut self, max: usize) -> Self {
        self.max_messages_per_send = max;
        self
    }

    /// Set the receiver inbox capacity.
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    /// Set how many messages each receiver may handle concurrently.
    pub fn with_max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max;
        self
    }

    /// Check the configuration before it is used to compose a bus.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the transport id is empty or a
    /// limit is zero.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.transport_id.trim().is_empty() {
            return Err(Error::InvalidConfig("transport_id must not be empty".into()));
        }
        if self.max_messages_per_send == 0 {
            return Err(Error::InvalidConfig(
                "max_messages_per_send must be at least 1".into(),
            ));
        }
        if self.inbox_capacity == 0 {
            return Err(Error::InvalidConfig(
                "inbox_capacity must be at least 1".into(),
            ));
        }
        if self.max_concurrent_calls == 0 {
            return Err(Error::InvalidConfig(
                "max_concurrent_calls must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new("mom-dispatch")
    }
}
