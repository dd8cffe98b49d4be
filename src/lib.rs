//! Typed event dispatch and reception over queue/topic message brokers.
//!
//! The outbound side maps payload types to destinations, wraps each payload
//! in an envelope tagged with its payload type id and correlation id, and
//! sends envelopes in pages grouped by destination. The inbound side maps
//! (receiver, event type id) to a handler, validated once at composition
//! time, and routes each received envelope to at most one handler.
//!
//! Brokers are reached through the [`Transport`] trait; an in-memory
//! implementation ([`MemoryHub`]) ships with the crate.
//!

// Import all sub modules once...
mod macros;

mod domain;
mod transport;

mod dispatch;
mod reception;

mod bus;
mod bus_builder;
mod bus_config;

mod codec;
mod context;
mod correlation;
mod error;
mod sync;

pub(crate) use macros::{log_debug, log_error, log_info, log_trace, log_warn};
pub(crate) use sync::lock_ignore_poison;

// Re-export main types
pub use bus::EventBus;
pub use bus_builder::EventBusBuilder;
pub use bus_config::{
    //
    BusConfig,
    DEFAULT_INBOX_CAPACITY,
    DEFAULT_MAX_CONCURRENT_CALLS,
    DEFAULT_MAX_MESSAGES_PER_SEND,
};

pub use codec::{CodecPtr, JsonCodec, PayloadCodec, SerializedBody, JSON_CONTENT_TYPE};
pub use context::MessageContext;
pub use correlation::CorrelationId;
pub use error::{BoxError, Error, Result};

pub use transport::{
    //
    create_memory_transport,
    create_memory_transport_with_hub,
    MemoryHub,
    SentBatch,
};

// --- dispatch side
pub use dispatch::{
    //
    build_envelope,
    Dispatch,
    DispatchBuffer,
    DispatchRegistration,
    DispatchRegistrationBuilder,
    DispatchRegistry,
    DispatchRegistryBuilder,
    DispatchSender,
};

// --- reception side
pub use reception::{
    //
    spawn_receivers,
    EventHandler,
    FnHandler,
    ReceptionDispatcher,
    ReceptionOutcome,
    ReceptionRegistration,
    ReceptionRegistrationBuilder,
    ReceptionRegistry,
    ReceptionRegistryBuilder,
    RegistrationSummary,
};

// --- public re-exports
pub use domain::{
    //
    simple_type_name,
    ClientKind,
    Destination,
    Envelope,
    Receiver,
    ResourceId,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
    TypeKey,
    EVENT_TYPE_ID_PROPERTY,
    INTEGRATION_EVENT_MESSAGE_TYPE,
    MESSAGE_TYPE_PROPERTY,
    PAYLOAD_TYPE_ID_PROPERTY,
};
