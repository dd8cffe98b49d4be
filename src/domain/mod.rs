//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! transport implementations, codecs, or broker clients.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod envelope;
mod payload;
mod transport;

// --- Envelope domain re-exports ---

pub use envelope::{
    //
    Envelope,
    EVENT_TYPE_ID_PROPERTY,
    INTEGRATION_EVENT_MESSAGE_TYPE,
    MESSAGE_TYPE_PROPERTY,
    PAYLOAD_TYPE_ID_PROPERTY,
};

// --- Payload type identity ---

pub use payload::{simple_type_name, TypeKey};

// --- Transport domain re-exports ---

pub use transport::{
    //
    ClientKind,
    Destination,
    Receiver,
    ResourceId,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
};
