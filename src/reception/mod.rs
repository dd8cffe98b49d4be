//! Inbound side: envelopes routed to typed handlers.
//!
//! - [`ReceptionRegistry`] binds (receiver, event type id) to a handler and
//!   rejects duplicate declarations when built.
//! - [`ReceptionDispatcher`] looks up, decodes and invokes for one envelope.
//! - [`spawn_receivers`] drives every receiver's inbox through the dispatcher.

mod dispatcher;
mod handler;
mod registry;
mod runner;

pub use dispatcher::{ReceptionDispatcher, ReceptionOutcome};
pub use handler::{EventHandler, FnHandler};
pub use registry::{
    //
    ReceptionRegistration,
    ReceptionRegistrationBuilder,
    ReceptionRegistry,
    ReceptionRegistryBuilder,
    RegistrationSummary,
};
pub use runner::spawn_receivers;
