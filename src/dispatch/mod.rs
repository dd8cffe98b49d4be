//! Outbound side: typed dispatches fanned out to registered destinations.
//!
//! - [`DispatchRegistry`] maps a payload type to its destinations.
//! - [`build_envelope`] turns one (dispatch, destination) pair into a wire
//!   envelope.
//! - [`DispatchSender`] groups envelopes per destination, paginates them and
//!   hands each page to the transport.
//! - [`DispatchBuffer`] collects dispatches during a unit of work for a single
//!   later send.

mod buffer;
mod envelope;
mod registry;
mod sender;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::{CorrelationId, TypeKey};

pub use buffer::DispatchBuffer;
pub use envelope::build_envelope;
pub use registry::{
    //
    DispatchRegistration,
    DispatchRegistrationBuilder,
    DispatchRegistry,
    DispatchRegistryBuilder,
};
pub use sender::DispatchSender;

/// One outbound message request, before destination resolution.
///
/// # Example
///
/// ```
/// # use mom_dispatch::Dispatch;
/// #[derive(serde::Serialize)]
/// struct InvoicePaid { invoice: u64 }
///
/// let dispatch = Dispatch::new(InvoicePaid { invoice: 7 })
///     .with_session_id("customer-12")
///     .with_correlation_id("checkout-99");
///
/// assert_eq!(dispatch.payload::<InvoicePaid>().map(|p| p.invoice), Some(7));
/// ```
pub struct Dispatch {
    payload: Box<dyn Any + Send + Sync>,
    payload_type: TypeKey,
    session_id: Option<Arc<str>>,
    correlation_id: Option<CorrelationId>,
}

impl Dispatch {
    /// Wrap a payload. Its concrete type selects the destinations.
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        // ---
        Self {
            payload: Box::new(payload),
            payload_type: TypeKey::of::<T>(),
            session_id: None,
            correlation_id: None,
        }
    }

    /// Set the session id of every envelope built from this dispatch.
    pub fn with_session_id(mut self, session_id: impl Into<Arc<str>>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Override the correlation id of every envelope built from this dispatch.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn payload_type(&self) -> TypeKey {
        self.payload_type
    }

    /// Borrow the payload as `T`, if that is its type.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn session_id(&self) -> Option<&Arc<str>> {
        self.session_id.as_ref()
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    pub(crate) fn payload_any(&self) -> &(dyn Any + Send + Sync) {
        &*self.payload
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("payload_type", &self.payload_type)
            .field("session_id", &self.session_id)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}
