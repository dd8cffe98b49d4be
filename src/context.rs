//! Per-operation message context.
//!
//! A [`MessageContext`] carries the metadata of the operation currently being
//! processed (typically one inbound message) down to anything that dispatches
//! new messages from within it. It is passed explicitly; there is no
//! process-wide "current message".

use std::sync::Arc;

use crate::{CorrelationId, Envelope, Receiver};

/// Metadata of the operation on whose behalf messages are dispatched.
///
/// An empty context (the [`Default`]) means "no ambient operation": outgoing
/// envelopes get a freshly generated correlation id unless the dispatch
/// supplies one.
#[derive(Clone, Debug, Default)]
pub struct MessageContext {
    correlation_id: Option<CorrelationId>,
    message_id: Option<Arc<str>>,
    event_type_id: Option<Arc<str>>,
    receiver: Option<Receiver>,
}

impl MessageContext {
    /// A context with no ambient metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose correlation id is propagated to outgoing envelopes.
    pub fn with_correlation_id(correlation_id: impl Into<CorrelationId>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Self::default()
        }
    }

    /// Context for handling one inbound envelope.
    pub(crate) fn for_inbound(receiver: &Receiver, envelope: &Envelope, event_type_id: &str) -> Self {
        // ---
        Self {
            correlation_id: envelope.correlation_id.as_ref().map(CorrelationId::from),
            message_id: Some(envelope.message_id.clone()),
            event_type_id: Some(Arc::from(event_type_id)),
            receiver: Some(receiver.clone()),
        }
    }

    /// Ambient correlation id, if any.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// Id of the inbound message being processed.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Event type id of the inbound message being processed.
    pub fn event_type_id(&self) -> Option<&str> {
        self.event_type_id.as_deref()
    }

    /// Receiver the inbound message arrived on.
    pub fn receiver(&self) -> Option<&Receiver> {
        self.receiver.as_ref()
    }
}
