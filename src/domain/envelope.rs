//! Wire-level message envelope.
//!
//! An [`Envelope`] is what the transport actually carries. The dispatch side
//! builds one per (dispatch, destination) pair; the reception side reads the
//! payload type id header to route it to a handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::SerializedBody;

/// Application property naming the payload type of the body.
///
/// Its value must match the event type id a receiver registered with.
pub const PAYLOAD_TYPE_ID_PROPERTY: &str = "PayloadTypeId";

/// Legacy name of [`PAYLOAD_TYPE_ID_PROPERTY`], still honored on reception.
pub const EVENT_TYPE_ID_PROPERTY: &str = "EventTypeId";

/// Application property distinguishing this protocol's messages from
/// unrelated traffic on the same entity.
pub const MESSAGE_TYPE_PROPERTY: &str = "MessageType";

/// Value of [`MESSAGE_TYPE_PROPERTY`] for dispatched payloads.
pub const INTEGRATION_EVENT_MESSAGE_TYPE: &str = "IntegrationEvent";

/// A wire message.
///
/// The transport does not interpret the body or the application properties;
/// it is responsible only for delivery.
///
/// # Example
///
/// ```
/// # use mom_dispatch::{Envelope, PAYLOAD_TYPE_ID_PROPERTY};
/// # use bytes::Bytes;
/// let mut envelope = Envelope::new(Bytes::from_static(br#"{"id":1}"#));
/// envelope.set_property(PAYLOAD_TYPE_ID_PROPERTY, "InvoicePaid");
///
/// assert_eq!(envelope.payload_type_id(), Some("InvoicePaid"));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    // ---
    /// Unique message identifier, generated on construction.
    pub message_id: Arc<str>,

    /// Opaque, already serialized body.
    pub body: Bytes,

    /// Body format (e.g. `"application/json"`).
    pub content_type: Option<Arc<str>>,

    /// Correlation identifier shared by messages of one logical operation.
    pub correlation_id: Option<Arc<str>>,

    /// Session identifier for session-aware entities.
    pub session_id: Option<Arc<str>>,

    /// Human-readable label.
    pub subject: Option<Arc<str>>,

    /// User-level headers.
    pub application_properties: BTreeMap<String, String>,

    /// Set by the transport when the message was scheduled.
    pub scheduled_enqueue_time: Option<DateTime<Utc>>,
}

impl Envelope {
    // ---
    /// Create an envelope around an already serialized body.
    pub fn new(body: Bytes) -> Self {
        // ---
        Self {
            message_id: Arc::from(Uuid::new_v4().to_string()),
            body,
            content_type: None,
            correlation_id: None,
            session_id: None,
            subject: None,
            application_properties: BTreeMap::new(),
            scheduled_enqueue_time: None,
        }
    }

    /// Create an integration event envelope.
    ///
    /// Sets the content type and body from the codec output, tags the
    /// envelope with `payload_type_id` and the `IntegrationEvent` marker.
    pub fn integration_event(serialized: SerializedBody, payload_type_id: &str) -> Self {
        // ---
        let mut envelope = Self::new(serialized.body);
        envelope.content_type = Some(serialized.content_type);
        envelope.subject = Some(Arc::from(format!(
            "An integration event of type '{payload_type_id}'"
        )));
        envelope.set_property(MESSAGE_TYPE_PROPERTY, INTEGRATION_EVENT_MESSAGE_TYPE);
        envelope.set_property(PAYLOAD_TYPE_ID_PROPERTY, payload_type_id);
        envelope
    }

    /// Read an application property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.application_properties.get(key).map(String::as_str)
    }

    /// Insert or replace an application property.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.application_properties.insert(key.into(), value.into());
    }

    /// The payload type id header, falling back to the legacy event type id
    /// header. Empty values count as absent.
    pub fn payload_type_id(&self) -> Option<&str> {
        // ---
        let non_empty = |key: &str| self.property(key).filter(|id| !id.is_empty());
        non_empty(PAYLOAD_TYPE_ID_PROPERTY).or_else(|| non_empty(EVENT_TYPE_ID_PROPERTY))
    }

    /// Whether the envelope carries the integration event marker.
    pub fn is_integration_event(&self) -> bool {
        self.property(MESSAGE_TYPE_PROPERTY) == Some(INTEGRATION_EVENT_MESSAGE_TYPE)
    }
}
