use std::sync::Arc;

use thiserror::Error;

use crate::RegistrationSummary;

/// Boxed error returned by user code (handlers and outgoing customizers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while composing, dispatching or receiving messages.
#[derive(Error, Debug)]
pub enum Error {
    /// A required identifier (queue, topic, subscription, event type id...)
    /// was empty.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        name: &'static str,
        reason: &'static str,
    },

    /// The bus configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Several registrations bind the same handler to the same receiver.
    ///
    /// Carries every conflicting registration, not only the first one found.
    #[error("duplicate handler declaration: {}", summarize(.0))]
    DuplicateHandlerDeclaration(Vec<RegistrationSummary>),

    /// Several registrations on the same receiver use the same event type id.
    #[error("duplicate event type id declaration: {}", summarize(.0))]
    DuplicateEventTypeIdDeclaration(Vec<RegistrationSummary>),

    /// An inbound message carries no event type id header.
    #[error("message {message_id} received on {entity_path} has no event type id")]
    MissingEventTypeId {
        entity_path: Arc<str>,
        message_id: Arc<str>,
    },

    /// The codec cannot decode a body with this content type.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A type-erased payload did not have the type its registration expects.
    #[error("payload is not of type {expected}")]
    PayloadTypeMismatch { expected: &'static str },

    /// An outgoing customizer rejected the envelope.
    #[error("outgoing customizer failed for payload type id {payload_type_id}: {source}")]
    Customizer {
        payload_type_id: Arc<str>,
        #[source]
        source: BoxError,
    },

    /// A reception handler returned an error.
    #[error("handler {handler} failed: {source}")]
    Handler {
        handler: &'static str,
        #[source]
        source: BoxError,
    },

    /// The transport failed to send or receive.
    #[error("transport error: {0}")]
    Transport(String),

    /// The operation observed a cancelled token before issuing more work.
    #[error("operation cancelled")]
    Cancelled,
}

fn summarize(duplicates: &[RegistrationSummary]) -> String {
    // ---
    duplicates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for dispatch and reception operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reject empty or whitespace-only identifiers.
pub(crate) fn ensure_not_empty(value: &str, name: &'static str) -> Result<()> {
    // ---
    if value.trim().is_empty() {
        return Err(Error::InvalidArgument {
            name,
            reason: "must not be empty",
        });
    }
    Ok(())
}
