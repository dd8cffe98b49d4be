//! Routes one inbound envelope to its registered handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    // ---
    log_debug,
    log_trace,
    CodecPtr,
    Envelope,
    Error,
    MessageContext,
    Receiver,
    ReceptionRegistry,
    Result,
    TypeKey,
};

/// What became of a message that was routed successfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceptionOutcome {
    /// A handler was found and completed without error.
    Handled {
        event_type_id: Arc<str>,
        handler_type: TypeKey,
    },
    /// No handler is registered for this event type id on this receiver.
    Ignored { event_type_id: Arc<str> },
}

/// Looks up, decodes and invokes.
///
/// Holds only immutable state, so one dispatcher is shared by every receive
/// loop.
#[derive(Clone)]
pub struct ReceptionDispatcher {
    registry: Arc<ReceptionRegistry>,
    codec: CodecPtr,
}

impl ReceptionDispatcher {
    pub fn new(registry: Arc<ReceptionRegistry>, codec: CodecPtr) -> Self {
        Self { registry, codec }
    }

    pub fn registry(&self) -> &Arc<ReceptionRegistry> {
        &self.registry
    }

    /// Route `envelope`, received on `receiver`, to its handler.
    ///
    /// The handler is awaited before returning. It is invoked even when
    /// `cancel` is already cancelled.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingEventTypeId`] if the envelope has no payload type id
    ///   header; nothing is invoked.
    /// - decoding errors from the codec or from deserializing into the
    ///   registered payload type.
    /// - [`Error::Handler`] if the handler fails.
    pub async fn dispatch(
        &self,
        receiver: &Receiver,
        envelope: Envelope,
        cancel: CancellationToken,
    ) -> Result<ReceptionOutcome> {
        // ---
        let Some(event_type_id) = envelope.payload_type_id() else {
            return Err(Error::MissingEventTypeId {
                entity_path: Arc::from(receiver.entity_path()),
                message_id: envelope.message_id.clone(),
            });
        };
        let event_type_id: Arc<str> = Arc::from(event_type_id);

        let Some(registration) = self.registry.registration(
            &event_type_id,
            receiver.entity_path(),
            receiver.client_kind(),
        ) else {
            log_debug!(
                "{receiver}: no handler for {event_type_id}, message {} ignored",
                envelope.message_id
            );
            return Ok(ReceptionOutcome::Ignored { event_type_id });
        };

        let value = self
            .codec
            .deserialize_body(&envelope.body, envelope.content_type.as_deref())?;
        let ctx = MessageContext::for_inbound(receiver, &envelope, &event_type_id);

        log_trace!(
            "{receiver}: message {} -> {}",
            envelope.message_id,
            registration.handler_type()
        );

        registration.handler.invoke(value, ctx, cancel).await?;

        Ok(ReceptionOutcome::Handled {
            event_type_id,
            handler_type: registration.handler_type(),
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{BoxError, EventHandler, JsonCodec, ReceptionRegistryBuilder, EVENT_TYPE_ID_PROPERTY};
    use bytes::Bytes;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct SubscribedEvent {
        #[serde(rename = "SomeString")]
        some_string: String,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<(String, Option<String>, bool)>>>,
    }

    #[async_trait::async_trait]
    impl EventHandler<SubscribedEvent> for Recorder {
        async fn handle(
            &self,
            event: SubscribedEvent,
            ctx: &MessageContext,
            cancel: CancellationToken,
        ) -> std::result::Result<(), BoxError> {
            self.calls.lock().unwrap().push((
                event.some_string,
                ctx.correlation_id().map(ToString::to_string),
                cancel.is_cancelled(),
            ));
            Ok(())
        }
    }

    fn setup() -> (ReceptionDispatcher, Receiver, Arc<Mutex<Vec<(String, Option<String>, bool)>>>) {
        // ---
        let receiver = Receiver::subscription("topic", "sub").unwrap();
        let recorder = Recorder::default();
        let calls = recorder.calls.clone();

        let mut builder = ReceptionRegistryBuilder::new();
        builder.register_reception::<SubscribedEvent, _>(&receiver, recorder);
        let registry = Arc::new(builder.build().unwrap());

        (
            ReceptionDispatcher::new(registry, Arc::new(JsonCodec)),
            receiver,
            calls,
        )
    }

    fn envelope(header: &str, event_type_id: &str) -> Envelope {
        // ---
        let mut envelope = Envelope::new(Bytes::from_static(br#"{"SomeString":"hello"}"#));
        envelope.content_type = Some(Arc::from("application/json"));
        envelope.correlation_id = Some(Arc::from("corr-7"));
        envelope.set_property(header, event_type_id);
        envelope
    }

    #[tokio::test]
    async fn test_legacy_event_type_id_header_is_honored() {
        // ---
        let (dispatcher, receiver, calls) = setup();

        let outcome = dispatcher
            .dispatch(
                &receiver,
                envelope(EVENT_TYPE_ID_PROPERTY, "SubscribedEvent"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, ReceptionOutcome::Handled { .. }));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "hello");
        assert_eq!(calls[0].1.as_deref(), Some("corr-7"));
    }

    #[tokio::test]
    async fn test_other_receiver_is_ignored() {
        // ---
        let (dispatcher, _, calls) = setup();
        let other = Receiver::subscription("topic", "other").unwrap();

        let outcome = dispatcher
            .dispatch(
                &other,
                envelope(crate::PAYLOAD_TYPE_ID_PROPERTY, "SubscribedEvent"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReceptionOutcome::Ignored {
                event_type_id: Arc::from("SubscribedEvent")
            }
        );
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_body_is_an_error() {
        // ---
        let (dispatcher, receiver, calls) = setup();
        let mut envelope = envelope(crate::PAYLOAD_TYPE_ID_PROPERTY, "SubscribedEvent");
        envelope.body = Bytes::from_static(br#"{"SomeNumber":1}"#);

        let result = dispatcher
            .dispatch(&receiver, envelope, CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::Serialization(_))));
        assert!(calls.lock().unwrap().is_empty());
    }
}
