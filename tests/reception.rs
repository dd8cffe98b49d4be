// tests/reception.rs

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use mom_dispatch::{
    // ---
    BoxError,
    ClientKind,
    Envelope,
    Error,
    EventHandler,
    FnHandler,
    JsonCodec,
    MessageContext,
    Receiver,
    ReceptionDispatcher,
    ReceptionOutcome,
    ReceptionRegistryBuilder,
    EVENT_TYPE_ID_PROPERTY,
    PAYLOAD_TYPE_ID_PROPERTY,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SubscribedEvent {
    #[serde(rename = "SomeString")]
    some_string: String,
    #[serde(rename = "SomeNumber")]
    some_number: u32,
}

#[derive(Debug, Clone)]
struct Call {
    event: SubscribedEvent,
    correlation_id: Option<String>,
    event_type_id: Option<String>,
    entity_path: Option<String>,
    cancelled: bool,
}

#[derive(Clone, Default)]
struct SubscribedEventHandler {
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait::async_trait]
impl EventHandler<SubscribedEvent> for SubscribedEventHandler {
    async fn handle(
        &self,
        event: SubscribedEvent,
        ctx: &MessageContext,
        cancel: CancellationToken,
    ) -> Result<(), BoxError> {
        // ---
        self.calls.lock().unwrap().push(Call {
            event,
            correlation_id: ctx.correlation_id().map(ToString::to_string),
            event_type_id: ctx.event_type_id().map(str::to_string),
            entity_path: ctx.receiver().map(|r| r.entity_path().to_string()),
            cancelled: cancel.is_cancelled(),
        });
        Ok(())
    }
}

struct FailingHandler;

#[async_trait::async_trait]
impl EventHandler<SubscribedEvent> for FailingHandler {
    async fn handle(
        &self,
        _: SubscribedEvent,
        _: &MessageContext,
        _: CancellationToken,
    ) -> Result<(), BoxError> {
        Err("ledger is closed".into())
    }
}

fn event_envelope(event_type_id: Option<&str>) -> Envelope {
    // ---
    let body = serde_json::to_vec(&SubscribedEvent {
        some_string: "hello".into(),
        some_number: 36,
    })
    .unwrap();

    let mut envelope = Envelope::new(Bytes::from(body));
    envelope.content_type = Some("application/json".into());
    envelope.correlation_id = Some("corr-42".into());
    if let Some(id) = event_type_id {
        envelope.set_property(PAYLOAD_TYPE_ID_PROPERTY, id);
    }
    envelope
}

fn dispatcher(builder: ReceptionRegistryBuilder) -> ReceptionDispatcher {
    ReceptionDispatcher::new(Arc::new(builder.build().unwrap()), Arc::new(JsonCodec))
}

#[tokio::test]
async fn reception_invokes_handler_with_payload_and_context() {
    // ---
    // Arrange
    // ---
    let receiver = Receiver::subscription("testTopic", "testSubscription").unwrap();
    let handler = SubscribedEventHandler::default();
    let calls = handler.calls.clone();

    let mut builder = ReceptionRegistryBuilder::new();
    builder.register_reception::<SubscribedEvent, _>(&receiver, handler);
    let dispatcher = dispatcher(builder);

    // ---
    // Act
    // ---
    let outcome = dispatcher
        .dispatch(&receiver, event_envelope(Some("SubscribedEvent")), CancellationToken::new())
        .await
        .unwrap();

    // ---
    // Assert
    // ---
    assert!(matches!(
        outcome,
        ReceptionOutcome::Handled { ref event_type_id, .. } if &**event_type_id == "SubscribedEvent"
    ));

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].event.some_string, "hello");
    assert_eq!(calls[0].event.some_number, 36);
    assert_eq!(calls[0].correlation_id.as_deref(), Some("corr-42"));
    assert_eq!(calls[0].event_type_id.as_deref(), Some("SubscribedEvent"));
    assert_eq!(
        calls[0].entity_path.as_deref(),
        Some("testTopic/Subscriptions/testSubscription")
    );
    assert!(!calls[0].cancelled);
}

#[tokio::test]
async fn reception_cancelled_token_still_reaches_handler() {
    // ---
    let receiver = Receiver::queue("testQueue").unwrap();
    let handler = SubscribedEventHandler::default();
    let calls = handler.calls.clone();

    let mut builder = ReceptionRegistryBuilder::new();
    builder.register_reception::<SubscribedEvent, _>(&receiver, handler);
    let dispatcher = dispatcher(builder);

    let cancel = CancellationToken::new();
    cancel.cancel();

    dispatcher
        .dispatch(&receiver, event_envelope(Some("SubscribedEvent")), cancel)
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].cancelled);
}

#[tokio::test]
async fn reception_missing_event_type_id_is_an_error() {
    // ---
    let receiver = Receiver::subscription("testTopic", "testSubscription").unwrap();
    let handler = SubscribedEventHandler::default();
    let calls = handler.calls.clone();

    let mut builder = ReceptionRegistryBuilder::new();
    builder.register_reception::<SubscribedEvent, _>(&receiver, handler);
    let dispatcher = dispatcher(builder);

    let envelope = event_envelope(None);
    let message_id = envelope.message_id.clone();
    let result = dispatcher
        .dispatch(&receiver, envelope, CancellationToken::new())
        .await;

    match result {
        Err(Error::MissingEventTypeId {
            entity_path,
            message_id: id,
        }) => {
            assert_eq!(&*entity_path, "testTopic/Subscriptions/testSubscription");
            assert_eq!(id, message_id);
        }
        other => panic!("expected MissingEventTypeId, got {other:?}"),
    }
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reception_empty_event_type_id_counts_as_missing() {
    // ---
    let receiver = Receiver::queue("testQueue").unwrap();
    let dispatcher = dispatcher(ReceptionRegistryBuilder::new());

    let mut envelope = event_envelope(Some(""));
    envelope.set_property(EVENT_TYPE_ID_PROPERTY, "");

    let result = dispatcher
        .dispatch(&receiver, envelope, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::MissingEventTypeId { .. })));
}

#[tokio::test]
async fn reception_subscription_with_no_handlers_ignores_messages() {
    // ---
    let idle = Receiver::subscription("testTopic", "SubscriptionWithNoHandlers").unwrap();
    let mut builder = ReceptionRegistryBuilder::new();
    builder.receiver(&idle);
    let dispatcher = dispatcher(builder);

    let outcome = dispatcher
        .dispatch(&idle, event_envelope(Some("SubscribedEvent")), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, ReceptionOutcome::Ignored { .. }));
}

#[tokio::test]
async fn reception_custom_event_type_id_routes() {
    // ---
    let receiver = Receiver::queue("testQueue").unwrap();
    let handler = SubscribedEventHandler::default();
    let calls = handler.calls.clone();

    let mut builder = ReceptionRegistryBuilder::new();
    builder
        .register_reception::<SubscribedEvent, _>(&receiver, handler)
        .event_type_id("MyEvent")
        .unwrap();
    let dispatcher = dispatcher(builder);

    let default_id = dispatcher
        .dispatch(&receiver, event_envelope(Some("SubscribedEvent")), CancellationToken::new())
        .await
        .unwrap();
    let custom_id = dispatcher
        .dispatch(&receiver, event_envelope(Some("MyEvent")), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(default_id, ReceptionOutcome::Ignored { .. }));
    assert!(matches!(custom_id, ReceptionOutcome::Handled { .. }));
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reception_handler_failure_propagates() {
    // ---
    let receiver = Receiver::queue("testQueue").unwrap();
    let mut builder = ReceptionRegistryBuilder::new();
    builder.register_reception::<SubscribedEvent, _>(&receiver, FailingHandler);
    let dispatcher = dispatcher(builder);

    let result = dispatcher
        .dispatch(&receiver, event_envelope(Some("SubscribedEvent")), CancellationToken::new())
        .await;

    match result {
        Err(Error::Handler { handler, source }) => {
            assert!(handler.ends_with("FailingHandler"));
            assert_eq!(source.to_string(), "ledger is closed");
        }
        other => panic!("expected handler error, got {other:?}"),
    }
}

#[tokio::test]
async fn reception_unsupported_content_type_is_rejected() {
    // ---
    let receiver = Receiver::queue("testQueue").unwrap();
    let handler = SubscribedEventHandler::default();
    let calls = handler.calls.clone();

    let mut builder = ReceptionRegistryBuilder::new();
    builder.register_reception::<SubscribedEvent, _>(&receiver, handler);
    let dispatcher = dispatcher(builder);

    let mut envelope = event_envelope(Some("SubscribedEvent"));
    envelope.content_type = Some("application/xml".into());

    let result = dispatcher
        .dispatch(&receiver, envelope, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::UnsupportedContentType(_))));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reception_closure_handlers() {
    // ---
    let receiver = Receiver::queue("testQueue").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut builder = ReceptionRegistryBuilder::new();
    let sink = seen.clone();
    builder.register_reception::<SubscribedEvent, _>(
        &receiver,
        FnHandler(move |event: SubscribedEvent, _ctx: MessageContext, _cancel: CancellationToken| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event.some_number);
                Ok::<(), BoxError>(())
            }
        }),
    );
    let dispatcher = dispatcher(builder);

    dispatcher
        .dispatch(&receiver, event_envelope(Some("SubscribedEvent")), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![36]);
}

#[test]
fn reception_duplicates_are_reported_together() {
    // ---
    let receiver = Receiver::subscription("topicName", "subscriptionName").unwrap();
    let mut builder = ReceptionRegistryBuilder::new();
    builder.register_reception::<SubscribedEvent, _>(&receiver, SubscribedEventHandler::default());
    builder.register_reception::<SubscribedEvent, _>(&receiver, SubscribedEventHandler::default());

    let err = builder.build().unwrap_err();

    let Error::DuplicateHandlerDeclaration(duplicates) = &err else {
        panic!("expected duplicate handler declaration, got {err}");
    };
    assert_eq!(duplicates.len(), 2);
    assert!(duplicates.iter().all(|d| d.client_kind == ClientKind::Subscription
        && d.entity_path == "topicName/Subscriptions/subscriptionName"
        && d.event_type_id == "SubscribedEvent"));
    assert!(err.to_string().contains("SubscribedEventHandler"));
}

#[tokio::test]
async fn reception_separator_in_names_routes_to_the_right_receiver() {
    // ---
    // Arrange
    // ---
    let piped = Receiver::queue("a|b").unwrap();
    let plain = Receiver::queue("a").unwrap();
    let piped_handler = SubscribedEventHandler::default();
    let piped_calls = piped_handler.calls.clone();
    let plain_calls = Arc::new(Mutex::new(Vec::new()));

    let mut builder = ReceptionRegistryBuilder::new();
    builder
        .register_reception::<SubscribedEvent, _>(&piped, piped_handler)
        .event_type_id("c")
        .unwrap();
    let sink = plain_calls.clone();
    builder
        .register_reception::<SubscribedEvent, _>(
            &plain,
            FnHandler(move |event: SubscribedEvent, _: MessageContext, _: CancellationToken| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(event.some_number);
                    Ok::<(), BoxError>(())
                }
            }),
        )
        .event_type_id("b|c")
        .unwrap();
    let dispatcher = dispatcher(builder);

    // ---
    // Act
    // ---
    let outcome = dispatcher
        .dispatch(&piped, event_envelope(Some("c")), CancellationToken::new())
        .await
        .unwrap();

    // ---
    // Assert
    // ---
    assert!(matches!(outcome, ReceptionOutcome::Handled { .. }));
    assert_eq!(piped_calls.lock().unwrap().len(), 1);
    assert!(plain_calls.lock().unwrap().is_empty());
    assert_eq!(dispatcher.registry().len(), 2);
}
