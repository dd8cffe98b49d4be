use std::sync::Arc;

use crate::{
    // ---
    log_trace,
    CorrelationId,
    Dispatch,
    DispatchRegistration,
    Envelope,
    MessageContext,
    PayloadCodec,
    Result,
};

/// Build the wire envelope for one (registration, dispatch) pair.
///
/// Correlation id resolution, evaluated for every envelope:
/// 1. the dispatch's explicit correlation id,
/// 2. the ambient correlation id of `ctx`,
/// 3. a newly generated id.
///
/// Customizer failures are returned unchanged.
pub fn build_envelope(
    registration: &DispatchRegistration,
    dispatch: &Dispatch,
    codec: &dyn PayloadCodec,
    ctx: &MessageContext,
) -> Result<Envelope> {
    // ---
    let correlation_id = resolve_correlation_id(dispatch, ctx);

    let value = registration.to_value(dispatch.payload_any())?;
    let serialized = codec.serialize_body(&value)?;

    let mut envelope = Envelope::integration_event(serialized, registration.payload_type_id());
    envelope.session_id = dispatch.session_id().cloned();
    envelope.correlation_id = Some(Arc::from(&correlation_id));

    registration.customize(&mut envelope, dispatch.payload_any())?;

    log_trace!(
        "built envelope {} for {} ({})",
        envelope.message_id,
        registration.destination(),
        registration.payload_type_id()
    );

    Ok(envelope)
}

fn resolve_correlation_id(dispatch: &Dispatch, ctx: &MessageContext) -> CorrelationId {
    // ---
    dispatch
        .correlation_id()
        .or_else(|| ctx.correlation_id())
        .cloned()
        .unwrap_or_else(CorrelationId::generate)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{Destination, DispatchRegistryBuilder, Error, JsonCodec};
    use serde::Serialize;

    #[derive(Serialize)]
    struct SubscribedEvent {
        #[serde(rename = "SomeString")]
        some_string: String,
        #[serde(rename = "SomeNumber")]
        some_number: u32,
    }

    fn event() -> SubscribedEvent {
        SubscribedEvent {
            some_string: "hello".into(),
            some_number: 36,
        }
    }

    fn registry() -> crate::DispatchRegistry {
        // ---
        let mut builder = DispatchRegistryBuilder::new();
        builder
            .register::<SubscribedEvent>(Destination::topic("testTopic").unwrap())
            .payload_type_id("MyEvent")
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_envelope_body_and_headers() {
        // ---
        let registry = registry();
        let registration = &registry.registrations_for::<SubscribedEvent>()[0];
        let dispatch = Dispatch::new(event()).with_session_id("session-1");

        let envelope =
            build_envelope(registration, &dispatch, &JsonCodec, &MessageContext::new()).unwrap();

        assert_eq!(envelope.payload_type_id(), Some("MyEvent"));
        assert!(envelope.is_integration_event());
        assert_eq!(envelope.session_id.as_deref(), Some("session-1"));
        assert_eq!(envelope.content_type.as_deref(), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(&envelope.body).unwrap();
        assert_eq!(body["SomeString"], "hello");
        assert_eq!(body["SomeNumber"], 36);
    }

    #[test]
    fn test_explicit_correlation_id_wins() {
        // ---
        let registry = registry();
        let registration = &registry.registrations_for::<SubscribedEvent>()[0];
        let dispatch = Dispatch::new(event()).with_correlation_id("explicit");
        let ctx = MessageContext::with_correlation_id("ambient");

        let envelope = build_envelope(registration, &dispatch, &JsonCodec, &ctx).unwrap();
        assert_eq!(envelope.correlation_id.as_deref(), Some("explicit"));
    }

    #[test]
    fn test_ambient_correlation_id_is_used() {
        // ---
        let registry = registry();
        let registration = &registry.registrations_for::<SubscribedEvent>()[0];
        let ctx = MessageContext::with_correlation_id("ambient");

        let a = build_envelope(registration, &Dispatch::new(event()), &JsonCodec, &ctx).unwrap();
        let b = build_envelope(registration, &Dispatch::new(event()), &JsonCodec, &ctx).unwrap();

        assert_eq!(a.correlation_id.as_deref(), Some("ambient"));
        assert_eq!(b.correlation_id.as_deref(), Some("ambient"));
    }

    #[test]
    fn test_generated_correlation_ids_are_independent() {
        // ---
        let registry = registry();
        let registration = &registry.registrations_for::<SubscribedEvent>()[0];
        let ctx = MessageContext::new();

        let a = build_envelope(registration, &Dispatch::new(event()), &JsonCodec, &ctx).unwrap();
        let b = build_envelope(registration, &Dispatch::new(event()), &JsonCodec, &ctx).unwrap();

        let a = a.correlation_id.unwrap();
        let b = b.correlation_id.unwrap();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn test_failing_customizer_propagates() {
        // ---
        let mut builder = DispatchRegistryBuilder::new();
        builder
            .register::<SubscribedEvent>(Destination::queue("q").unwrap())
            .customize(|_, _| Err("rejected".into()));
        let registry = builder.build();
        let registration = &registry.registrations_for::<SubscribedEvent>()[0];

        let err = build_envelope(
            registration,
            &Dispatch::new(event()),
            &JsonCodec,
            &MessageContext::new(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Customizer { ref payload_type_id, .. } if &**payload_type_id == "SubscribedEvent"
        ));
    }
}
