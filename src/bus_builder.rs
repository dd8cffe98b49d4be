//! Event bus builder.
//!
//! Collects the transport, codec, configuration and both registries, and
//! validates all of them at once in [`EventBusBuilder::build`].

use std::sync::Arc;

use crate::{
    // ---
    log_info,
    BusConfig,
    CodecPtr,
    DispatchRegistryBuilder,
    DispatchSender,
    EventBus,
    JsonCodec,
    ReceptionDispatcher,
    ReceptionRegistryBuilder,
    Result,
    TransportPtr,
};

/// Builder for [`EventBus`] instances.
///
/// # Example
///
/// ```
/// use mom_dispatch::{
///     BusConfig, Destination, DispatchRegistryBuilder, EventBusBuilder, MemoryHub,
/// };
///
/// #[derive(serde::Serialize)]
/// struct InvoicePaid { invoice: u64 }
///
/// # async fn example() -> mom_dispatch::Result<()> {
/// let config = BusConfig::new("billing").with_max_messages_per_send(50);
/// let transport =
///     mom_dispatch::create_memory_transport_with_hub(&config, MemoryHub::new()).await?;
///
/// let mut dispatch = DispatchRegistryBuilder::new();
/// dispatch.register::<InvoicePaid>(Destination::topic("billing")?);
///
/// let bus = EventBusBuilder::new(transport)
///     .config(config)
///     .dispatch(dispatch)
///     .build()?;
///
/// bus.publish(InvoicePaid { invoice: 7 }, &Default::default()).await?;
/// bus.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct EventBusBuilder {
    // ---
    transport: TransportPtr,
    codec: Option<CodecPtr>,
    config: Option<BusConfig>,
    dispatch: DispatchRegistryBuilder,
    reception: ReceptionRegistryBuilder,
}

impl EventBusBuilder {
    /// Create a builder with no registrations.
    ///
    /// The configuration defaults to [`BusConfig::new`] with the transport's
    /// id and the codec to [`JsonCodec`].
    pub fn new(transport: TransportPtr) -> Self {
        Self {
            transport,
            codec: None,
            config: None,
            dispatch: DispatchRegistryBuilder::new(),
            reception: ReceptionRegistryBuilder::new(),
        }
    }

    pub fn codec(mut self, codec: CodecPtr) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the dispatch registrations.
    pub fn dispatch(mut self, dispatch: DispatchRegistryBuilder) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Replace the reception registrations.
    pub fn reception(mut self, reception: ReceptionRegistryBuilder) -> Self {
        self.reception = reception;
        self
    }

    /// Validate everything and compose the bus.
    ///
    /// Receive loops are not started; call
    /// [`EventBus::start_receiving`] once the application is ready.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`](crate::Error::InvalidConfig)
    /// - [`Error::DuplicateHandlerDeclaration`](crate::Error::DuplicateHandlerDeclaration)
    /// - [`Error::DuplicateEventTypeIdDeclaration`](crate::Error::DuplicateEventTypeIdDeclaration)
    pub fn build(self) -> Result<EventBus> {
        // ---
        let config = self
            .config
            .unwrap_or_else(|| BusConfig::new(self.transport.transport_id()));
        config.validate()?;

        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec));

        let dispatch_registry = Arc::new(self.dispatch.build());
        let reception_registry = Arc::new(self.reception.build()?);

        log_info!(
            "{}: bus composed with {} dispatch and {} reception registration(s)",
            config.transport_id,
            dispatch_registry.len(),
            reception_registry.len()
        );

        let sender = DispatchSender::new(dispatch_registry, self.transport.clone(), codec.clone(), &config);
        let dispatcher = ReceptionDispatcher::new(reception_registry, codec);

        Ok(EventBus::new(self.transport, config, sender, dispatcher))
    }
}
