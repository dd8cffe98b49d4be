use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{BoxError, Error, MessageContext, Result};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handles one payload type received on one receiver.
///
/// The cancellation token is the one the receive loop was given. Handlers
/// are always invoked, even with an already cancelled token; deciding what
/// cancellation means is up to the handler.
///
/// # Example
///
/// ```
/// use mom_dispatch::{BoxError, EventHandler, MessageContext};
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(serde::Deserialize)]
/// struct InvoicePaid { invoice: u64 }
///
/// struct MarkInvoicePaid;
///
/// #[async_trait::async_trait]
/// impl EventHandler<InvoicePaid> for MarkInvoicePaid {
///     async fn handle(
///         &self,
///         event: InvoicePaid,
///         _ctx: &MessageContext,
///         _cancel: CancellationToken,
///     ) -> Result<(), BoxError> {
///         println!("invoice {} paid", event.invoice);
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait EventHandler<T>: Send + Sync + 'static {
    async fn handle(
        &self,
        event: T,
        ctx: &MessageContext,
        cancel: CancellationToken,
    ) -> std::result::Result<(), BoxError>;
}

/// Adapts an async closure into an [`EventHandler`].
///
/// Each closure has its own type, so two `FnHandler`s never count as the
/// same handler during duplicate validation.
pub struct FnHandler<F>(pub F);

#[async_trait::async_trait]
impl<T, F, Fut> EventHandler<T> for FnHandler<F>
where
    T: Send + 'static,
    F: Fn(T, MessageContext, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    async fn handle(
        &self,
        event: T,
        ctx: &MessageContext,
        cancel: CancellationToken,
    ) -> std::result::Result<(), BoxError> {
        (self.0)(event, ctx.clone(), cancel).await
    }
}

/// Type-erased handler stored in the reception registry.
pub(crate) trait ErasedHandler: Send + Sync {
    fn invoke(
        &self,
        value: Value,
        ctx: MessageContext,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<()>>;
}

/// Typed bridge from a decoded value to `H::handle`.
pub(crate) struct TypedHandler<T, H> {
    handler: Arc<H>,
    _payload: PhantomData<fn() -> T>,
}

impl<T, H> TypedHandler<T, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            _payload: PhantomData,
        }
    }
}

impl<T, H> ErasedHandler for TypedHandler<T, H>
where
    T: DeserializeOwned + Send + 'static,
    H: EventHandler<T>,
{
    fn invoke(
        &self,
        value: Value,
        ctx: MessageContext,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        // Deserialize into the declared payload type
        let event: T = match serde_json::from_value(value) {
            Ok(e) => e,
            Err(e) => return Box::pin(async move { Err(e.into()) }),
        };

        let handler = self.handler.clone();

        Box::pin(async move {
            handler
                .handle(event, &ctx, cancel)
                .await
                .map_err(|source| Error::Handler {
                    handler: std::any::type_name::<H>(),
                    source,
                })
        })
    }
}
