//! Composed event bus.
//!
//! Bundles one transport, one dispatch sender and one reception dispatcher
//! behind a cheaply cloneable handle.

use std::any::Any;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    // ---
    lock_ignore_poison,
    log_debug,
    log_warn,
    spawn_receivers,
    BusConfig,
    Dispatch,
    DispatchSender,
    MessageContext,
    ReceptionDispatcher,
    Result,
    TransportPtr,
};

/// Sends dispatches and runs receive loops over one transport.
///
/// Built with [`EventBusBuilder`](crate::EventBusBuilder). Clones share the
/// same state.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    transport: TransportPtr,
    config: BusConfig,
    sender: DispatchSender,
    dispatcher: Arc<ReceptionDispatcher>,

    // Cancelled on shutdown; parent of every receive loop token
    shutdown: CancellationToken,
    receive_state: Mutex<ReceiveState>,
}

/// Progress of [`EventBus::start_receiving`].
enum ReceiveState {
    Idle,
    // Subscriptions in flight; later callers back off
    Starting,
    Running(Vec<JoinHandle<()>>),
}

impl EventBus {
    /// Create a bus (internal use by EventBusBuilder).
    pub(crate) fn new(
        transport: TransportPtr,
        config: BusConfig,
        sender: DispatchSender,
        dispatcher: ReceptionDispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                sender,
                dispatcher: Arc::new(dispatcher),
                shutdown: CancellationToken::new(),
                receive_state: Mutex::new(ReceiveState::Idle),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &TransportPtr {
        &self.inner.transport
    }

    pub fn sender(&self) -> &DispatchSender {
        &self.inner.sender
    }

    pub fn reception(&self) -> &Arc<ReceptionDispatcher> {
        &self.inner.dispatcher
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Send a single payload to every destination registered for its type.
    ///
    /// Stops issuing pages once the bus is shut down.
    pub async fn publish<T: Any + Send + Sync>(&self, payload: T, ctx: &MessageContext) -> Result<()> {
        self.inner
            .sender
            .send_dispatch(Dispatch::new(payload), ctx, &self.inner.shutdown)
            .await
    }

    /// See [`DispatchSender::send_dispatches`].
    pub async fn send_dispatches<I>(
        &self,
        dispatches: I,
        ctx: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Dispatch>,
    {
        self.inner.sender.send_dispatches(dispatches, ctx, cancel).await
    }

    /// See [`DispatchSender::schedule_dispatches`].
    pub async fn schedule_dispatches<I>(
        &self,
        dispatches: I,
        enqueue_time: DateTime<Utc>,
        ctx: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Dispatch>,
    {
        self.inner
            .sender
            .schedule_dispatches(dispatches, enqueue_time, ctx, cancel)
            .await
    }

    /// Subscribe to every registered receiver and start handling messages.
    ///
    /// Calling this more than once, even concurrently, has no further effect.
    /// A call that failed to subscribe may be retried.
    ///
    /// # Errors
    ///
    /// Returns the first subscription failure from the transport.
    pub async fn start_receiving(&self) -> Result<()> {
        // ---
        {
            let mut state = lock_ignore_poison(&self.inner.receive_state);
            if !matches!(*state, ReceiveState::Idle) {
                log_warn!("{}: receivers already started", self.inner.config.transport_id);
                return Ok(());
            }
            *state = ReceiveState::Starting;
        }

        let joins = match spawn_receivers(
            self.inner.transport.clone(),
            self.inner.dispatcher.clone(),
            self.inner.shutdown.clone(),
            self.inner.config.max_concurrent_calls,
        )
        .await
        {
            Ok(joins) => joins,
            Err(e) => {
                *lock_ignore_poison(&self.inner.receive_state) = ReceiveState::Idle;
                return Err(e);
            }
        };

        log_debug!(
            "{}: {} receive loop(s) running",
            self.inner.config.transport_id,
            joins.len()
        );

        let mut state = lock_ignore_poison(&self.inner.receive_state);
        // Shutdown during startup leaves Idle; its token already stops these loops
        if matches!(*state, ReceiveState::Starting) {
            *state = ReceiveState::Running(joins);
        }
        Ok(())
    }

    /// Stop the receive loops and close the transport.
    ///
    /// Handlers already running are allowed to finish. Pending sends observe
    /// the cancellation before their next page.
    pub async fn shutdown(&self) {
        // ---
        self.inner.shutdown.cancel();

        let state = std::mem::replace(
            &mut *lock_ignore_poison(&self.inner.receive_state),
            ReceiveState::Idle,
        );
        let joins = match state {
            ReceiveState::Running(joins) => joins,
            ReceiveState::Idle | ReceiveState::Starting => Vec::new(),
        };
        for join in joins {
            let _ = join.await;
        }

        if let Err(e) = self.inner.transport.close().await {
            log_warn!("{}: close failed: {e}", self.inner.config.transport_id);
        }
    }
}
