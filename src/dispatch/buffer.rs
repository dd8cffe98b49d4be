//! Deferred dispatch collection.
//!
//! Code handling a unit of work (an inbound message, an HTTP request...)
//! publishes into a [`DispatchBuffer`]; the owner of the unit of work flushes
//! it once the work has succeeded. Nothing reaches the transport if the work
//! fails and the buffer is dropped.

use std::any::Any;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::{lock_ignore_poison, log_debug, Dispatch, DispatchSender, MessageContext, Result};

/// Collects dispatches for one later [`DispatchSender::send_dispatches`] call.
#[derive(Debug, Default)]
pub struct DispatchBuffer {
    pending: Mutex<Vec<Dispatch>>,
}

impl DispatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a payload with no session or correlation override.
    pub fn publish<T: Any + Send + Sync>(&self, payload: T) {
        self.publish_dispatch(Dispatch::new(payload));
    }

    /// Buffer a fully specified dispatch.
    pub fn publish_dispatch(&self, dispatch: Dispatch) {
        lock_ignore_poison(&self.pending).push(dispatch);
    }

    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        lock_ignore_poison(&self.pending).is_empty()
    }

    /// Remove and return everything buffered so far.
    pub fn take(&self) -> Vec<Dispatch> {
        std::mem::take(&mut *lock_ignore_poison(&self.pending))
    }

    /// Send everything buffered so far in a single call.
    ///
    /// The buffer is emptied before sending, so a failed flush does not
    /// resend on the next one.
    pub async fn flush(
        &self,
        sender: &DispatchSender,
        ctx: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // ---
        let dispatches = self.take();
        if dispatches.is_empty() {
            return Ok(());
        }

        log_debug!("flushing {} buffered dispatch(es)", dispatches.len());
        sender.send_dispatches(dispatches, ctx, cancel).await
    }
}
