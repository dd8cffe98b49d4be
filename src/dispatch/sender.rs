//! Batched, paginated dispatch sender.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    // ---
    build_envelope,
    log_debug,
    log_trace,
    BusConfig,
    CodecPtr,
    Destination,
    Dispatch,
    DispatchRegistry,
    Envelope,
    Error,
    MessageContext,
    Result,
    TransportPtr,
};

/// How a page is handed to the transport.
#[derive(Clone, Copy, Debug)]
enum SendMode {
    Immediate,
    Scheduled(DateTime<Utc>),
}

/// Envelopes bound for one physical sender, in dispatch order.
#[derive(Debug)]
struct OutboundGroup {
    destination: Destination,
    messages: Vec<Envelope>,
}

/// Sends typed dispatches to every destination registered for their type.
///
/// For each call the sender:
/// 1. resolves the destinations of every dispatch (none is fine),
/// 2. builds one envelope per (dispatch, destination),
/// 3. groups envelopes by destination, keeping first-seen order,
/// 4. splits each group into pages of at most `max_messages_per_send`,
/// 5. sends the pages of a group one after the other.
///
/// A transport failure aborts the call: remaining pages and groups are not
/// sent, and pages already sent are not rolled back.
///
/// The sender holds no mutable state; it can be shared and used from many
/// tasks at once.
#[derive(Clone)]
pub struct DispatchSender {
    registry: Arc<DispatchRegistry>,
    transport: TransportPtr,
    codec: CodecPtr,
    max_messages_per_send: usize,
}

impl DispatchSender {
    /// Create a sender. `config.max_messages_per_send` bounds each page.
    pub fn new(
        registry: Arc<DispatchRegistry>,
        transport: TransportPtr,
        codec: CodecPtr,
        config: &BusConfig,
    ) -> Self {
        // ---
        Self {
            registry,
            transport,
            codec,
            max_messages_per_send: config.max_messages_per_send.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    /// Send dispatches now.
    ///
    /// # Errors
    ///
    /// - serialization or customizer errors, before anything is sent
    /// - [`Error::Cancelled`] if `cancel` fires before a page is issued
    /// - the first transport error
    pub async fn send_dispatches<I>(
        &self,
        dispatches: I,
        ctx: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Dispatch>,
    {
        // ---
        let dispatches: Vec<Dispatch> = dispatches.into_iter().collect();
        let groups = self.create_messages_to_send(&dispatches, ctx)?;
        self.paginate_and_send(groups, SendMode::Immediate, cancel)
            .await
    }

    /// Send a single dispatch now.
    pub async fn send_dispatch(
        &self,
        dispatch: Dispatch,
        ctx: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.send_dispatches([dispatch], ctx, cancel).await
    }

    /// Hand dispatches to the broker for delivery at `enqueue_time`.
    ///
    /// Same errors as [`send_dispatches`](Self::send_dispatches).
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
        // ---
        let dispatches: Vec<Dispatch> = dispatches.into_iter().collect();
        let groups = self.create_messages_to_send(&dispatches, ctx)?;
        self.paginate_and_send(groups, SendMode::Scheduled(enqueue_time), cancel)
            .await
    }

    /// Steps 1–3: resolve, build and group.
    fn create_messages_to_send(
        &self,
        dispatches: &[Dispatch],
        ctx: &MessageContext,
    ) -> Result<Vec<OutboundGroup>> {
        // ---
        let mut groups: Vec<OutboundGroup> = Vec::new();
        let mut group_index: HashMap<Destination, usize> = HashMap::new();

        for dispatch in dispatches {
            let registrations = self
                .registry
                .dispatch_registrations(dispatch.payload_type().id());

            if registrations.is_empty() {
                log_trace!("no destination registered for {}", dispatch.payload_type());
                continue;
            }

            // the same dispatch can be published to several destinations
            for registration in registrations {
                let envelope = build_envelope(registration, dispatch, self.codec.as_ref(), ctx)?;

                let index = *group_index
                    .entry(registration.destination().clone())
                    .or_insert_with(|| {
                        groups.push(OutboundGroup {
                            destination: registration.destination().clone(),
                            messages: Vec::new(),
                        });
                        groups.len() - 1
                    });
                groups[index].messages.push(envelope);
            }
        }

        Ok(groups)
    }

    /// Steps 4–5: paginate each group and send the pages in order.
    async fn paginate_and_send(
        &self,
        groups: Vec<OutboundGroup>,
        mode: SendMode,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // ---
        for group in groups {
            let destination = group.destination;
            let pages = paginate(group.messages, self.max_messages_per_send);

            log_debug!(
                "{}: sending {} page(s) to {destination}",
                self.transport.transport_id(),
                pages.len()
            );

            for page in pages {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                log_trace!("page of {} message(s) to {destination}", page.len());

                match mode {
                    SendMode::Immediate => self.transport.send_batch(&destination, page).await?,
                    SendMode::Scheduled(at) => {
                        self.transport
                            .schedule_batch(&destination, page, at)
                            .await?
                    }
                }
            }
        }

        Ok(())
    }
}

/// Split `items` into consecutive pages of at most `page_size`, keeping order.
fn paginate<T>(items: Vec<T>, page_size: usize) -> Vec<Vec<T>> {
    // ---
    let page_size = page_size.max(1);
    let mut pages = Vec::with_capacity(items.len().div_ceil(page_size));
    let mut items = items.into_iter();

    loop {
        let page: Vec<T> = items.by_ref().take(page_size).collect();
        if page.is_empty() {
            break;
        }
        pages.push(page);
    }

    pages
}
