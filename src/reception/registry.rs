//! (receiver, event type id) → handler registrations.
//!
//! The registry is validated once, when built. A registry that exists is
//! known to be free of duplicate handlers and duplicate event type ids per
//! receiver; lookups afterwards are plain hash map reads.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::ensure_not_empty;
use crate::reception::handler::{ErasedHandler, TypedHandler};
use crate::{
    // ---
    log_debug,
    ClientKind,
    Error,
    EventHandler,
    Receiver,
    Result,
    TypeKey,
};

/// Static binding of (receiver, event type id) to a handler.
#[derive(Clone)]
pub struct ReceptionRegistration {
    receiver: Receiver,
    payload_type: TypeKey,
    handler_type: TypeKey,
    event_type_id: Arc<str>,
    pub(crate) handler: Arc<dyn ErasedHandler>,
}

impl ReceptionRegistration {
    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    pub fn client_kind(&self) -> ClientKind {
        self.receiver.client_kind()
    }

    pub fn entity_path(&self) -> &str {
        self.receiver.entity_path()
    }

    pub fn payload_type(&self) -> TypeKey {
        self.payload_type
    }

    pub fn handler_type(&self) -> TypeKey {
        self.handler_type
    }

    pub fn event_type_id(&self) -> &str {
        &self.event_type_id
    }

    /// Plain-data description used in duplicate reports.
    pub fn summary(&self) -> RegistrationSummary {
        // ---
        RegistrationSummary {
            client_kind: self.client_kind(),
            entity_path: self.entity_path().to_string(),
            event_type_id: self.event_type_id.to_string(),
            payload_type: self.payload_type.name(),
            handler_type: self.handler_type.name(),
        }
    }
}

impl fmt::Debug for ReceptionRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceptionRegistration")
            .field("receiver", &self.receiver)
            .field("event_type_id", &self.event_type_id)
            .field("payload_type", &self.payload_type)
            .field("handler_type", &self.handler_type)
            .finish()
    }
}

/// Identifies one offending registration in a duplicate declaration error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub client_kind: ClientKind,
    pub entity_path: String,
    pub event_type_id: String,
    pub payload_type: &'static str,
    pub handler_type: &'static str,
}

impl fmt::Display for RegistrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} event type id {} handler {}",
            self.client_kind, self.entity_path, self.event_type_id, self.handler_type
        )
    }
}

/// Fluent access to the registration just added by
/// [`ReceptionRegistryBuilder::register_reception`].
pub struct ReceptionRegistrationBuilder<'a> {
    registration: &'a mut ReceptionRegistration,
}

impl ReceptionRegistrationBuilder<'_> {
    /// Replace the event type id (default: the payload type's simple name).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `event_type_id` is empty.
    pub fn event_type_id(self, event_type_id: &str) -> Result<Self> {
        // ---
        ensure_not_empty(event_type_id, "event_type_id")?;
        self.registration.event_type_id = Arc::from(event_type_id);
        Ok(self)
    }

    pub fn registration(&self) -> &ReceptionRegistration {
        self.registration
    }
}

/// Composition-time collector of reception registrations.
///
/// # Example
///
/// ```
/// use mom_dispatch::{
///     BoxError, EventHandler, MessageContext, Receiver, ReceptionRegistryBuilder,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(serde::Deserialize)]
/// struct InvoicePaid { invoice: u64 }
///
/// struct MarkInvoicePaid;
///
/// #[async_trait::async_trait]
/// impl EventHandler<InvoicePaid> for MarkInvoicePaid {
///     async fn handle(&self, _: InvoicePaid, _: &MessageContext, _: CancellationToken)
///         -> Result<(), BoxError> { Ok(()) }
/// }
///
/// # fn main() -> mom_dispatch::Result<()> {
/// let mut builder = ReceptionRegistryBuilder::new();
/// let receiver = Receiver::subscription("billing", "ledger")?;
/// builder
///     .register_reception::<InvoicePaid, _>(&receiver, MarkInvoicePaid)
///     .event_type_id("billing.invoice-paid")?;
///
/// let registry = builder.build()?;
/// assert!(registry
///     .registration("billing.invoice-paid", receiver.entity_path(), receiver.client_kind())
///     .is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ReceptionRegistryBuilder {
    registrations: Vec<ReceptionRegistration>,
    receivers: Vec<Receiver>,
}

impl ReceptionRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a receiver to listen on, even if no handler is registered
    /// for it. Messages it receives are all ignored.
    pub fn receiver(&mut self, receiver: &Receiver) -> &mut Self {
        // ---
        if !self.receivers.contains(receiver) {
            self.receivers.push(receiver.clone());
        }
        self
    }

    /// Bind `handler` to payloads of type `T` arriving on `receiver`.
    ///
    /// Uniqueness is checked by [`build`](Self::build), not here.
    pub fn register_reception<T, H>(
        &mut self,
        receiver: &Receiver,
        handler: H,
    ) -> ReceptionRegistrationBuilder<'_>
    where
        T: DeserializeOwned + Send + 'static,
        H: EventHandler<T>,
    {
        // ---
        self.receiver(receiver);

        let payload_type = TypeKey::of::<T>();
        let index = self.registrations.len();
        self.registrations.push(ReceptionRegistration {
            receiver: receiver.clone(),
            payload_type,
            handler_type: TypeKey::of::<H>(),
            event_type_id: Arc::from(payload_type.simple_name()),
            handler: Arc::new(TypedHandler::<T, H>::new(handler)),
        });

        ReceptionRegistrationBuilder {
            registration: &mut self.registrations[index],
        }
    }

    /// Validate and freeze the registrations.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateHandlerDeclaration`] if a handler type is bound
    ///   more than once to the same receiver,
    /// - [`Error::DuplicateEventTypeIdDeclaration`] if an event type id is
    ///   used more than once on the same receiver.
    ///
    /// Both carry every offending registration.
    pub fn build(self) -> Result<ReceptionRegistry> {
        ReceptionRegistry::new(self.registrations, self.receivers)
    }
}

/// event type id → registration, for one entity.
type EventTable = HashMap<Arc<str>, ReceptionRegistration>;

/// Immutable, validated reception table.
///
/// Indexed by client kind, then entity path, then event type id. The
/// components are never joined into one string, so no character in a name
/// or id can make two registrations collide.
#[derive(Debug)]
pub struct ReceptionRegistry {
    registrations: HashMap<ClientKind, HashMap<Arc<str>, EventTable>>,
    len: usize,
    receivers: Vec<Receiver>,
}

impl ReceptionRegistry {
    /// Validate `registrations` and index them by
    /// (client kind, entity path, event type id).
    ///
    /// `receivers` lists receivers to listen on in addition to those that
    /// have registrations.
    pub fn new(registrations: Vec<ReceptionRegistration>, receivers: Vec<Receiver>) -> Result<Self> {
        // ---
        let duplicated_handlers = find_duplicates(&registrations, |r| {
            (r.client_kind(), r.entity_path().to_string(), r.handler_type)
        });
        if !duplicated_handlers.is_empty() {
            return Err(Error::DuplicateHandlerDeclaration(duplicated_handlers));
        }

        let duplicated_event_type_ids = find_duplicates(&registrations, |r| {
            (r.client_kind(), r.entity_path().to_string(), r.event_type_id.clone())
        });
        if !duplicated_event_type_ids.is_empty() {
            return Err(Error::DuplicateEventTypeIdDeclaration(duplicated_event_type_ids));
        }

        let mut all_receivers = receivers;
        for registration in &registrations {
            if !all_receivers.contains(&registration.receiver) {
                all_receivers.push(registration.receiver.clone());
            }
        }

        let len = registrations.len();
        let mut table: HashMap<ClientKind, HashMap<Arc<str>, EventTable>> = HashMap::new();
        for registration in registrations {
            // unique per (client kind, entity path, event type id) after the checks above
            table
                .entry(registration.client_kind())
                .or_default()
                .entry(Arc::from(registration.entity_path()))
                .or_default()
                .insert(registration.event_type_id.clone(), registration);
        }

        log_debug!(
            "reception registry built: {len} registration(s) on {} receiver(s)",
            all_receivers.len()
        );

        Ok(Self {
            registrations: table,
            len,
            receivers: all_receivers,
        })
    }

    /// Look up the handler for an event type id on a receiver.
    ///
    /// `None` means nobody on this receiver is interested in the message.
    pub fn registration(
        &self,
        event_type_id: &str,
        entity_path: &str,
        client_kind: ClientKind,
    ) -> Option<&ReceptionRegistration> {
        self.registrations
            .get(&client_kind)?
            .get(entity_path)?
            .get(event_type_id)
    }

    /// Every receiver to listen on, in declaration order.
    pub fn receivers(&self) -> &[Receiver] {
        &self.receivers
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Members of every group with more than one registration, groups in order of
/// first appearance and members in registration order.
fn find_duplicates<K, F>(registrations: &[ReceptionRegistration], key_of: F) -> Vec<RegistrationSummary>
where
    K: Hash + Eq,
    F: Fn(&ReceptionRegistration) -> K,
{
    // ---
    let mut groups: Vec<Vec<&ReceptionRegistration>> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();

    for registration in registrations {
        let slot = *index.entry(key_of(registration)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(registration);
    }

    groups
        .into_iter()
        .filter(|group| group.len() > 1)
        .flatten()
        .map(ReceptionRegistration::summary)
        .collect()
}
