//! Payload type → destination registrations.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::ensure_not_empty;
use crate::{
    // ---
    BoxError,
    ClientKind,
    Destination,
    Envelope,
    Error,
    ResourceId,
    Result,
    TypeKey,
};

type ErasedPayload = dyn Any + Send + Sync;

/// Converts a type-erased payload into a codec-neutral value.
type SerializeFn = Arc<dyn Fn(&ErasedPayload) -> Result<Value> + Send + Sync>;

/// Mutates an envelope after it is built, observing the original payload.
type CustomizerFn = Arc<dyn Fn(&mut Envelope, &ErasedPayload) -> Result<()> + Send + Sync>;

/// Static binding of a payload type to one queue or topic.
#[derive(Clone)]
pub struct DispatchRegistration {
    destination: Destination,
    payload_type: TypeKey,
    payload_type_id: Arc<str>,
    serialize: SerializeFn,
    customizers: Vec<CustomizerFn>,
}

impl DispatchRegistration {
    fn new<T>(destination: Destination) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        // ---
        let payload_type = TypeKey::of::<T>();

        let serialize: SerializeFn = Arc::new(|payload: &ErasedPayload| {
            let payload = payload
                .downcast_ref::<T>()
                .ok_or(Error::PayloadTypeMismatch {
                    expected: std::any::type_name::<T>(),
                })?;
            Ok(serde_json::to_value(payload)?)
        });

        Self {
            destination,
            payload_type,
            payload_type_id: Arc::from(payload_type.simple_name()),
            serialize,
            customizers: Vec::new(),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn client_kind(&self) -> ClientKind {
        self.destination.client_kind
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.destination.resource_id
    }

    pub fn payload_type(&self) -> TypeKey {
        self.payload_type
    }

    /// Value written to the payload type id header of outgoing envelopes.
    pub fn payload_type_id(&self) -> &str {
        &self.payload_type_id
    }

    pub fn customizer_count(&self) -> usize {
        self.customizers.len()
    }

    pub(crate) fn to_value(&self, payload: &ErasedPayload) -> Result<Value> {
        (self.serialize)(payload)
    }

    /// Run every customizer in registration order; the first failure aborts.
    pub(crate) fn customize(&self, envelope: &mut Envelope, payload: &ErasedPayload) -> Result<()> {
        // ---
        for customizer in &self.customizers {
            customizer(envelope, payload)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DispatchRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRegistration")
            .field("destination", &self.destination)
            .field("payload_type", &self.payload_type)
            .field("payload_type_id", &self.payload_type_id)
            .field("customizers", &self.customizers.len())
            .finish()
    }
}

/// Fluent access to the registration just added by
/// [`DispatchRegistryBuilder::register`].
pub struct DispatchRegistrationBuilder<'a, T> {
    registration: &'a mut DispatchRegistration,
    _payload: PhantomData<fn(&T)>,
}

impl<'a, T> DispatchRegistrationBuilder<'a, T>
where
    T: Send + Sync + 'static,
{
    /// Replace the payload type id (default: the payload type's simple name).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `payload_type_id` is empty.
    pub fn payload_type_id(self, payload_type_id: &str) -> Result<Self> {
        // ---
        ensure_not_empty(payload_type_id, "payload_type_id")?;
        self.registration.payload_type_id = Arc::from(payload_type_id);
        Ok(self)
    }

    /// Append an outgoing customizer.
    ///
    /// Customizers run in the order they were added, after the envelope is
    /// built. An error aborts the whole send call.
    pub fn customize<F>(self, customizer: F) -> Self
    where
        F: Fn(&mut Envelope, &T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        // ---
        let erased: CustomizerFn = Arc::new(move |envelope: &mut Envelope, payload: &ErasedPayload| {
            let payload = payload
                .downcast_ref::<T>()
                .ok_or(Error::PayloadTypeMismatch {
                    expected: std::any::type_name::<T>(),
                })?;
            customizer(&mut *envelope, payload).map_err(|source| Error::Customizer {
                payload_type_id: Arc::from(envelope.payload_type_id().unwrap_or("")),
                source,
            })
        });
        self.registration.customizers.push(erased);
        self
    }

    pub fn registration(&self) -> &DispatchRegistration {
        self.registration
    }
}

/// Composition-time collector of dispatch registrations.
///
/// # Example
///
/// ```
/// use mom_dispatch::{Destination, DispatchRegistryBuilder};
///
/// #[derive(serde::Serialize)]
/// struct InvoicePaid { invoice: u64 }
///
/// # fn main() -> mom_dispatch::Result<()> {
/// let mut builder = DispatchRegistryBuilder::new();
/// builder.register::<InvoicePaid>(Destination::topic("billing")?);
/// builder
///     .register::<InvoicePaid>(Destination::queue("audit")?)
///     .payload_type_id("billing.invoice-paid")?
///     .customize(|envelope, paid| {
///         envelope.set_property("Invoice", paid.invoice.to_string());
///         Ok(())
///     });
///
/// let registry = builder.build();
/// assert_eq!(registry.registrations_for::<InvoicePaid>().len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct DispatchRegistryBuilder {
    registrations: Vec<DispatchRegistration>,
}

impl DispatchRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` to be sent to `destination`.
    ///
    /// The same type may be registered any number of times; each registration
    /// receives its own copy of every dispatch.
    pub fn register<T>(&mut self, destination: Destination) -> DispatchRegistrationBuilder<'_, T>
    where
        T: Serialize + Send + Sync + 'static,
    {
        // ---
        let index = self.registrations.len();
        self.registrations.push(DispatchRegistration::new::<T>(destination));

        DispatchRegistrationBuilder {
            registration: &mut self.registrations[index],
            _payload: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Freeze the registrations into a lookup table.
    pub fn build(self) -> DispatchRegistry {
        // ---
        let mut registrations: HashMap<TypeId, Vec<DispatchRegistration>> = HashMap::new();
        for registration in self.registrations {
            registrations
                .entry(registration.payload_type.id())
                .or_default()
                .push(registration);
        }
        DispatchRegistry { registrations }
    }
}

/// Immutable payload type → destinations table.
#[derive(Debug, Default)]
pub struct DispatchRegistry {
    registrations: HashMap<TypeId, Vec<DispatchRegistration>>,
}

impl DispatchRegistry {
    /// Registrations for a payload type, in registration order.
    ///
    /// An unregistered type yields an empty slice, never an error.
    pub fn dispatch_registrations(&self, payload_type: TypeId) -> &[DispatchRegistration] {
        self.registrations
            .get(&payload_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn registrations_for<T: 'static>(&self) -> &[DispatchRegistration] {
        self.dispatch_registrations(TypeId::of::<T>())
    }

    /// Number of registrations across all payload types.
    pub fn len(&self) -> usize {
        self.registrations.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
