use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stable identity of a Rust type, used as a registry key.
///
/// Equality and hashing use the [`TypeId`] only; the type name is carried
/// for diagnostics and for deriving default event type ids.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Identity of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, e.g. `billing::events::InvoicePaid`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without module path or generic arguments, e.g. `InvoicePaid`.
    pub fn simple_name(&self) -> &'static str {
        simple_type_name(self.name)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Strip the module path and generic arguments from a type name.
///
/// `alloc::vec::Vec<u8>` becomes `Vec`, `crate::events::Paid` becomes `Paid`.
pub fn simple_type_name(full_name: &'static str) -> &'static str {
    // ---
    let base = full_name.split('<').next().unwrap_or(full_name);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    struct SubscribedEvent;

    #[test]
    fn test_simple_name() {
        // ---
        assert_eq!(TypeKey::of::<SubscribedEvent>().simple_name(), "SubscribedEvent");
        assert_eq!(TypeKey::of::<Vec<SubscribedEvent>>().simple_name(), "Vec");
        assert_eq!(simple_type_name("u32"), "u32");
    }

    #[test]
    fn test_equality_ignores_name() {
        // ---
        let a = TypeKey::of::<SubscribedEvent>();
        let b = TypeKey::of::<SubscribedEvent>();
        assert_eq!(a, b);
        assert_ne!(a, TypeKey::of::<String>());
    }
}
