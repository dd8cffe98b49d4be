use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Correlation identifier carried on every outgoing envelope.
///
/// Correlation IDs tie together the messages produced while handling one
/// logical operation. They are opaque to the transport layer.
///
/// # Format
///
/// Generated ids use the standard UUID v4 format:
/// `550e8400-e29b-41d4-a9b6-446655440000`. Ids received from peers or
/// supplied by callers are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    // ---

    /// Generate a new unique correlation ID
    pub fn generate() -> Self {
        // ---
        Self(Uuid::new_v4().to_string())
    }

    /// Get the correlation ID as a string slice
    pub fn as_str(&self) -> &str {
        // ---
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    // ---

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&Arc<str>> for CorrelationId {
    fn from(s: &Arc<str>) -> Self {
        Self(s.to_string())
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl From<&CorrelationId> for Arc<str> {
    fn from(id: &CorrelationId) -> Self {
        Arc::from(id.as_str())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_generate_unique() {
        // ---
        let id1 = CorrelationId::generate();
        let id2 = CorrelationId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_format() {
        // ---
        let id = CorrelationId::generate();
        let s = id.to_string();
        assert_eq!(s.len(), 36); // Standard UUID format
    }

    #[test]
    fn test_foreign_ids_are_kept_verbatim() {
        // ---
        let id = CorrelationId::from("order-42");
        let shared: Arc<str> = (&id).into();
        assert_eq!(&*shared, "order-42");
    }
}
