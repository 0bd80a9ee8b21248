use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable key identifying one saga instance across all of its events.
///
/// Wraps a UUID to provide type safety and prevent mixing up
/// correlation IDs with other UUID-based identifiers (order ids,
/// expiration tokens).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Creates a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a correlation ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Derives a stable UUID from this id within the given namespace.
    ///
    /// The same (namespace, id) pair always yields the same UUID.
    pub fn derive(&self, namespace: &Uuid) -> Uuid {
        Uuid::new_v5(namespace, self.0.as_bytes())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<CorrelationId> for Uuid {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_new_creates_unique_ids() {
        let id1 = CorrelationId::new();
        let id2 = CorrelationId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn correlation_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = CorrelationId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn correlation_id_parses_from_string() {
        let id = CorrelationId::new();
        let parsed: CorrelationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<CorrelationId>().is_err());
    }

    #[test]
    fn derive_is_stable_per_namespace() {
        let id = CorrelationId::new();
        let ns_a = Uuid::new_v4();
        let ns_b = Uuid::new_v4();

        assert_eq!(id.derive(&ns_a), id.derive(&ns_a));
        assert_ne!(id.derive(&ns_a), id.derive(&ns_b));
        assert_ne!(id.derive(&ns_a), CorrelationId::new().derive(&ns_a));
    }

    #[test]
    fn correlation_id_serializes_as_plain_uuid() {
        let id = CorrelationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }
}
