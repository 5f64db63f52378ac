//! Local copy of the writable properties the device has accepted.

use serde_json::Value;
use std::collections::BTreeMap;

/// Address of a property: its component (if any) and its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyKey {
    /// Component name, `None` for root properties
    pub component: Option<String>,
    /// Property name
    pub name: String,
}

impl PropertyKey {
    /// Create a key.
    #[must_use]
    pub fn new(component: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            component: component.map(str::to_string),
            name: name.into(),
        }
    }
}

/// Accepted property value and the document version it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProperty {
    /// Value as received
    pub value: Value,
    /// Document version
    pub version: i64,
}

/// Last accepted value per property.
#[derive(Debug, Default)]
pub struct PropertyStore {
    properties: BTreeMap<PropertyKey, StoredProperty>,
}

impl PropertyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a value received with document `version`.
    ///
    /// Returns `false` and keeps the stored value when `version` is older than
    /// the one already held for this property.
    pub fn apply(&mut self, key: PropertyKey, value: Value, version: i64) -> bool {
        if let Some(existing) = self.properties.get(&key) {
            if version < existing.version {
                tracing::debug!(
                    property = %key.name,
                    stored = existing.version,
                    received = version,
                    "Ignoring stale property value"
                );
                return false;
            }
        }
        self.properties
            .insert(key, StoredProperty { value, version });
        true
    }

    /// Look up a property.
    #[must_use]
    pub fn get(&self, key: &PropertyKey) -> Option<&StoredProperty> {
        self.properties.get(key)
    }

    /// Number of stored properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PropertyKey, &StoredProperty)> {
        self.properties.iter()
    }
}
