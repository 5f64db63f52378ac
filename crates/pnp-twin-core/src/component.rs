//! Registered component names.
//!
//! A device model groups properties into components. On the wire a component
//! is an object whose first member is the discriminator `"__t": "c"`.

use serde::{Deserialize, Serialize};

/// Reserved key marking an object as a component wrapper.
pub const COMPONENT_MARKER_KEY: &str = "__t";

/// Value of [`COMPONENT_MARKER_KEY`] on a component wrapper.
pub const COMPONENT_MARKER_VALUE: &str = "c";

/// Ordered set of component names known to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ComponentRegistry {
    names: Vec<String>,
}

impl ComponentRegistry {
    /// Create a registry, keeping the first occurrence of each name.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::default();
        for name in names {
            registry.register(name);
        }
        registry
    }

    /// Add a component name. Returns `false` if it was already registered.
    pub fn register(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    /// Whether `name` is a registered component.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|known| known == name)
    }

    /// Registered names in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no component is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl From<Vec<String>> for ComponentRegistry {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<ComponentRegistry> for Vec<String> {
    fn from(registry: ComponentRegistry) -> Self {
        registry.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order_and_drops_duplicates() {
        let registry = ComponentRegistry::new(["thermostat1", "deviceInformation", "thermostat1"]);
        assert_eq!(
            registry.iter().collect::<Vec<_>>(),
            vec!["thermostat1", "deviceInformation"]
        );
        assert!(registry.contains("deviceInformation"));
        assert!(!registry.contains("Thermostat1"));
    }

    #[test]
    fn deserializes_from_json_array() {
        let registry: ComponentRegistry =
            serde_json::from_str(r#"["thermostat1","thermostat2"]"#).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("thermostat2"));
    }
}
