//! Plugin metadata and the runtime record binding one instance to it.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::ConfigError;

/// Named stages of the exchange lifecycle, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InterceptPoint {
    RequestBeforeAuth,
    Auth,
    RequestAfterAuth,
    RequestBeforeForward,
    Response,
}

/// Whether an interceptor applies to every exchange or only when a
/// request names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorScope {
    Named,
    Global,
}

/// Static metadata a plugin supplies when it enters the registration
/// table.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Unique key within the plugin's kind.
    pub name: String,
    pub description: String,
    pub enabled_by_default: bool,
    /// Initializers only: lower runs first.
    pub priority: i32,
    pub implementation_id: String,
}

impl PluginDescriptor {
    pub fn new(
        name: &str,
        description: &str,
        enabled_by_default: bool,
        implementation_id: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            enabled_by_default,
            priority: 0,
            implementation_id: implementation_id.to_string(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// The uniform effective-enabled rule, applied identically to every
/// plugin kind: the descriptor default, inverted when the instance config
/// sets `toggle-enabled: true`. The key is strictly boolean.
pub fn effective_enabled(
    enabled_by_default: bool,
    config: &Map<String, Value>,
) -> Result<bool, ConfigError> {
    let toggle = match config.get("toggle-enabled") {
        None => false,
        Some(Value::Bool(toggle)) => *toggle,
        Some(_) => {
            return Err(ConfigError::WrongType {
                key: "toggle-enabled".to_string(),
                expected: "a boolean",
            })
        }
    };
    Ok(enabled_by_default ^ toggle)
}

/// Runtime binding of one plugin instance to its metadata and resolved
/// configuration sub-map. The registry only ever publishes enabled
/// records; effective-enabled is computed once, before construction.
pub struct PluginRecord<T: ?Sized> {
    descriptor: PluginDescriptor,
    instance: Arc<T>,
    config: Map<String, Value>,
    enabled: bool,
}

impl<T: ?Sized> PluginRecord<T> {
    pub fn new(
        descriptor: PluginDescriptor,
        instance: Arc<T>,
        config: Map<String, Value>,
        enabled: bool,
    ) -> Self {
        Self {
            descriptor,
            instance,
            config,
            enabled,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn instance(&self) -> &Arc<T> {
        &self.instance
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<T: ?Sized> std::fmt::Debug for PluginRecord<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRecord")
            .field("descriptor", &self.descriptor)
            .field("config", &self.config)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> Clone for PluginRecord<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            instance: Arc::clone(&self.instance),
            config: self.config.clone(),
            enabled: self.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn absent_toggle_keeps_the_descriptor_default() {
        assert!(effective_enabled(true, &Map::new()).unwrap());
        assert!(!effective_enabled(false, &Map::new()).unwrap());
    }

    #[test]
    fn toggle_inverts_the_default() {
        let toggled = config(json!({ "toggle-enabled": true }));
        assert!(!effective_enabled(true, &toggled).unwrap());
        assert!(effective_enabled(false, &toggled).unwrap());

        let untoggled = config(json!({ "toggle-enabled": false }));
        assert!(effective_enabled(true, &untoggled).unwrap());
        assert!(!effective_enabled(false, &untoggled).unwrap());
    }

    #[test]
    fn toggle_is_strictly_boolean() {
        let bad = config(json!({ "toggle-enabled": "yes" }));
        let err = effective_enabled(true, &bad).unwrap_err();
        assert!(err.to_string().contains("toggle-enabled"));
    }
}
