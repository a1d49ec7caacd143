// src/plugin.rs - Analysis plugin contract and registry

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::errors::{OrganoidError, Result};
use crate::mask::MaskD;
use crate::record::FeatureRecord;

/// Identifying metadata for a registered plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub plugin_type: String,
    pub plugin_name: String,
    pub version: String,
    pub required_config_keys: Vec<String>,
}

impl PluginDescriptor {
    pub fn new(plugin_type: &str, plugin_name: &str, version: &str, required: &[&str]) -> Self {
        Self {
            plugin_type: plugin_type.to_string(),
            plugin_name: plugin_name.to_string(),
            version: version.to_string(),
            required_config_keys: required.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Registry identity key: `"{type}.{name}"`.
    pub fn key(&self) -> String {
        plugin_key(&self.plugin_type, &self.plugin_name)
    }
}

pub fn plugin_key(plugin_type: &str, plugin_name: &str) -> String {
    format!("{}.{}", plugin_type, plugin_name)
}

/// Free-form plugin configuration, as parsed from a `[plugins.<type>.<name>]`
/// TOML table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig(BTreeMap<String, toml::Value>);

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: BTreeMap<String, toml::Value>) -> Self {
        Self(table)
    }

    pub fn set(&mut self, key: &str, value: toml::Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            toml::Value::Float(v) => Some(*v),
            toml::Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// A two-element numeric array such as `size_range = [50.0, 500.0]`.
    pub fn get_f64_pair(&self, key: &str) -> Option<(f64, f64)> {
        match self.0.get(key)? {
            toml::Value::Array(items) if items.len() == 2 => {
                let as_f64 = |v: &toml::Value| match v {
                    toml::Value::Float(f) => Some(*f),
                    toml::Value::Integer(i) => Some(*i as f64),
                    _ => None,
                };
                Some((as_f64(&items[0])?, as_f64(&items[1])?))
            }
            _ => None,
        }
    }

    /// Check that every required key is present, listing exactly the missing
    /// ones on failure. Plugin constructors call this before reading any
    /// values; construction does not proceed past a failed check.
    pub fn require(&self, required: &[String]) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|key| !self.0.contains_key(*key))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OrganoidError::MissingConfigKeys(missing))
        }
    }
}

/// Descriptive morphology expectations declared by a plugin.
pub type MorphologySpec = BTreeMap<String, toml::Value>;

/// A domain-specific analysis unit.
///
/// Implementations are constructed once per registry key with a validated
/// configuration snapshot and reused for all subsequent `analyze` calls.
pub trait OrganoidPlugin: Send + Sync {
    /// Config keys the plugin refuses to construct without.
    fn required_config_keys(&self) -> &[String];

    /// Declared morphology expectations (shape class, valid ranges).
    fn define_morphology(&self) -> MorphologySpec;

    /// Run the domain-specific analysis on a labeled mask.
    fn analyze(&self, mask: &MaskD) -> Result<FeatureRecord>;

    fn metadata(&self) -> PluginDescriptor;
}

/// Constructor for a plugin, invoked by the registry with the caller's
/// configuration.
pub type PluginFactory =
    Box<dyn Fn(&PluginConfig) -> Result<Arc<dyn OrganoidPlugin>> + Send + Sync>;

/// A registration entry for manifest-style plugin collection.
pub struct PluginRegistration {
    pub descriptor: PluginDescriptor,
    pub factory: PluginFactory,
}

/// Name-to-constructor lookup for analysis plugins.
///
/// Registration is an explicit call made during startup; there is no runtime
/// file scanning. Instances created through `create` are cached and reused
/// until the key is re-created or the registry is dropped.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, (PluginDescriptor, PluginFactory)>,
    instances: HashMap<String, Arc<dyn OrganoidPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin constructor under its descriptor's identity key.
    /// Re-registering a key replaces the previous factory.
    pub fn register(&mut self, descriptor: PluginDescriptor, factory: PluginFactory) {
        let key = descriptor.key();
        info!("registered plugin: {}", key);
        self.factories.insert(key, (descriptor, factory));
    }

    /// Register a batch of declared plugins. A duplicate key is logged and
    /// skipped so one bad entry does not prevent the others from loading.
    pub fn register_from_manifest(&mut self, entries: Vec<PluginRegistration>) {
        for entry in entries {
            let key = entry.descriptor.key();
            if self.factories.contains_key(&key) {
                error!("skipping duplicate plugin registration: {}", key);
                continue;
            }
            self.register(entry.descriptor, entry.factory);
        }
    }

    /// Descriptor of a registered plugin, available before construction.
    pub fn descriptor(&self, plugin_type: &str, plugin_name: &str) -> Option<&PluginDescriptor> {
        self.factories
            .get(&plugin_key(plugin_type, plugin_name))
            .map(|(descriptor, _)| descriptor)
    }

    /// Construct (and cache) a plugin instance with the given configuration.
    ///
    /// Fails with `PluginNotFound` for an unregistered key; construction
    /// errors (missing config keys) surface unchanged.
    pub fn create(
        &mut self,
        plugin_type: &str,
        plugin_name: &str,
        config: &PluginConfig,
    ) -> Result<Arc<dyn OrganoidPlugin>> {
        let key = plugin_key(plugin_type, plugin_name);
        let (_, factory) = self
            .factories
            .get(&key)
            .ok_or_else(|| OrganoidError::PluginNotFound(key.clone()))?;
        let instance = factory(config)?;
        self.instances.insert(key, Arc::clone(&instance));
        Ok(instance)
    }

    /// A previously created instance, if any.
    pub fn get(&self, plugin_type: &str, plugin_name: &str) -> Option<Arc<dyn OrganoidPlugin>> {
        self.instances
            .get(&plugin_key(plugin_type, plugin_name))
            .cloned()
    }

    pub fn registered_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.factories.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Registry pre-populated with every plugin linked into this crate.
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register_from_manifest(crate::plugins::builtin_plugins());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use toml::Value;

    fn spheroid_config() -> PluginConfig {
        let mut config = PluginConfig::new();
        config.set(
            "size_range",
            Value::Array(vec![Value::Float(10.0), Value::Float(1000.0)]),
        );
        config.set("sphericity_threshold", Value::Float(0.5));
        config
    }

    #[test]
    fn create_unknown_plugin_fails() {
        let mut registry = builtin_registry();
        let err = registry
            .create("organoid", "nonexistent", &PluginConfig::new())
            .err()
            .unwrap();
        match err {
            OrganoidError::PluginNotFound(key) => assert_eq!(key, "organoid.nonexistent"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn create_caches_instance_for_get() {
        let mut registry = builtin_registry();
        assert!(registry.get("organoid", "spheroid").is_none());
        registry
            .create("organoid", "spheroid", &spheroid_config())
            .unwrap();
        let instance = registry.get("organoid", "spheroid").unwrap();
        assert_eq!(instance.metadata().plugin_name, "spheroid");
    }

    #[test]
    fn missing_config_keys_lists_exactly_the_missing_ones() {
        let mut registry = builtin_registry();
        let mut config = PluginConfig::new();
        config.set("sphericity_threshold", Value::Float(0.5));

        let err = registry
            .create("organoid", "spheroid", &config)
            .err()
            .unwrap();
        match err {
            OrganoidError::MissingConfigKeys(mut keys) => {
                keys.sort();
                assert_eq!(keys, ["size_range"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn descriptor_is_available_before_construction() {
        let registry = builtin_registry();
        let descriptor = registry.descriptor("organoid", "spheroid").unwrap();
        let mut required = descriptor.required_config_keys.clone();
        required.sort();
        assert_eq!(required, ["size_range", "sphericity_threshold"]);
    }

    #[test]
    fn duplicate_manifest_entry_is_skipped_not_fatal() {
        let mut registry = builtin_registry();
        let before = registry.registered_keys();
        registry.register_from_manifest(crate::plugins::builtin_plugins());
        assert_eq!(registry.registered_keys(), before);
    }
}
