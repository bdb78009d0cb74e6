//! Provider key to adapter constructor table.
//!
//! The registry is filled once during process start (see
//! `payswitch_providers::default_registry`) and shared read-only afterwards.
//! [`AdapterRegistry::register`] takes `&mut self`, so nothing can register
//! once the registry sits behind an `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::Adapter;
use crate::config::ProviderConfig;
use crate::error::SwitchError;
use crate::model::ProviderId;

/// Builds an adapter from its provider configuration.
pub type AdapterConstructor =
    Arc<dyn Fn(&ProviderConfig) -> Result<Box<dyn Adapter>, SwitchError> + Send + Sync>;

/// Registry of adapter constructors, keyed by provider.
#[derive(Default, Clone)]
pub struct AdapterRegistry(BTreeMap<ProviderId, AdapterConstructor>);

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.0.keys().map(ProviderId::as_str).collect();
        f.debug_tuple("AdapterRegistry").field(&keys).finish()
    }
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Registers a constructor under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Configuration`] if `key` is already registered.
    pub fn register<F>(&mut self, key: impl Into<ProviderId>, constructor: F) -> Result<&mut Self, SwitchError>
    where
        F: Fn(&ProviderConfig) -> Result<Box<dyn Adapter>, SwitchError> + Send + Sync + 'static,
    {
        let key = key.into();
        if self.0.contains_key(&key) {
            return Err(SwitchError::Configuration(format!(
                "provider '{key}' is already registered"
            )));
        }
        self.0.insert(key, Arc::new(constructor));
        Ok(self)
    }

    /// Looks up the constructor for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::ProviderNotFound`] for unknown keys.
    pub fn resolve(&self, key: &ProviderId) -> Result<AdapterConstructor, SwitchError> {
        self.0
            .get(key)
            .cloned()
            .ok_or_else(|| SwitchError::ProviderNotFound(key.clone()))
    }

    /// Resolves `key` and builds an adapter from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::ProviderNotFound`] for unknown keys, or
    /// whatever the constructor returns.
    pub fn build(&self, key: &ProviderId, config: &ProviderConfig) -> Result<Box<dyn Adapter>, SwitchError> {
        let constructor = self.resolve(key)?;
        constructor(config)
    }

    /// Registered keys in sorted order.
    #[must_use]
    pub fn list(&self) -> Vec<ProviderId> {
        self.0.keys().cloned().collect()
    }

    /// Returns `true` if `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &ProviderId) -> bool {
        self.0.contains_key(key)
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
