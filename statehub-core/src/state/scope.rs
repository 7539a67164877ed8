//! Scoped stores
//!
//! A [`StoreMap`] hands out one isolated [`Store`] per scope name, creating it
//! on first access. Scopes let independent parts of an application (or
//! independent tests) keep separate state without a process-wide singleton.

use dashmap::DashMap;
use tracing::debug;

use super::store::Store;
use crate::config::StoreConfig;
use crate::error::StoreResult;

/// Map of scope name to store.
#[derive(Debug, Default)]
pub struct StoreMap {
    config: StoreConfig,
    stores: DashMap<String, Store>,
}

impl StoreMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map whose stores all use `config`.
    pub fn with_config(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stores: DashMap::new(),
        })
    }

    /// The store for `scope`, created on first access.
    pub fn get_or_create(&self, scope: &str) -> Store {
        if let Some(store) = self.stores.get(scope) {
            return store.clone();
        }

        self.stores
            .entry(scope.to_string())
            .or_insert_with(|| {
                debug!(scope, "creating scoped store");
                Store::from_valid_config(self.config)
            })
            .clone()
    }

    /// The store for `scope`, if it was created.
    pub fn get(&self, scope: &str) -> Option<Store> {
        self.stores.get(scope).map(|store| store.clone())
    }

    /// Detach a scope. Existing handles keep working; the next
    /// `get_or_create` for the name starts from an empty store.
    pub fn remove(&self, scope: &str) -> Option<Store> {
        self.stores.remove(scope).map(|(_, store)| store)
    }

    /// Names of all scopes, sorted.
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.stores.iter().map(|entry| entry.key().clone()).collect();
        scopes.sort();
        scopes
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
