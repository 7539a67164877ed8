//! State Registry
//!
//! The registry owns one [`StateEntry`] per state name: the current value, the
//! subscribers registered on it, and the consumers bound to it. Entries are
//! created lazily the first time a name is referenced and are never removed;
//! clearing a state only drops its value.
//!
//! The registry itself is plain data. [`Store`](super::Store) wraps it in a
//! lock and makes sure no lock is held while subscriber callbacks run.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::debug;

use super::binding::ConsumerId;
use super::subscriber::{Subscriber, SubscriberId};

/// Subscriber list captured at the start of a dispatch.
///
/// Most states have a handful of listeners, so the snapshot stays on the stack.
pub(crate) type SubscriberSnapshot = SmallVec<[Subscriber; 4]>;

/// Per-name record held by the registry.
#[derive(Debug, Default)]
pub(crate) struct StateEntry {
    /// Current value. `None` when the state was never given one or was cleared.
    value: Option<Value>,

    /// Subscribers in registration order, keyed by identity.
    subscribers: IndexMap<SubscriberId, Subscriber>,

    /// Consumers bound to this state through the binding manager.
    bound_consumers: IndexSet<ConsumerId>,
}

impl StateEntry {
    fn new(value: Option<Value>) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = Some(value);
    }

    pub(crate) fn clear_value(&mut self) {
        self.value = None;
    }

    /// Add a subscriber. Returns `false` if it was already registered.
    pub(crate) fn add_subscriber(&mut self, subscriber: &Subscriber) -> bool {
        if self.subscribers.contains_key(&subscriber.id()) {
            return false;
        }
        self.subscribers.insert(subscriber.id(), subscriber.clone());
        true
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub(crate) fn remove_subscriber(&mut self, id: SubscriberId) -> bool {
        self.subscribers.shift_remove(&id).is_some()
    }

    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn snapshot_subscribers(&self) -> SubscriberSnapshot {
        self.subscribers.values().cloned().collect()
    }

    pub(crate) fn add_consumer(&mut self, consumer: ConsumerId) {
        self.bound_consumers.insert(consumer);
    }

    pub(crate) fn remove_consumer(&mut self, consumer: ConsumerId) {
        self.bound_consumers.shift_remove(&consumer);
    }

    pub fn bound_consumers(&self) -> impl Iterator<Item = ConsumerId> + '_ {
        self.bound_consumers.iter().copied()
    }
}

/// Read-only view of a [`StateEntry`], returned by
/// [`Store::init_state`](super::Store::init_state).
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub name: String,
    pub value: Option<Value>,
    pub subscriber_count: usize,
    pub bound_consumers: Vec<ConsumerId>,
}

impl EntryInfo {
    pub(crate) fn from_entry(name: &str, entry: &StateEntry) -> Self {
        Self {
            name: name.to_string(),
            value: entry.value.clone(),
            subscriber_count: entry.subscriber_count(),
            bound_consumers: entry.bound_consumers().collect(),
        }
    }
}

/// Mapping from state name to its entry.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    states: HashMap<String, StateEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for `name`, creating it with `initial` if it does not
    /// exist yet. An existing entry is returned untouched.
    pub fn init(&mut self, name: &str, initial: Option<Value>) -> &mut StateEntry {
        match self.states.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(state = name, has_value = initial.is_some(), "materializing state");
                entry.insert(StateEntry::new(initial))
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&StateEntry> {
        self.states.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut StateEntry> {
        self.states.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Names of every materialized state, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.states.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of materialized states.
    pub fn count(&self) -> usize {
        self.states.len()
    }
}
