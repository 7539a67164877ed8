//! A ready-made [`Consumer`] backed by a JSON object.
//!
//! Merge updates replace top-level keys, which is the shallow merge most
//! component models apply. Hosts with their own state model implement
//! [`Consumer`] directly instead.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::binding::{Consumer, ConsumerId};

type UpdateHook = Arc<dyn Fn(&Map<String, Value>) + Send + Sync>;

/// Local state bag for one consumer.
pub struct StateBag {
    id: ConsumerId,
    state: Mutex<Map<String, Value>>,
    updates: AtomicUsize,
    on_update: Option<UpdateHook>,
}

impl StateBag {
    pub fn new() -> Self {
        Self {
            id: ConsumerId::new(),
            state: Mutex::new(Map::new()),
            updates: AtomicUsize::new(0),
            on_update: None,
        }
    }

    /// Run `hook` with each partial update after it has been applied.
    pub fn with_update_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Map<String, Value>) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(hook));
        self
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    /// Copy of the whole bag.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.state.lock().clone()
    }

    /// Number of merge updates applied so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl Default for StateBag {
    fn default() -> Self {
        Self::new()
    }
}

impl Consumer for StateBag {
    fn consumer_id(&self) -> ConsumerId {
        self.id
    }

    fn read_local(&self, key: &str) -> Option<Value> {
        self.get(key)
    }

    fn write_local(&self, key: &str, value: Value) {
        self.state.lock().insert(key.to_string(), value);
    }

    fn merge_update(&self, partial: Map<String, Value>) {
        // Release the lock before the hook runs; it may read the bag.
        {
            let mut state = self.state.lock();
            for (key, value) in &partial {
                state.insert(key.clone(), value.clone());
            }
        }
        self.updates.fetch_add(1, Ordering::SeqCst);

        if let Some(hook) = &self.on_update {
            hook(&partial);
        }
    }
}

impl fmt::Debug for StateBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBag")
            .field("id", &self.id)
            .field("state", &*self.state.lock())
            .field("updates", &self.update_count())
            .finish()
    }
}
