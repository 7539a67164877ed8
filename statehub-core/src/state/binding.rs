//! Binding Manager
//!
//! Adapts the per-name subscription mechanism to "whole-object" consumers:
//! hosts that keep a local key/value bag and expect merge-style partial
//! updates, possibly with several states nested under one container key.
//!
//! # How Binding Works
//!
//! 1. On the first `bind_states` call for a consumer, a [`ConsumerBinding`] is
//!    created together with a single dispatcher subscriber that captures the
//!    consumer.
//!
//! 2. Every bound name subscribes that same dispatcher. Later `bind_states`
//!    calls reuse it, so its identity never changes while the binding lives.
//!
//! 3. When a bound state changes, the dispatcher forwards only that one name:
//!    `{name: value}` at the top level, or `{container: {..existing, name: value}}`
//!    when the name was bound under a container.
//!
//! 4. `unbind_states` removes subscriptions and bookkeeping; the binding is
//!    dropped once no names remain.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::store::Store;
use super::subscriber::{Subscriber, SubscriberId};

/// Unique identifier for a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Generate a new unique consumer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

/// A host-side unit that can receive state.
///
/// Implementors expose a local mutable key/value bag and a merge-style update
/// operation. The store writes the bag directly in
/// [`Store::load_states`] and calls [`merge_update`](Consumer::merge_update)
/// from bindings; applying the merge and re-rendering is up to the host.
pub trait Consumer: Send + Sync {
    /// Stable identity of this consumer.
    fn consumer_id(&self) -> ConsumerId;

    /// Read a key from the local bag.
    fn read_local(&self, key: &str) -> Option<Value>;

    /// Write a key into the local bag without triggering an update.
    fn write_local(&self, key: &str, value: Value);

    /// Apply a partial update.
    fn merge_update(&self, partial: Map<String, Value>);
}

/// Per-consumer bookkeeping.
pub(crate) struct ConsumerBinding {
    consumer: Arc<dyn Consumer>,
    bound: IndexSet<String>,
    /// Shared with the dispatcher closure.
    containers: Arc<Mutex<HashMap<String, String>>>,
    dispatcher: Subscriber,
}

impl ConsumerBinding {
    fn new(consumer: Arc<dyn Consumer>) -> Self {
        let containers: Arc<Mutex<HashMap<String, String>>> = Arc::default();
        let dispatcher = make_dispatcher(consumer.clone(), containers.clone());

        Self {
            consumer,
            bound: IndexSet::new(),
            containers,
            dispatcher,
        }
    }
}

impl fmt::Debug for ConsumerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerBinding")
            .field("consumer", &self.consumer.consumer_id())
            .field("bound", &self.bound)
            .field("containers", &*self.containers.lock())
            .field("dispatcher", &self.dispatcher.id())
            .finish()
    }
}

/// Build the single subscriber that forwards notifications to `consumer`.
fn make_dispatcher(
    consumer: Arc<dyn Consumer>,
    containers: Arc<Mutex<HashMap<String, String>>>,
) -> Subscriber {
    Subscriber::new(move |name, value| {
        let container = containers.lock().get(name).cloned();

        let mut partial = Map::new();
        match container {
            Some(container) => {
                let mut nested = match consumer.read_local(&container) {
                    Some(Value::Object(existing)) => existing,
                    _ => Map::new(),
                };
                nested.insert(name.to_string(), value.clone());
                partial.insert(container, Value::Object(nested));
            }
            None => {
                partial.insert(name.to_string(), value.clone());
            }
        }

        trace!(consumer = consumer.consumer_id().raw(), state = name, "forwarding update");
        consumer.merge_update(partial);
    })
}

impl Store {
    /// Copy current values straight into a consumer's local bag.
    ///
    /// Meant for initialization before the consumer is listening: no
    /// subscription is created and no merge update is issued. Absent values
    /// are written as `null`. With a container, the values are written as one
    /// object under that key, replacing whatever was there.
    pub fn load_states<C>(&self, consumer: &C, names: &[&str], container: Option<&str>)
    where
        C: Consumer + ?Sized,
    {
        let values: Vec<(String, Value)> = names
            .iter()
            .map(|name| (name.to_string(), self.get_state(name).unwrap_or(Value::Null)))
            .collect();

        match container {
            Some(container) => {
                let nested: Map<String, Value> = values.into_iter().collect();
                consumer.write_local(container, Value::Object(nested));
            }
            None => {
                for (name, value) in values {
                    consumer.write_local(&name, value);
                }
            }
        }
    }

    /// Bind a consumer to states and push their current values.
    ///
    /// Issues exactly one merge update per call carrying every requested name
    /// (nested under `container` if given). Later changes to any bound name
    /// arrive as single-name merge updates.
    pub fn bind_states<C>(&self, consumer: &Arc<C>, names: &[&str], container: Option<&str>)
    where
        C: Consumer + 'static,
    {
        let consumer_id = consumer.consumer_id();
        let mut snapshot = Map::new();

        // Nothing to bind, so no binding is created, but the caller still gets
        // its one update.
        if !names.is_empty() {
            let mut bindings = self.inner.bindings.lock();
            let binding = bindings.entry(consumer_id).or_insert_with(|| {
                debug!(consumer = consumer_id.raw(), "creating binding");
                ConsumerBinding::new(consumer.clone() as Arc<dyn Consumer>)
            });

            let mut registry = self.inner.registry.lock();
            for name in names {
                binding.bound.insert(name.to_string());
                if let Some(container) = container {
                    binding
                        .containers
                        .lock()
                        .insert(name.to_string(), container.to_string());
                }

                let entry = registry.init(name, None);
                entry.add_subscriber(&binding.dispatcher);
                entry.add_consumer(consumer_id);
                snapshot.insert(
                    name.to_string(),
                    entry.value().cloned().unwrap_or(Value::Null),
                );
            }

            debug!(
                consumer = consumer_id.raw(),
                names = names.len(),
                container = container.unwrap_or(""),
                "bound states"
            );
        }

        let update = match container {
            Some(container) => {
                let mut wrapped = Map::new();
                wrapped.insert(container.to_string(), Value::Object(snapshot));
                wrapped
            }
            None => snapshot,
        };
        consumer.merge_update(update);
    }

    /// Unbind a consumer from some or all of its states.
    ///
    /// `None` unbinds every name the consumer is bound to. Names that were
    /// never bound, and consumers with no binding, are ignored.
    pub fn unbind_states(&self, consumer: ConsumerId, names: Option<&[&str]>) {
        let mut bindings = self.inner.bindings.lock();
        let Some(binding) = bindings.get_mut(&consumer) else {
            return;
        };

        let targets: Vec<String> = match names {
            Some(names) => names.iter().map(|name| name.to_string()).collect(),
            None => binding.bound.iter().cloned().collect(),
        };

        {
            let mut registry = self.inner.registry.lock();
            for name in &targets {
                if !binding.bound.shift_remove(name) {
                    continue;
                }
                binding.containers.lock().remove(name);

                if let Some(entry) = registry.get_mut(name) {
                    entry.remove_subscriber(binding.dispatcher.id());
                    entry.remove_consumer(consumer);
                }
            }
        }

        debug!(consumer = consumer.raw(), remaining = binding.bound.len(), "unbound states");

        if binding.bound.is_empty() {
            bindings.remove(&consumer);
            debug!(consumer = consumer.raw(), "dropped binding");
        }
    }

    /// Whether `consumer` is currently bound to `name`.
    pub fn is_bound(&self, consumer: ConsumerId, name: &str) -> bool {
        self.inner
            .bindings
            .lock()
            .get(&consumer)
            .is_some_and(|binding| binding.bound.contains(name))
    }

    /// Names `consumer` is bound to, in bind order.
    pub fn bound_names(&self, consumer: ConsumerId) -> Vec<String> {
        self.inner
            .bindings
            .lock()
            .get(&consumer)
            .map(|binding| binding.bound.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The container `name` is nested under for `consumer`, if any.
    pub fn container_of(&self, consumer: ConsumerId, name: &str) -> Option<String> {
        self.inner
            .bindings
            .lock()
            .get(&consumer)
            .and_then(|binding| binding.containers.lock().get(name).cloned())
    }

    /// Identity of the dispatcher installed for `consumer`.
    pub fn dispatcher_id(&self, consumer: ConsumerId) -> Option<SubscriberId> {
        self.inner
            .bindings
            .lock()
            .get(&consumer)
            .map(|binding| binding.dispatcher.id())
    }

    /// Number of consumers with a live binding.
    pub fn binding_count(&self) -> usize {
        self.inner.bindings.lock().len()
    }
}
