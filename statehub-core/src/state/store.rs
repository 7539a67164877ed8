//! Store handle
//!
//! [`Store`] is the public entry point: a cheap-to-clone handle over one
//! registry and its consumer bindings. Clones share everything, so a store
//! can be handed to every consumer that needs it.
//!
//! # Locking
//!
//! The registry and the bindings each sit behind a `parking_lot` mutex. Locks
//! are only held while bookkeeping is read or written and are always released
//! before subscribers run, so subscribers may call back into the store. When
//! both are needed, bindings are locked before the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::trace;

use super::binding::{ConsumerBinding, ConsumerId};
use super::registry::{EntryInfo, Registry};
use super::subscriber::{Subscriber, SubscriberId, Subscription};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

pub(crate) struct StoreInner {
    pub(crate) config: StoreConfig,
    pub(crate) registry: Mutex<Registry>,
    pub(crate) bindings: Mutex<HashMap<ConsumerId, ConsumerBinding>>,
}

/// A key-addressed reactive value store.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use statehub_core::Store;
///
/// let store = Store::new();
/// let _watch = store.watch("count", |name, value| {
///     println!("{name} is now {value}");
/// });
///
/// store.set_state("count", json!(1));
/// assert_eq!(store.get_state("count"), Some(json!(1)));
/// ```
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    /// Create a store with the default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(StoreConfig::default())
    }

    /// Create a store with a custom configuration.
    pub fn with_config(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    pub(crate) fn from_valid_config(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                registry: Mutex::new(Registry::new()),
                bindings: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Whether two handles point at the same store.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Materialize a state with `initial` unless it already exists.
    ///
    /// An existing entry is left untouched, whatever `initial` is: the first
    /// value supplied for a name wins.
    pub fn init_state(&self, name: &str, initial: Value) -> EntryInfo {
        let mut registry = self.inner.registry.lock();
        EntryInfo::from_entry(name, registry.init(name, Some(initial)))
    }

    /// Current value of a state, or `None` if it was never set or was cleared.
    pub fn get_state(&self, name: &str) -> Option<Value> {
        self.inner
            .registry
            .lock()
            .get(name)
            .and_then(|entry| entry.value().cloned())
    }

    /// Whether the state has been materialized, regardless of its value.
    pub fn contains_state(&self, name: &str) -> bool {
        self.inner.registry.lock().contains(name)
    }

    /// Write a single state and notify its subscribers.
    ///
    /// Returns after every subscriber has run, including the subscribers of
    /// writes they make themselves (up to the configured dispatch depth).
    pub fn set_state(&self, name: &str, value: Value) {
        {
            let mut registry = self.inner.registry.lock();
            registry.init(name, Some(value.clone())).set_value(value.clone());
        }
        trace!(state = name, "state written");

        self.notify(name, value);
    }

    /// Write several states, then notify.
    ///
    /// Every value is stored before the first subscriber runs, so a subscriber
    /// of one name reads the new values of the others. A name given more than
    /// once keeps its last value and is dispatched once, in first-seen order.
    pub fn set_many_states<I, K>(&self, states: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let batch: IndexMap<String, Value> = states
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();

        if batch.is_empty() {
            return;
        }

        {
            let mut registry = self.inner.registry.lock();
            for (name, value) in &batch {
                registry.init(name, Some(value.clone())).set_value(value.clone());
            }
        }
        trace!(states = batch.len(), "batch written");

        self.notify_batch(batch.into_keys().collect());
    }

    /// Read-modify-write a single state through [`set_state`](Self::set_state).
    pub fn update_state<F>(&self, name: &str, f: F)
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let current = self.get_state(name);
        let next = f(current.as_ref());
        self.set_state(name, next);
    }

    /// Shallow-merge `patch` into an object state and notify.
    ///
    /// Keys in `patch` replace keys in the current object; other keys are
    /// kept. An absent or non-object value is replaced by the patch.
    pub fn merge_state(&self, name: &str, patch: Map<String, Value>) {
        self.update_state(name, |current| {
            let mut merged = match current {
                Some(Value::Object(existing)) => existing.clone(),
                _ => Map::new(),
            };
            merged.extend(patch);
            Value::Object(merged)
        });
    }

    /// Clear a state's value. Subscribers and bindings stay in place.
    pub fn delete_state(&self, name: &str) {
        if let Some(entry) = self.inner.registry.lock().get_mut(name) {
            entry.clear_value();
            trace!(state = name, "state cleared");
        }
    }

    /// Register `subscriber` on `name`. Registering it twice has no effect.
    pub fn subscribe(&self, name: &str, subscriber: &Subscriber) {
        self.inner
            .registry
            .lock()
            .init(name, None)
            .add_subscriber(subscriber);
    }

    /// Remove `subscriber` from `name`. Unknown names and subscribers are ignored.
    pub fn unsubscribe(&self, name: &str, subscriber: &Subscriber) {
        if let Some(entry) = self.inner.registry.lock().get_mut(name) {
            entry.remove_subscriber(subscriber.id());
        }
    }

    /// Subscribe a callback and get a guard that unsubscribes it on drop.
    pub fn watch<F>(&self, name: &str, f: F) -> Subscription
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(f);
        self.subscribe(name, &subscriber);
        Subscription::new(self.clone(), name.to_string(), subscriber)
    }

    pub fn is_subscribed(&self, name: &str, subscriber: SubscriberId) -> bool {
        self.inner
            .registry
            .lock()
            .get(name)
            .is_some_and(|entry| entry.has_subscriber(subscriber))
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .registry
            .lock()
            .get(name)
            .map_or(0, |entry| entry.subscriber_count())
    }

    /// Names of every materialized state, sorted.
    pub fn state_names(&self) -> Vec<String> {
        self.inner.registry.lock().names()
    }

    /// Read a state as a Rust type.
    pub fn get_state_as<T>(&self, name: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.get_state(name)
            .map(serde_json::from_value)
            .transpose()
            .map_err(|source| StoreError::Deserialize {
                name: name.to_string(),
                source,
            })
    }

    /// Write a state from a Rust value through [`set_state`](Self::set_state).
    pub fn set_state_from<T>(&self, name: &str, value: &T) -> StoreResult<()>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Serialize {
            name: name.to_string(),
            source,
        })?;
        self.set_state(name, value);
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Separate statements so the two locks are never held together.
        let bindings = self.inner.bindings.lock().len();
        let states = self.inner.registry.lock().count();
        f.debug_struct("Store")
            .field("states", &states)
            .field("bindings", &bindings)
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(store: &Store, name: &str) -> (Subscription, Arc<Mutex<Vec<(String, Value)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sub = store.watch(name, move |name, value| {
            seen_clone.lock().push((name.to_string(), value.clone()));
        });
        (sub, seen)
    }

    #[test]
    fn get_unknown_is_absent() {
        let store = Store::new();
        assert_eq!(store.get_state("nope"), None);
        assert!(!store.contains_state("nope"));
    }

    #[test]
    fn set_then_get() {
        let store = Store::new();
        let (_sub, seen) = recorder(&store, "n");

        store.set_state("n", json!("v1"));

        assert_eq!(store.get_state("n"), Some(json!("v1")));
        assert_eq!(*seen.lock(), vec![("n".to_string(), json!("v1"))]);
    }

    #[test]
    fn init_state_first_writer_wins() {
        let store = Store::new();

        let first = store.init_state("theme", json!("dark"));
        let second = store.init_state("theme", json!("light"));

        assert_eq!(first.value, Some(json!("dark")));
        assert_eq!(second.value, Some(json!("dark")));
        assert_eq!(second.name, "theme");
    }

    #[test]
    fn init_state_after_subscribe_keeps_absent_value() {
        let store = Store::new();
        let sub = Subscriber::new(|_, _| {});
        store.subscribe("n", &sub);

        // Subscribing materialized the entry without a value.
        let info = store.init_state("n", json!(1));
        assert_eq!(info.value, None);
        assert_eq!(info.subscriber_count, 1);
    }

    #[test]
    fn double_subscribe_notifies_once() {
        let store = Store::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let sub = Subscriber::new(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.subscribe("n", &sub);
        store.subscribe("n", &sub);
        store.set_state("n", json!(true));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.subscriber_count("n"), 1);
    }

    #[test]
    fn unsubscribe_unknown_name_does_not_materialize() {
        let store = Store::new();
        store.unsubscribe("ghost", &Subscriber::new(|_, _| {}));
        assert!(!store.contains_state("ghost"));
    }

    #[test]
    fn delete_keeps_subscribers() {
        let store = Store::new();
        let (_sub, seen) = recorder(&store, "n");

        store.set_state("n", json!(1));
        store.delete_state("n");

        assert_eq!(store.get_state("n"), None);
        assert!(store.contains_state("n"));
        assert_eq!(store.subscriber_count("n"), 1);

        store.set_state("n", json!(2));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn delete_unknown_is_noop() {
        let store = Store::new();
        store.delete_state("never");
        assert!(!store.contains_state("never"));
    }

    #[test]
    fn batch_values_visible_to_every_subscriber() {
        let store = Store::new();
        let observed = Arc::new(Mutex::new(None));

        let _sub = {
            let store_ref = store.clone();
            let observed = observed.clone();
            store.watch("a", move |_, _| {
                *observed.lock() = store_ref.get_state("b");
            })
        };

        store.set_state("b", json!(0));
        store.set_many_states([("a", json!(1)), ("b", json!(2))]);

        assert_eq!(*observed.lock(), Some(json!(2)));
    }

    #[test]
    fn batch_dispatches_each_name_once_with_last_value() {
        let store = Store::new();
        let (_a, seen_a) = recorder(&store, "a");
        let (_b, seen_b) = recorder(&store, "b");

        store.set_many_states(vec![
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
            ("a".to_string(), json!(3)),
        ]);

        assert_eq!(*seen_a.lock(), vec![("a".to_string(), json!(3))]);
        assert_eq!(*seen_b.lock(), vec![("b".to_string(), json!(2))]);
    }

    #[test]
    fn empty_batch_is_noop() {
        let store = Store::new();
        store.set_many_states(Vec::<(String, Value)>::new());
        assert!(store.state_names().is_empty());
    }

    #[test]
    fn update_and_merge() {
        let store = Store::new();

        store.update_state("count", |v| json!(v.and_then(Value::as_i64).unwrap_or(0) + 1));
        store.update_state("count", |v| json!(v.and_then(Value::as_i64).unwrap_or(0) + 1));
        assert_eq!(store.get_state("count"), Some(json!(2)));

        store.set_state("user", json!({"name": "ada", "age": 36}));
        let mut patch = Map::new();
        patch.insert("age".into(), json!(37));
        store.merge_state("user", patch);
        assert_eq!(store.get_state("user"), Some(json!({"name": "ada", "age": 37})));

        let mut patch = Map::new();
        patch.insert("k".into(), json!(true));
        store.merge_state("scalar", patch);
        assert_eq!(store.get_state("scalar"), Some(json!({"k": true})));
    }

    #[test]
    fn typed_access() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let store = Store::new();
        store.set_state_from("p", &Point { x: 1, y: 2 }).unwrap();

        assert_eq!(store.get_state_as::<Point>("p").unwrap(), Some(Point { x: 1, y: 2 }));
        assert_eq!(store.get_state_as::<Point>("missing").unwrap(), None);

        let err = store.get_state_as::<String>("p").unwrap_err();
        assert!(matches!(err, StoreError::Deserialize { ref name, .. } if name == "p"));
    }

    #[test]
    fn clones_share_state() {
        let a = Store::new();
        let b = a.clone();

        a.set_state("x", json!(1));
        assert_eq!(b.get_state("x"), Some(json!(1)));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Store::new()));
    }

    #[test]
    fn with_config_validates() {
        assert!(Store::with_config(StoreConfig::default().with_max_dispatch_depth(0)).is_err());
        let store = Store::with_config(StoreConfig::default().with_max_dispatch_depth(8)).unwrap();
        assert_eq!(store.config().max_dispatch_depth, 8);
    }

    #[test]
    fn debug_reports_counts_while_binding_elsewhere() {
        use crate::Consumer;

        let store = Store::new();
        store.set_state("a", json!(1));

        let binder = {
            let store = store.clone();
            std::thread::spawn(move || {
                let bag = Arc::new(crate::StateBag::new());
                for _ in 0..200 {
                    store.bind_states(&bag, &["a", "b"], None);
                    store.unbind_states(bag.consumer_id(), None);
                }
            })
        };

        for _ in 0..200 {
            let rendered = format!("{store:?}");
            assert!(rendered.starts_with("Store { states: "));
        }
        binder.join().expect("binder thread");

        assert_eq!(
            format!("{store:?}"),
            format!(
                "Store {{ states: 2, bindings: 0, config: {:?} }}",
                store.config()
            )
        );
    }
}
