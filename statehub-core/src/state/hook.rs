//! Auto-subscribing accessor
//!
//! A [`StateHook`] serves a short-lived consumer that reads one state, may
//! write it, and wants updates only while it is alive:
//!
//! 1. [`Store::use_state`] materializes the state (first writer wins) and
//!    captures its current value.
//!
//! 2. The host calls [`StateHook::mount`] when the consumer starts observing.
//!    This installs a temporary subscriber that keeps the hook's value fresh
//!    and invokes the host's change callback.
//!
//! 3. The host calls [`StateHook::unmount`] when the consumer stops, or simply
//!    drops the hook. Either way the subscriber is removed.
//!
//! Writes go through [`Store::set_state`], never the batched form.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use super::store::Store;
use super::subscriber::Subscriber;

/// Writes one state through [`Store::set_state`].
#[derive(Clone)]
pub struct StateSetter {
    store: Store,
    name: Arc<str>,
}

impl StateSetter {
    pub fn set(&self, value: Value) {
        self.store.set_state(&self.name, value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for StateSetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter").field("name", &self.name).finish()
    }
}

/// Value + setter pair for one state, with an optional temporary subscription.
pub struct StateHook {
    setter: StateSetter,
    current: Arc<Mutex<Option<Value>>>,
    subscriber: Option<Subscriber>,
}

impl StateHook {
    /// The hook's view of the state's value.
    pub fn value(&self) -> Option<Value> {
        self.current.lock().clone()
    }

    pub fn name(&self) -> &str {
        self.setter.name()
    }

    /// Write the state through the store.
    pub fn set(&self, value: Value) {
        self.setter.set(value);
    }

    /// A detached handle that writes the same state.
    pub fn setter(&self) -> StateSetter {
        self.setter.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.subscriber.is_some()
    }

    /// Start observing.
    ///
    /// `on_change` runs after the hook's value has been updated. The value is
    /// refreshed from the store here too, so a write made between
    /// [`Store::use_state`] and mounting is not lost. Mounting an already
    /// mounted hook does nothing.
    pub fn mount<F>(&mut self, on_change: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        if self.subscriber.is_some() {
            return;
        }

        let current = self.current.clone();
        let subscriber = Subscriber::new(move |_, value| {
            *current.lock() = Some(value.clone());
            on_change(value);
        });

        let store = &self.setter.store;
        *self.current.lock() = store.get_state(self.name());
        store.subscribe(self.name(), &subscriber);
        trace!(state = self.name(), subscriber = subscriber.id().raw(), "hook mounted");

        self.subscriber = Some(subscriber);
    }

    /// Stop observing. Safe to call more than once.
    pub fn unmount(&mut self) {
        if let Some(subscriber) = self.subscriber.take() {
            self.setter.store.unsubscribe(&self.setter.name, &subscriber);
            trace!(state = self.name(), subscriber = subscriber.id().raw(), "hook unmounted");
        }
    }
}

impl Drop for StateHook {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl fmt::Debug for StateHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHook")
            .field("name", &self.name())
            .field("value", &self.value())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

impl Store {
    /// Create an accessor for `name`, initializing it with `initial` if the
    /// state does not exist yet.
    pub fn use_state(&self, name: &str, initial: Value) -> StateHook {
        let info = self.init_state(name, initial);

        StateHook {
            setter: StateSetter {
                store: self.clone(),
                name: Arc::from(name),
            },
            current: Arc::new(Mutex::new(info.value)),
            subscriber: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn use_state_initializes_once() {
        let store = Store::new();

        let first = store.use_state("hello", json!(true));
        let second = store.use_state("hello", json!(false));

        assert_eq!(first.value(), Some(json!(true)));
        assert_eq!(second.value(), Some(json!(true)));
    }

    #[test]
    fn setter_writes_through_store() {
        let store = Store::new();
        let hook = store.use_state("count", json!(0));

        hook.set(json!(1));
        assert_eq!(store.get_state("count"), Some(json!(1)));

        let setter = hook.setter();
        setter.set(json!(2));
        assert_eq!(store.get_state("count"), Some(json!(2)));
        assert_eq!(setter.name(), "count");
    }

    #[test]
    fn mounted_hook_tracks_changes() {
        let store = Store::new();
        let renders = Arc::new(AtomicUsize::new(0));
        let mut hook = store.use_state("count", json!(0));

        let renders_clone = renders.clone();
        hook.mount(move |_| {
            renders_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(hook.is_mounted());

        store.set_state("count", json!(5));
        assert_eq!(hook.value(), Some(json!(5)));
        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmounted_hook_stops_tracking() {
        let store = Store::new();
        let mut hook = store.use_state("count", json!(0));
        hook.mount(|_| {});
        assert_eq!(store.subscriber_count("count"), 1);

        hook.unmount();
        hook.unmount();
        assert_eq!(store.subscriber_count("count"), 0);

        store.set_state("count", json!(9));
        assert_eq!(hook.value(), Some(json!(0)));
    }

    #[test]
    fn mount_twice_installs_one_subscriber() {
        let store = Store::new();
        let mut hook = store.use_state("n", json!(0));

        hook.mount(|_| {});
        hook.mount(|_| {});

        assert_eq!(store.subscriber_count("n"), 1);
    }

    #[test]
    fn mount_picks_up_writes_made_before_mounting() {
        let store = Store::new();
        let mut hook = store.use_state("n", json!(0));

        store.set_state("n", json!(3));
        assert_eq!(hook.value(), Some(json!(0)));

        hook.mount(|_| {});
        assert_eq!(hook.value(), Some(json!(3)));
    }

    #[test]
    fn drop_removes_subscriber() {
        let store = Store::new();
        {
            let mut hook = store.use_state("n", json!(0));
            hook.mount(|_| {});
            assert_eq!(store.subscriber_count("n"), 1);
        }
        assert_eq!(store.subscriber_count("n"), 0);
    }
}
