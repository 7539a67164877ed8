//! Subscriber types for the state store.
//!
//! A Subscriber is a callback invoked with `(name, value)` whenever a state it
//! is registered on changes. Subscribers are compared by identity: every
//! `Subscriber::new` mints a fresh [`SubscriberId`], and clones share it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use super::store::Store;

/// Unique identifier for a subscriber.
///
/// This is the subscription key: registering two subscribers with the same
/// ID on one state collapses them into a single subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

type NotifyFn = dyn Fn(&str, &Value) + Send + Sync;

/// A callback registered on one or more states.
///
/// Cloning is cheap and keeps the identity, so a clone can be used to
/// unsubscribe the original.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    notify: Arc<NotifyFn>,
}

impl Subscriber {
    /// Create a new subscriber with the given notification callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Arc::new(notify),
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Deliver a change notification.
    pub fn notify(&self, name: &str, value: &Value) {
        (self.notify)(name, value);
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

/// Guard returned by [`Store::watch`].
///
/// Dropping it unsubscribes the callback from its state.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    store: Store,
    name: String,
    subscriber: Subscriber,
}

impl Subscription {
    pub(crate) fn new(store: Store, name: String, subscriber: Subscriber) -> Self {
        Self {
            store,
            name,
            subscriber,
        }
    }

    /// The state this subscription listens to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identity of the installed subscriber.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber.id()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.unsubscribe(&self.name, &self.subscriber);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("subscriber", &self.subscriber.id)
            .finish()
    }
}
