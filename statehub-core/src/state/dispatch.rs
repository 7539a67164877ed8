//! Notification Dispatch
//!
//! A write to a state synchronously fans out to every subscriber of that
//! state. Three rules shape the fan-out:
//!
//! 1. The subscriber list is snapshotted when a name's dispatch starts, so a
//!    subscriber added during the dispatch is not called by it.
//!
//! 2. Each snapshot member is re-checked against the live subscriber set right
//!    before it is called. Once unsubscribed, a subscriber receives nothing
//!    more, even mid-dispatch.
//!
//! 3. Reentrant writes (a subscriber calling `set_state`) dispatch
//!    synchronously until the calling thread's dispatch depth for that store
//!    reaches `max_dispatch_depth`. Past that, the write is applied
//!    immediately but its notification is queued and drained by the outermost
//!    dispatch before it returns. This keeps the call stack bounded for cyclic
//!    update graphs.
//!
//! Depth and the deferred queue live in a thread-local map keyed by store, so
//! writes from another thread never count against this thread's limit and a
//! queued notification is always drained by the thread that queued it.
//!
//! No store lock is held while a subscriber runs.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tracing::{trace, warn};

use super::registry::SubscriberSnapshot;
use super::store::Store;

thread_local! {
    static DISPATCH: RefCell<HashMap<usize, DispatchState>> = RefCell::new(HashMap::new());
}

/// A notification postponed by the depth guard.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingNotification {
    pub name: String,
    /// `None` means the entry's value is read when the notification is
    /// delivered, which is how batch dispatch works.
    pub value: Option<Value>,
}

/// Dispatch bookkeeping for one store on one thread.
#[derive(Debug, Default)]
pub(crate) struct DispatchState {
    depth: usize,
    deferred: VecDeque<PendingNotification>,
}

#[cfg(test)]
impl DispatchState {
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }
}

fn with_state<R>(key: usize, f: impl FnOnce(&mut DispatchState) -> R) -> R {
    DISPATCH.with(|cell| f(cell.borrow_mut().entry(key).or_default()))
}

/// Guard that keeps the dispatch depth raised while it is alive.
///
/// The depth is lowered on drop, so it stays balanced even if a subscriber
/// panics. Dropping the outermost guard discards the store's entry for this
/// thread, including anything left queued by a dispatch that unwound.
pub(crate) struct DispatchGuard {
    key: usize,
    outermost: bool,
}

impl DispatchGuard {
    /// Enter a dispatch level. Returns `None` when this thread is already
    /// `max_depth` levels deep in the store identified by `key`.
    pub fn enter(key: usize, max_depth: usize) -> Option<Self> {
        with_state(key, |state| {
            if state.depth >= max_depth {
                return None;
            }
            state.depth += 1;
            Some(Self {
                key,
                outermost: state.depth == 1,
            })
        })
    }

    pub fn is_outermost(&self) -> bool {
        self.outermost
    }

    fn pop_deferred(&self) -> Option<PendingNotification> {
        with_state(self.key, |state| state.deferred.pop_front())
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        let dropped = DISPATCH
            .try_with(|cell| {
                let mut states = cell.borrow_mut();
                if self.outermost {
                    states
                        .remove(&self.key)
                        .map_or(0, |state| state.deferred.len())
                } else {
                    if let Some(state) = states.get_mut(&self.key) {
                        state.depth = state.depth.saturating_sub(1);
                    }
                    0
                }
            })
            .unwrap_or(0);

        if dropped > 0 {
            warn!(dropped, "dispatch unwound, discarding deferred notifications");
        }
    }
}

impl Store {
    /// Fan out `(name, value)` to the current subscribers of `name`.
    pub(crate) fn notify(&self, name: &str, value: Value) {
        let Some(guard) = self.enter_dispatch() else {
            self.defer(name, Some(value));
            return;
        };

        let snapshot = self.snapshot(name);
        self.deliver(name, &value, snapshot);

        if guard.is_outermost() {
            self.drain(&guard);
        }
    }

    /// Fan out a batch of already-applied writes, one name at a time.
    ///
    /// Each name is dispatched with the value its entry holds when that name's
    /// turn comes, so a reentrant write made earlier in the batch is what later
    /// subscribers see. Names deferred by the depth guard follow the same rule.
    pub(crate) fn notify_batch(&self, names: Vec<String>) {
        let Some(guard) = self.enter_dispatch() else {
            for name in names {
                self.defer(&name, None);
            }
            return;
        };

        for name in names {
            if let Some((value, snapshot)) = self.current(&name) {
                self.deliver(&name, &value, snapshot);
            }
        }

        if guard.is_outermost() {
            self.drain(&guard);
        }
    }

    fn dispatch_key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn enter_dispatch(&self) -> Option<DispatchGuard> {
        DispatchGuard::enter(self.dispatch_key(), self.inner.config.max_dispatch_depth)
    }

    fn snapshot(&self, name: &str) -> SubscriberSnapshot {
        self.inner
            .registry
            .lock()
            .get(name)
            .map(|entry| entry.snapshot_subscribers())
            .unwrap_or_default()
    }

    /// The entry's value (`Null` when cleared) and a subscriber snapshot,
    /// read under one lock.
    fn current(&self, name: &str) -> Option<(Value, SubscriberSnapshot)> {
        let registry = self.inner.registry.lock();
        let entry = registry.get(name)?;
        Some((
            entry.value().cloned().unwrap_or(Value::Null),
            entry.snapshot_subscribers(),
        ))
    }

    fn deliver(&self, name: &str, value: &Value, snapshot: SubscriberSnapshot) {
        trace!(state = name, subscribers = snapshot.len(), "dispatching");

        for subscriber in snapshot {
            let still_subscribed = self
                .inner
                .registry
                .lock()
                .get(name)
                .is_some_and(|entry| entry.has_subscriber(subscriber.id()));

            if !still_subscribed {
                trace!(
                    state = name,
                    subscriber = subscriber.id().raw(),
                    "skipping removed subscriber"
                );
                continue;
            }

            subscriber.notify(name, value);
        }
    }

    fn defer(&self, name: &str, value: Option<Value>) {
        let first = with_state(self.dispatch_key(), |state| {
            state.deferred.push_back(PendingNotification {
                name: name.to_string(),
                value,
            });
            state.deferred.len() == 1
        });

        if first {
            warn!(
                state = name,
                max_depth = self.inner.config.max_dispatch_depth,
                "dispatch depth limit reached, deferring notifications"
            );
        }
    }

    /// Deliver queued notifications while the outermost guard is held.
    ///
    /// Writes made by drained subscribers nest from depth 1 again and may
    /// queue more work, which this loop picks up.
    fn drain(&self, guard: &DispatchGuard) {
        while let Some(pending) = guard.pop_deferred() {
            match pending.value {
                Some(value) => {
                    let snapshot = self.snapshot(&pending.name);
                    self.deliver(&pending.name, &value, snapshot);
                }
                None => {
                    if let Some((value, snapshot)) = self.current(&pending.name) {
                        self.deliver(&pending.name, &value, snapshot);
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn dispatch_depth(&self) -> usize {
        DISPATCH.with(|cell| {
            cell.borrow()
                .get(&self.dispatch_key())
                .map_or(0, DispatchState::depth)
        })
    }

    #[cfg(test)]
    pub(crate) fn has_dispatch_state(&self) -> bool {
        DISPATCH.with(|cell| cell.borrow().contains_key(&self.dispatch_key()))
    }
}
