//! State Store
//!
//! This module implements the key-addressed reactive store: named states that
//! any number of consumers can read, write, and be notified about.
//!
//! # Concepts
//!
//! ## States
//!
//! A state is a string name mapped to a JSON value. Entries are created the
//! first time a name is referenced and are never removed; clearing a state
//! drops only its value, so existing subscribers keep listening.
//!
//! ## Subscribers
//!
//! A subscriber is a callback invoked with `(name, value)` after every write
//! to a state it is registered on. Subscribers are identified by
//! [`SubscriberId`]; registering the same one twice is a no-op.
//!
//! ## Consumers and bindings
//!
//! A consumer is a host-side unit with a local key/value bag. Binding it to
//! states installs one dispatcher per consumer that turns per-name
//! notifications into merge updates, optionally nested under a container key.
//!
//! ## Hooks
//!
//! A [`StateHook`] is the lightweight alternative for short-lived consumers: a
//! value, a setter, and a subscription removed automatically on drop.
//!
//! # Implementation Notes
//!
//! Dispatch is synchronous: `set_state` returns after every subscriber has
//! run. Locks are released before callbacks run, so subscribers can read and
//! write the store. Reentrant writes nest up to a configurable depth, beyond
//! which notifications are queued and drained by the outermost dispatch. The
//! depth is counted per thread, so concurrent writers never defer each other.

mod bag;
mod binding;
mod dispatch;
mod hook;
mod registry;
mod scope;
mod store;
mod subscriber;

pub use bag::StateBag;
pub use binding::{Consumer, ConsumerId};
pub use hook::{StateHook, StateSetter};
pub use registry::EntryInfo;
pub use scope::StoreMap;
pub use store::Store;
pub use subscriber::{Subscriber, SubscriberId, Subscription};
