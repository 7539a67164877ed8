//! Statehub Core
//!
//! This crate provides a key-addressed reactive value store with
//! publish/subscribe semantics. It implements:
//!
//! - A state registry mapping names to values and their subscribers
//! - Synchronous notification dispatch with stable subscriber snapshots
//! - Consumer bindings that deliver merge-style partial updates
//! - Auto-subscribing accessors for short-lived consumers
//! - Scoped stores for isolating independent state spaces
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `state`: The store, its registry, bindings, hooks and dispatch
//! - `config`: Store tunables, loadable from JSON
//! - `error`: Errors from typed access and configuration
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use statehub_core::{Consumer, StateBag, Store};
//!
//! let store = Store::new();
//! store.set_state("hello", json!(true));
//!
//! // Imperative consumer: bind, receive merge updates, unbind at teardown.
//! let bag = Arc::new(StateBag::new());
//! store.bind_states(&bag, &["hello"], None);
//! store.set_state("hello", json!(false));
//! assert_eq!(bag.get("hello"), Some(json!(false)));
//! store.unbind_states(bag.consumer_id(), None);
//!
//! // Functional consumer: the subscription goes away with the hook.
//! let mut hook = store.use_state("hello", json!(true));
//! hook.mount(|value| println!("hello is now {value}"));
//! hook.set(json!(true));
//! assert_eq!(hook.value(), Some(json!(true)));
//! ```

pub mod config;
pub mod error;
pub mod state;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use state::{
    Consumer, ConsumerId, EntryInfo, StateBag, StateHook, StateSetter, Store, StoreMap,
    Subscriber, SubscriberId, Subscription,
};
