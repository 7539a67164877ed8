//! Error types for the typed and configuration surfaces of the store.
//!
//! The store core never fails: unknown names read as absent and redundant
//! unbinds are no-ops. Errors only come from converting values to and from
//! Rust types, and from rejecting a bad configuration.

use thiserror::Error;

/// Errors returned by typed accessors and configuration loading.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A stored value could not be converted into the requested type.
    #[error("state `{name}` does not hold the requested type: {source}")]
    Deserialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A Rust value could not be converted into a state value.
    #[error("value for state `{name}` could not be serialized: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration text was not valid JSON for [`StoreConfig`](crate::StoreConfig).
    #[error("invalid store configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Configuration parsed but failed validation.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias for fallible store operations.
pub type StoreResult<T> = Result<T, StoreError>;
