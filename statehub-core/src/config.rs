//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Default number of nested dispatch levels before notifications are queued.
pub const DEFAULT_MAX_DISPATCH_DEPTH: usize = 32;

/// Tunables for a [`Store`](crate::Store).
///
/// Missing fields fall back to their defaults when deserializing, so an empty
/// JSON object is a valid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How many dispatches may be nested (a subscriber writing a state, whose
    /// subscriber writes a state, ...) before further notifications are
    /// deferred to the outermost dispatch.
    pub max_dispatch_depth: usize,
}

impl StoreConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json(text: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the maximum dispatch depth.
    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.max_dispatch_depth == 0 {
            return Err(StoreError::InvalidConfig(
                "max_dispatch_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let config = StoreConfig::from_json("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.max_dispatch_depth, DEFAULT_MAX_DISPATCH_DEPTH);
    }

    #[test]
    fn parses_depth() {
        let config = StoreConfig::from_json(r#"{"max_dispatch_depth": 4}"#).unwrap();
        assert_eq!(config.max_dispatch_depth, 4);
    }

    #[test]
    fn rejects_zero_depth() {
        let err = StoreConfig::from_json(r#"{"max_dispatch_depth": 0}"#).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));

        assert!(StoreConfig::default().with_max_dispatch_depth(0).validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = StoreConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, StoreError::ConfigParse(_)));
    }
}
