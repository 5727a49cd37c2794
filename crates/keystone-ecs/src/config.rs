//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::EcsError;

/// Rows per archetype chunk when nothing else is configured.
pub const DEFAULT_CHUNK_CAPACITY: usize = 64;

/// Largest accepted chunk capacity. Every column of a chunk is allocated
/// at full capacity up front.
pub const MAX_CHUNK_CAPACITY: usize = 1 << 16;

/// Construction parameters for a [`Store`](crate::store::Store).
///
/// Missing fields fall back to their defaults when deserializing:
///
/// ```
/// use keystone_ecs::config::StoreConfig;
///
/// let config = StoreConfig::from_json(r#"{ "name": "overworld" }"#).unwrap();
/// assert_eq!(config.name, "overworld");
/// assert_eq!(config.chunk_capacity, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name used in log fields.
    pub name: String,
    /// Rows per archetype chunk. Must be a non-zero power of two no larger
    /// than [`MAX_CHUNK_CAPACITY`].
    pub chunk_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_owned(),
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Default configuration with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Override the chunk capacity.
    pub fn with_chunk_capacity(mut self, chunk_capacity: usize) -> Self {
        self.chunk_capacity = chunk_capacity;
        self
    }

    /// Check the invariants [`Store::new`](crate::store::Store::new) relies on.
    pub fn validate(&self) -> Result<(), EcsError> {
        if !self.chunk_capacity.is_power_of_two() {
            return Err(EcsError::InvalidConfig {
                reason: format!(
                    "chunk_capacity must be a non-zero power of two, got {}",
                    self.chunk_capacity
                ),
            });
        }
        if self.chunk_capacity > MAX_CHUNK_CAPACITY {
            return Err(EcsError::InvalidConfig {
                reason: format!(
                    "chunk_capacity {} exceeds the maximum of {MAX_CHUNK_CAPACITY}",
                    self.chunk_capacity
                ),
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, EcsError> {
        let config: Self = serde_json::from_str(json).map_err(|e| EcsError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}
