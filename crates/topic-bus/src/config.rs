//! Bus configuration.
//!
//! # Example
//!
//! ```ignore
//! use topic_bus::BusConfig;
//!
//! let config = BusConfig::default().with_queue_capacity(64);
//! config.validate()?;
//! ```

use crate::error::ConfigError;
use crate::{DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY, QUEUE_CAPACITY_ENV};
use serde::{Deserialize, Serialize};
use std::env;

/// Configuration for a [`Bus`](crate::Bus).
///
/// - `queue_capacity = 0`: synchronous hand-off. A delivery completes only
///   once the reader has taken the event.
/// - `queue_capacity = n`: up to `n` events are buffered per subscriber before
///   that subscriber's delivery tasks wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Per-subscriber queue capacity.
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl BusConfig {
    /// Create a validated configuration.
    pub fn new(queue_capacity: usize) -> Result<Self, ConfigError> {
        let config = Self { queue_capacity };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TOPIC_BUS_QUEUE_CAPACITY`: per-subscriber queue capacity (default: 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(QUEUE_CAPACITY_ENV) {
            Ok(raw) => Self::from_raw(&raw),
            Err(_) => Ok(Self::default()),
        }
    }

    fn from_raw(raw: &str) -> Result<Self, ConfigError> {
        let queue_capacity = raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidQueueCapacity {
                value: raw.to_string(),
            })?;
        Self::new(queue_capacity)
    }

    /// Validate configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::QueueCapacityTooLarge {
                capacity: self.queue_capacity,
                max: MAX_QUEUE_CAPACITY,
            });
        }
        Ok(())
    }

    /// Builder-style method to set the queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// True when deliveries hand events off synchronously.
    #[inline]
    pub fn is_handoff(&self) -> bool {
        self.queue_capacity == 0
    }

    /// Capacity of the underlying channel (tokio mpsc needs at least one slot).
    #[inline]
    pub fn channel_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}
