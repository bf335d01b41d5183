//! Bus configuration.

use crate::error::BusError;

/// Default capacity of each subscription's delivery queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Configuration for a [`Bus`](crate::Bus).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Number of messages a subscription buffers before new ones are dropped.
    pub queue_capacity: usize,
}

impl BusConfig {
    /// Create a config with [`DEFAULT_QUEUE_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Override the per-subscription queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Check that the config can back a bus.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] if the queue capacity is zero.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.queue_capacity == 0 {
            return Err(BusError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        let config = BusConfig::default();
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_queue_capacity() {
        let config = BusConfig::new().with_queue_capacity(8);
        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn test_zero_capacity_is_invalid() {
        let err = BusConfig::new().with_queue_capacity(0).validate().unwrap_err();
        assert!(matches!(err, BusError::InvalidConfig(_)));
    }
}
