//! Bus error types.

use std::time::Duration;

/// Errors returned by bus operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus has been closed. Subscribe and publish are rejected permanently.
    #[error("bus is closed")]
    Closed,

    /// Shutdown gave up waiting for delivery tasks to drain.
    ///
    /// Advisory only: delivery tasks are never killed, so handlers may still
    /// be running in the background when this is returned.
    #[error("shutdown deadline of {timeout:?} exceeded with delivery tasks still running")]
    DeadlineExceeded {
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The bus configuration is unusable.
    #[error("invalid bus configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_message_includes_timeout() {
        let err = BusError::DeadlineExceeded {
            timeout: Duration::from_millis(250),
        };
        assert!(err.to_string().contains("250ms"));
    }
}
