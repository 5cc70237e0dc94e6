use thiserror::Error;

/// Core error types for fleetcache cache construction
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid expiry window: min {min_ms}ms is greater than max {max_ms}ms")]
    InvalidExpiryWindow { min_ms: u128, max_ms: u128 },

    #[error("Expiry window too long: max {max_secs}s exceeds the limit of {limit_secs}s")]
    ExpiryTooLong { max_secs: u64, limit_secs: u64 },
}

impl CoreError {
    /// Create a new InvalidExpiryWindow error
    pub fn invalid_expiry_window(min: std::time::Duration, max: std::time::Duration) -> Self {
        Self::InvalidExpiryWindow {
            min_ms: min.as_millis(),
            max_ms: max.as_millis(),
        }
    }

    /// Create a new ExpiryTooLong error
    pub fn expiry_too_long(max: std::time::Duration, limit: std::time::Duration) -> Self {
        Self::ExpiryTooLong {
            max_secs: max.as_secs(),
            limit_secs: limit.as_secs(),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_invalid_expiry_window_message() {
        let err = CoreError::invalid_expiry_window(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(
            err.to_string(),
            "Invalid expiry window: min 2000ms is greater than max 1000ms"
        );
    }

    #[test]
    fn test_expiry_too_long_message() {
        let err = CoreError::expiry_too_long(Duration::from_secs(20), Duration::from_secs(10));
        assert_eq!(
            err.to_string(),
            "Expiry window too long: max 20s exceeds the limit of 10s"
        );
    }
}
