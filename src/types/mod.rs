//! Core tessera types.
//!
//! Values are binary-safe byte strings shared by cheap refcounted
//! handles (`Bytes`); the transactional core is agnostic to what the
//! payloads mean.

mod key;
mod value;

pub use key::Key;
pub use value::StoredValue;

/// Database index type.
pub type DbIndex = u16;

/// Timestamp in milliseconds since Unix epoch.
pub type Timestamp = i64;

/// Get current timestamp in milliseconds.
#[inline]
#[must_use]
pub fn current_timestamp_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

/// Get current timestamp in seconds.
#[inline]
#[must_use]
pub fn current_timestamp_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Expiration time representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// No expiration
    #[default]
    Never,
    /// Expire at specific timestamp (milliseconds since epoch)
    At(Timestamp),
}

impl Expiry {
    /// Create expiry from TTL in seconds. A TTL of 0 expires immediately.
    #[must_use]
    pub fn from_seconds(seconds: i64) -> Self {
        Self::from_millis(seconds.saturating_mul(1000))
    }

    /// Create expiry from TTL in milliseconds. A TTL of 0 expires immediately.
    #[must_use]
    pub fn from_millis(millis: i64) -> Self {
        if millis < 0 {
            // Negative values are rejected by the caller
            Self::Never
        } else {
            Self::At(current_timestamp_ms().saturating_add(millis))
        }
    }

    /// Check if this expiry has passed.
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self {
            Self::Never => false,
            Self::At(ts) => current_timestamp_ms() >= *ts,
        }
    }

    /// Get remaining TTL in milliseconds, or None if no expiry.
    #[must_use]
    pub fn ttl_millis(&self) -> Option<i64> {
        match self {
            Self::Never => None,
            Self::At(ts) => Some(ts.saturating_sub(current_timestamp_ms()).max(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_from_seconds() {
        let expiry = Expiry::from_seconds(10);
        assert!(!expiry.is_expired());
        let ttl = expiry.ttl_millis().unwrap();
        assert!(ttl > 9_000 && ttl <= 10_000);
    }

    #[test]
    fn test_expiry_never() {
        let expiry = Expiry::Never;
        assert!(!expiry.is_expired());
        assert!(expiry.ttl_millis().is_none());
    }

    #[test]
    fn test_expiry_past() {
        let expiry = Expiry::At(0);
        assert!(expiry.is_expired());
        assert_eq!(expiry.ttl_millis(), Some(0));
    }
}
