//! Stored value type.

use super::Expiry;
use bytes::Bytes;

/// A value plus its expiration, as stored in the keyspace dict.
///
/// Payloads are binary-safe strings held by `Bytes`, so cloning an
/// entry bumps a refcount rather than copying data. Write paths replace
/// the stored entry instead of mutating a payload that may be shared
/// with a reader or with the slow log.
#[derive(Debug, Clone)]
pub struct StoredValue {
    /// The value payload
    pub value: Bytes,
    /// Expiration time
    pub expiry: Expiry,
}

impl StoredValue {
    /// Create a stored value without expiration.
    #[inline]
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expiry: Expiry::Never,
        }
    }

    /// Create a stored value with expiration.
    #[inline]
    pub fn with_expiry(value: Bytes, expiry: Expiry) -> Self {
        Self { value, expiry }
    }

    /// Check whether this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expiry.is_expired()
    }
}
