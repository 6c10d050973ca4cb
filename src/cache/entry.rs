//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

// == Cache Entry ==
/// Represents a single cache entry with value and access metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value
    pub data: T,
    /// Creation (or last overwrite) instant
    pub timestamp: Instant,
    /// Current time-to-live, possibly extended by adaptive TTL
    pub ttl: Duration,
    /// Number of hits since creation
    pub hits: u64,
    /// Instant of the last `set` or hit, used for LRU ranking
    pub last_access: Instant,
    /// Access sequence number, breaks ties between equal `last_access` instants
    pub(crate) access_seq: u64,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new entry stamped at `now`.
    pub fn new(data: T, ttl: Duration, now: Instant) -> Self {
        Self {
            data,
            timestamp: now,
            ttl,
            hits: 0,
            last_access: now,
            access_seq: 0,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is valid while `now - timestamp <= ttl`, so it is still
    /// returned at exactly the TTL boundary and expired strictly after it.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) > self.ttl
    }

    // == Time To Live ==
    /// Returns the time left before expiry, `Duration::ZERO` once expired.
    pub fn ttl_remaining(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.timestamp))
    }

    // == Record Hit ==
    /// Counts a hit and refreshes the recency stamp.
    pub(crate) fn touch(&mut self, now: Instant, seq: u64) {
        self.hits += 1;
        self.last_access = now;
        self.access_seq = seq;
    }

    /// Recency key for LRU ranking; smaller means less recently used.
    pub(crate) fn recency(&self) -> (Instant, u64) {
        (self.last_access, self.access_seq)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let now = Instant::now();
        let entry = CacheEntry::new("test_value", Duration::from_secs(60), now);

        assert_eq!(entry.data, "test_value");
        assert_eq!(entry.hits, 0);
        assert_eq!(entry.last_access, now);
        assert!(!entry.is_expired(now));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Instant::now();
        let entry = CacheEntry::new(1u32, Duration::from_millis(100), now);

        // Still valid at exactly the TTL
        assert!(!entry.is_expired(now + Duration::from_millis(100)));
        assert!(entry.is_expired(now + Duration::from_millis(101)));
    }

    #[test]
    fn test_ttl_remaining() {
        let now = Instant::now();
        let entry = CacheEntry::new(1u32, Duration::from_secs(10), now);

        assert_eq!(
            entry.ttl_remaining(now + Duration::from_secs(4)),
            Duration::from_secs(6)
        );
        assert_eq!(
            entry.ttl_remaining(now + Duration::from_secs(30)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_touch_updates_recency() {
        let now = Instant::now();
        let mut entry = CacheEntry::new(1u32, Duration::from_secs(10), now);
        let later = now + Duration::from_millis(5);

        entry.touch(later, 7);

        assert_eq!(entry.hits, 1);
        assert_eq!(entry.recency(), (later, 7));
    }
}
