//! Cache Statistics Module
//!
//! Hit/miss counters and the point-in-time snapshot returned by `get_stats`.

use std::time::{Duration, Instant};

const NANOS_PER_SEC: u128 = 1_000_000_000;

// == Counters ==
/// Lifetime counters of one cache instance. Reset only by `clear`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

// == Cache Stats ==
/// Snapshot of cache performance and contents.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Number of live entries
    pub total_entries: usize,
    /// Number of successful lookups
    pub total_hits: u64,
    /// Number of lookups that found nothing or an expired entry
    pub total_misses: u64,
    /// Hit rate in percent (0 when no lookups have been made)
    pub hit_rate: f64,
    /// Mean TTL across live entries (zero if empty)
    pub avg_ttl: Duration,
    /// Timestamp of the longest-lived entry
    pub oldest_entry: Option<Instant>,
    /// Timestamp of the most recently written entry
    pub newest_entry: Option<Instant>,
    /// Entries removed by LRU eviction
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
}

impl CacheStats {
    /// Builds a snapshot from counters and an iterator over live `(timestamp, ttl)` pairs.
    pub(crate) fn collect<I>(counters: Counters, entries: I) -> Self
    where
        I: IntoIterator<Item = (Instant, Duration)>,
    {
        let mut total_entries = 0usize;
        let mut ttl_nanos: u128 = 0;
        let mut oldest_entry: Option<Instant> = None;
        let mut newest_entry: Option<Instant> = None;

        for (timestamp, ttl) in entries {
            total_entries += 1;
            ttl_nanos += ttl.as_nanos();
            oldest_entry = Some(oldest_entry.map_or(timestamp, |t| t.min(timestamp)));
            newest_entry = Some(newest_entry.map_or(timestamp, |t| t.max(timestamp)));
        }

        let avg_ttl = if total_entries == 0 {
            Duration::ZERO
        } else {
            // The mean never exceeds the largest TTL, so it fits a Duration
            let avg = ttl_nanos / total_entries as u128;
            Duration::new((avg / NANOS_PER_SEC) as u64, (avg % NANOS_PER_SEC) as u32)
        };

        Self {
            total_entries,
            total_hits: counters.hits,
            total_misses: counters.misses,
            hit_rate: hit_rate(counters.hits, counters.misses),
            avg_ttl,
            oldest_entry,
            newest_entry,
            evictions: counters.evictions,
            expirations: counters.expirations,
        }
    }
}

// == Hit Rate ==
/// Returns `hits / (hits + misses) * 100`, or 0.0 if no requests have been made.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}
