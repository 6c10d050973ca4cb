//! Background Tasks Module
//!
//! Deferred work attached to a cache. Every task selects on a
//! `CancellationToken` so teardown stops it deterministically.
//!
//! # Tasks
//! - TTL Sweep: removes expired entries at a fixed interval
//! - Invalidation: drops a domain's entries when a change event arrives

mod invalidation;
mod sweep;

pub use invalidation::spawn_invalidation_listener;
pub use sweep::{spawn_sweep_task, DEFAULT_SWEEP_INTERVAL};
