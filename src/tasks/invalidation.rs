//! Change-event listener
//!
//! Invalidates every key of a cache that mentions a changed domain, so
//! cross-domain keys such as `payments:by_students:42` follow a `students`
//! change too.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::SharedCache;
use crate::events::ChangeEvent;

/// Spawns a listener that calls `invalidate_by_pattern(event.domain)` on
/// `cache` for every event on the bus. `domain` names the cache in logs.
///
/// If the receiver lags, the missed events are unknown and every entry is
/// dropped. The task ends when the bus closes or `shutdown` is cancelled.
pub fn spawn_invalidation_listener<T>(
    domain: impl Into<String>,
    cache: SharedCache<T>,
    mut events: broadcast::Receiver<ChangeEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
{
    let domain = domain.into();

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = events.recv() => received,
            };

            match received {
                Ok(event) => {
                    let removed = cache.write().await.invalidate_by_pattern(&event.domain);
                    if removed > 0 {
                        debug!(
                            domain = %domain,
                            changed = %event.domain,
                            removed,
                            "invalidated on change event"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Empty pattern matches every key
                    let removed = cache.write().await.invalidate_by_pattern("");
                    warn!(domain = %domain, skipped, removed, "change events missed, cache dropped");
                }
                Err(RecvError::Closed) => {
                    debug!(domain = %domain, "change bus closed");
                    break;
                }
            }
        }
    })
}
