//! Detached, best-effort click persistence.
//!
//! Each visit is written by its own task so the redirect response never waits
//! on storage. Failures and panics are logged and dropped.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{error, warn};

use crate::models::{ClickEvent, RequestContext, UtmParams};
use crate::storage::TenantStore;

pub struct ClickRecorder {
    /// Optional cap on concurrently running recordings
    limiter: Option<Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight count when the recording task ends, however it ends
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ClickRecorder {
    pub fn new(max_in_flight: Option<usize>) -> Self {
        Self {
            limiter: max_in_flight.map(|n| Arc::new(Semaphore::new(n.max(1)))),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// No cap on concurrent recordings
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Record a visit without waiting for it. Returns immediately.
    pub fn record(
        &self,
        store: Arc<dyn TenantStore>,
        link_id: &str,
        short_code: &str,
        destination_url: &str,
        context: RequestContext,
        utm: UtmParams,
    ) {
        let permit: Option<OwnedSemaphorePermit> = match &self.limiter {
            Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(short_code = %short_code, "click recorder saturated, dropping click");
                    return;
                }
            },
            None => None,
        };

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        let link_id = link_id.to_string();
        let short_code = short_code.to_string();
        let destination_url = destination_url.to_string();
        let log_code = short_code.clone();

        // The inner task does the work; the outer one observes it so that a
        // panic is logged instead of silently lost
        let work = tokio::spawn(async move {
            let event = ClickEvent::new(&link_id, &short_code, &destination_url, &context, utm);
            persist_click(store.as_ref(), &event).await
        });

        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;

            match work.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(short_code = %log_code, error = %format!("{err:#}"), "failed to record click");
                }
                Err(join_err) if join_err.is_panic() => {
                    error!(short_code = %log_code, "click recording panicked");
                }
                Err(join_err) => {
                    warn!(short_code = %log_code, error = %join_err, "click recording cancelled");
                }
            }
        });
    }

    /// Recordings started but not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait for pending recordings, up to `timeout`. Returns true when idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

impl Default for ClickRecorder {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Insert the click row, then bump the link counter. The counter is left
/// alone when the insert fails.
async fn persist_click(store: &dyn TenantStore, event: &ClickEvent) -> Result<()> {
    store
        .insert_click(event)
        .await
        .context("failed to insert click event")?;

    store
        .increment_click_counter(&event.link_id, event.timestamp / 1000)
        .await
        .context("failed to increment click counter")?;

    Ok(())
}
