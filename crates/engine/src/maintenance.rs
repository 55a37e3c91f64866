//! Periodic background work owned by the engine.

use crate::advertiser::AdvertisementPublisher;
use crate::cache::AdaptiveCache;
use crate::verifier::IntegrityVerifier;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run `iteration` every `period` until `cancel` fires.
///
/// The first run happens one full period after start.
fn spawn_periodic<F, Fut>(
    task: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut iteration: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        info!(task, interval_secs = period.as_secs_f64(), "background task started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(task, "background task shutting down");
                    break;
                }
                _ = ticker.tick() => iteration().await,
            }
        }
    })
}

pub(crate) fn spawn_cache_sweep(
    cache: Arc<AdaptiveCache>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    spawn_periodic("cache-sweep", period, cancel, move || {
        let cache = Arc::clone(&cache);
        async move {
            let purged = cache.sweep_expired().await;
            if purged == 0 {
                debug!("cache sweep: nothing expired");
            }
        }
    })
}

pub(crate) fn spawn_advertisement_expiry(
    publisher: Arc<AdvertisementPublisher>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    spawn_periodic("advertisement-expiry", period, cancel, move || {
        let publisher = Arc::clone(&publisher);
        async move {
            if let Err(e) = publisher.expire_stale().await {
                warn!(error = %e, "advertisement expiry sweep failed");
            }
        }
    })
}

pub(crate) fn spawn_verification_pass(
    verifier: Arc<IntegrityVerifier>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    spawn_periodic("verification-pass", period, cancel, move || {
        let verifier = Arc::clone(&verifier);
        async move {
            if let Err(e) = verifier.verify_due().await {
                warn!(error = %e, "periodic verification pass failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn periodic_task_runs_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let counter = Arc::clone(&runs);
        let handle = spawn_periodic("test", Duration::from_millis(10), cancel.clone(), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }
}
