//! Copying content between locations.
//!
//! Jobs live in the metadata store. Every state change is a compare-and-set
//! on the job's current status, so a worker that finishes after its job was
//! cancelled cannot overwrite the cancellation.

use crate::error::{EngineError, EngineResult};
use crate::metrics;
use crate::registry::LocationRegistry;
use crate::transport::LocationTransport;
use dashmap::DashMap;
use hoard_core::config::ReplicationConfig;
use hoard_core::replication::validate_priority;
use hoard_core::{ContentAddress, JobStatus, LocationKind, LocationRef, ReplicationJob, RetryDecision};
use hoard_metadata::MetadataStore;
use hoard_metadata::models::ReplicationJobRow;
use hoard_metadata::repos::{ContentRepo, ReplicationRepo};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

/// Progress recorded once the source copy has been fetched and checked.
const PROGRESS_FETCHED: i64 = 50;

enum Attempt {
    Transferred { bytes: u64, location: LocationRef },
    Failed(String),
    Interrupted,
}

/// Schedules replication jobs and runs them on a bounded worker pool.
pub struct ReplicationCoordinator {
    metadata: Arc<dyn MetadataStore>,
    transport: Arc<dyn LocationTransport>,
    registry: Arc<LocationRegistry>,
    config: ReplicationConfig,
    running: DashMap<Uuid, CancellationToken>,
    permits: Arc<Semaphore>,
    wake: Notify,
    shutdown: CancellationToken,
}

impl ReplicationCoordinator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        transport: Arc<dyn LocationTransport>,
        registry: Arc<LocationRegistry>,
        config: ReplicationConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let workers = config.max_concurrent_jobs.max(1);
        Self {
            metadata,
            transport,
            registry,
            config,
            running: DashMap::new(),
            permits: Arc::new(Semaphore::new(workers)),
            wake: Notify::new(),
            shutdown,
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Enqueue a copy of `hash` from `source` to `target`.
    #[instrument(skip(self, hash), fields(hash = %hash, %source, %target))]
    pub async fn schedule(
        &self,
        hash: &ContentAddress,
        source: LocationKind,
        target: LocationKind,
        priority: u8,
    ) -> EngineResult<ReplicationJob> {
        if source == target {
            return Err(EngineError::InvalidReplicationTarget(format!(
                "source and target are both {source}"
            )));
        }
        let priority = validate_priority(priority)?;

        let key = hash.to_string();
        if self.metadata.get_content(&key).await?.is_none() {
            return Err(EngineError::ContentNotFound(key));
        }

        let job = ReplicationJob::new(*hash, source, target, priority, self.config.max_retries);
        self.metadata
            .create_job(&ReplicationJobRow::from(&job))
            .await?;
        self.metadata
            .set_replication_status(&key, target.as_str(), JobStatus::Pending.as_str(), job.enqueued_at)
            .await?;

        tracing::info!(job_id = %job.job_id, priority, "replication job scheduled");
        self.refresh_queue_depth().await;
        self.wake.notify_one();
        Ok(job)
    }

    /// Schedule unless `target` already holds a copy or has an open job.
    pub async fn schedule_if_missing(
        &self,
        hash: &ContentAddress,
        source: LocationKind,
        target: LocationKind,
        priority: u8,
    ) -> EngineResult<Option<ReplicationJob>> {
        if self.registry.location(hash, target).await?.is_some() {
            return Ok(None);
        }
        if self
            .metadata
            .has_open_job(&hash.to_string(), target.as_str())
            .await?
        {
            return Ok(None);
        }
        self.schedule(hash, source, target, priority).await.map(Some)
    }

    /// Cancel a pending or in-progress job.
    ///
    /// Returns `false` if the job had already reached a terminal state.
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: Uuid) -> EngineResult<bool> {
        let row = self
            .metadata
            .get_job(job_id)
            .await?
            .ok_or(EngineError::JobNotFound(job_id))?;

        let now = OffsetDateTime::now_utc();
        let cancelled = self.metadata.cancel_job(job_id, now).await?;
        if let Some(token) = self.running.get(&job_id) {
            token.value().cancel();
        }

        if cancelled {
            self.metadata
                .set_replication_status(&row.content_hash, &row.target, JobStatus::Cancelled.as_str(), now)
                .await?;
            metrics::record_replication("cancelled");
            tracing::info!("replication job cancelled");
            self.refresh_queue_depth().await;
        }
        Ok(cancelled)
    }

    pub async fn job(&self, job_id: Uuid) -> EngineResult<ReplicationJob> {
        let row = self
            .metadata
            .get_job(job_id)
            .await?
            .ok_or(EngineError::JobNotFound(job_id))?;
        Ok(ReplicationJob::try_from(row)?)
    }

    pub async fn jobs_for(&self, hash: &ContentAddress) -> EngineResult<Vec<ReplicationJob>> {
        self.metadata
            .jobs_for_content(&hash.to_string())
            .await?
            .into_iter()
            .map(|row| ReplicationJob::try_from(row).map_err(EngineError::from))
            .collect()
    }

    /// Job counts per status.
    pub async fn status_counts(&self) -> EngineResult<Vec<(JobStatus, u64)>> {
        self.metadata
            .count_jobs_by_status()
            .await?
            .into_iter()
            .map(|(status, n)| -> EngineResult<(JobStatus, u64)> {
                Ok((status.parse::<JobStatus>()?, n))
            })
            .collect()
    }

    /// Run every currently eligible job to a settled state and return how
    /// many attempts were made.
    ///
    /// Retries whose backoff has already elapsed are picked up in the same
    /// call; later ones are left pending. Workers run as their own tasks so
    /// they keep making progress while the next claim waits for a
    /// connection.
    pub async fn run_once(self: &Arc<Self>) -> EngineResult<usize> {
        let limit = self.config.max_concurrent_jobs.max(1);
        let mut workers = JoinSet::new();
        let mut attempts = 0;

        loop {
            while workers.len() < limit {
                match self.metadata.claim_next_job(OffsetDateTime::now_utc()).await? {
                    Some(row) => {
                        let this = Arc::clone(self);
                        workers.spawn(async move { this.execute(row).await });
                    }
                    None => break,
                }
            }
            match workers.join_next().await {
                Some(joined) => {
                    joined.map_err(|e| {
                        EngineError::IoFailure(format!("replication worker failed: {e}"))
                    })??;
                    attempts += 1;
                }
                None => break,
            }
        }
        Ok(attempts)
    }

    /// Start the background dispatcher.
    ///
    /// It requeues jobs abandoned by a previous process, then claims work
    /// whenever a job is scheduled or the poll interval elapses. On shutdown
    /// it waits for running workers to put their jobs back.
    pub fn spawn_dispatcher(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self.metadata.requeue_abandoned_jobs().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(count = n, "requeued abandoned replication jobs"),
                Err(e) => tracing::warn!(error = %e, "failed to requeue abandoned replication jobs"),
            }

            let mut ticker = interval(self.config.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = self.wake.notified() => {}
                    _ = ticker.tick() => {}
                }
                self.dispatch_ready().await;
            }

            let workers = u32::try_from(self.config.max_concurrent_jobs.max(1)).unwrap_or(u32::MAX);
            let _drained = self.permits.acquire_many(workers).await;
            tracing::info!("replication dispatcher stopped");
        })
    }

    async fn dispatch_ready(self: &Arc<Self>) {
        loop {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                break;
            };
            let row = match self.metadata.claim_next_job(OffsetDateTime::now_utc()).await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to claim replication job");
                    break;
                }
            };

            let this = Arc::clone(self);
            tokio::spawn(async move {
                let _permit = permit;
                let job_id = row.job_id;
                if let Err(e) = this.execute(row).await {
                    tracing::warn!(%job_id, error = %e, "failed to settle replication job");
                }
            });
        }
    }

    /// Run one claimed job and record its outcome.
    async fn execute(&self, row: ReplicationJobRow) -> EngineResult<()> {
        let job = ReplicationJob::try_from(row)?;
        let token = self.shutdown.child_token();
        self.running.insert(job.job_id, token.clone());

        let attempt = tokio::select! {
            _ = token.cancelled() => Attempt::Interrupted,
            result = self.transfer(&job) => match result {
                Ok((bytes, location)) => Attempt::Transferred { bytes, location },
                Err(message) => Attempt::Failed(message),
            },
        };

        self.running.remove(&job.job_id);
        let settled = self.settle(&job, attempt).await;
        self.refresh_queue_depth().await;
        settled
    }

    /// Fetch from the source, check the hash, and put to the target.
    #[instrument(skip(self, job), fields(job_id = %job.job_id, hash = %job.content_hash))]
    async fn transfer(&self, job: &ReplicationJob) -> Result<(u64, LocationRef), String> {
        let source = self
            .registry
            .location(&job.content_hash, job.source)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("no {} copy is registered", job.source))?;

        let data = self
            .transport
            .fetch(&source.location_ref(), &job.content_hash)
            .await
            .map_err(|e| format!("fetch from {}: {e}", job.source))?;
        let actual = ContentAddress::compute(&data);
        if actual != job.content_hash {
            return Err(format!("{} copy is corrupt: got {actual}", job.source));
        }
        let bytes = data.len() as u64;

        if let Err(e) = self
            .metadata
            .update_job_progress(job.job_id, PROGRESS_FETCHED, 0)
            .await
        {
            tracing::debug!(error = %e, "failed to record replication progress");
        }

        let placed = self
            .transport
            .put(job.target, &job.content_hash, data)
            .await
            .map_err(|e| format!("put to {}: {e}", job.target))?;

        if self.config.verify_after_put {
            let digest = self
                .transport
                .digest(&placed, &job.content_hash)
                .await
                .map_err(|e| format!("read back from {}: {e}", job.target))?;
            if digest != job.content_hash {
                return Err(format!("{} copy does not match: got {digest}", job.target));
            }
        }
        Ok((bytes, placed))
    }

    async fn settle(&self, job: &ReplicationJob, attempt: Attempt) -> EngineResult<()> {
        let now = OffsetDateTime::now_utc();
        let key = job.content_hash.to_string();
        let target = job.target.as_str();

        match attempt {
            Attempt::Transferred { bytes, location } => {
                let recorded = self
                    .metadata
                    .complete_job(job.job_id, i64::try_from(bytes).unwrap_or(i64::MAX), now)
                    .await?;
                if !recorded {
                    tracing::debug!(job_id = %job.job_id, "job left in_progress before completion; discarding result");
                    return Ok(());
                }
                self.registry
                    .register_location(&job.content_hash, &location)
                    .await?;
                self.metadata
                    .set_replication_status(&key, target, JobStatus::Completed.as_str(), now)
                    .await?;
                metrics::record_replication("completed");
                tracing::info!(job_id = %job.job_id, hash = %job.content_hash, %target, bytes, "replication completed");
            }
            Attempt::Failed(message) => {
                tracing::warn!(
                    job_id = %job.job_id,
                    hash = %job.content_hash,
                    %target,
                    retry_count = job.retry_count,
                    error = %message,
                    "replication attempt failed"
                );
                match job.after_failure(self.config.backoff_base(), now) {
                    RetryDecision::Retry {
                        retry_count,
                        not_before,
                    } => {
                        if self
                            .metadata
                            .retry_job(job.job_id, i64::from(retry_count), not_before, &message)
                            .await?
                        {
                            metrics::record_replication("retried");
                        }
                    }
                    RetryDecision::GiveUp { retry_count } => {
                        if self
                            .metadata
                            .fail_job(job.job_id, i64::from(retry_count), &message, now)
                            .await?
                        {
                            self.registry
                                .remove_location(&job.content_hash, job.target)
                                .await?;
                            self.metadata
                                .set_replication_status(&key, target, JobStatus::Failed.as_str(), now)
                                .await?;
                            metrics::record_replication("failed");
                            tracing::warn!(job_id = %job.job_id, retry_count, "replication job failed permanently");
                        }
                    }
                }
            }
            Attempt::Interrupted => {
                // Cancelled jobs are no longer in_progress, so only shutdown
                // interruptions are put back.
                if self
                    .metadata
                    .retry_job(job.job_id, i64::from(job.retry_count), now, "interrupted by shutdown")
                    .await?
                {
                    tracing::debug!(job_id = %job.job_id, "replication job requeued after shutdown");
                }
            }
        }
        Ok(())
    }

    async fn refresh_queue_depth(&self) {
        match self.metadata.count_jobs_by_status().await {
            Ok(counts) => {
                let open: u64 = counts
                    .iter()
                    .filter(|(status, _)| status == "pending" || status == "in_progress")
                    .map(|(_, n)| *n)
                    .sum();
                metrics::REPLICATION_QUEUE_DEPTH.set(i64::try_from(open).unwrap_or(i64::MAX));
            }
            Err(e) => tracing::debug!(error = %e, "failed to refresh replication queue depth"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ObjectStoreTransport;
    use bytes::Bytes;
    use hoard_core::config::LocationsConfig;
    use hoard_core::{ContentRecord, StorageTier};
    use hoard_metadata::SqliteStore;
    use hoard_metadata::models::ContentRow;
    use hoard_storage::{FilesystemBackend, ObjectStore};
    use std::time::Duration;

    struct Fixture {
        coordinator: Arc<ReplicationCoordinator>,
        registry: Arc<LocationRegistry>,
        store: Arc<SqliteStore>,
        hash: ContentAddress,
        _temp: tempfile::TempDir,
    }

    async fn fixture(backoff_base_ms: u64) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::new(temp.path().join("m.db"), None).await.unwrap());

        let data = Bytes::from_static(b"replicate me");
        let hash = ContentAddress::compute(&data);
        let local = FilesystemBackend::new(temp.path().join("local")).await.unwrap();
        local.put(&hash.object_key(), data.clone()).await.unwrap();
        let cdn = FilesystemBackend::new(temp.path().join("cdn")).await.unwrap();
        let overlay = FilesystemBackend::new(temp.path().join("overlay")).await.unwrap();
        // Object store is left unconfigured so jobs targeting it fail.
        let transport = ObjectStoreTransport::new(LocationsConfig::default())
            .with_store(LocationKind::Local, Arc::new(local))
            .with_store(LocationKind::Cdn, Arc::new(cdn))
            .with_store(LocationKind::OverlayResolution, Arc::new(overlay));

        let record = ContentRecord::new(hash, data.len() as u64, "text/plain", StorageTier::Hot);
        store
            .insert_content(&ContentRow::from_record(&record).unwrap())
            .await
            .unwrap();
        let registry = Arc::new(LocationRegistry::new(store.clone(), LocationsConfig::default(), 20));
        let local_ref = LocationRef::new(LocationKind::Local, registry.url_for(LocationKind::Local, &hash));
        registry.register_location(&hash, &local_ref).await.unwrap();

        let config = ReplicationConfig {
            backoff_base_ms,
            ..ReplicationConfig::default()
        };
        let coordinator = Arc::new(ReplicationCoordinator::new(
            store.clone(),
            Arc::new(transport),
            registry.clone(),
            config,
            CancellationToken::new(),
        ));
        Fixture {
            coordinator,
            registry,
            store,
            hash,
            _temp: temp,
        }
    }

    #[tokio::test]
    async fn same_source_and_target_is_rejected() {
        let f = fixture(0).await;
        let err = f
            .coordinator
            .schedule(&f.hash, LocationKind::Cdn, LocationKind::Cdn, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidReplicationTarget(_)));
    }

    #[tokio::test]
    async fn out_of_range_priority_is_rejected() {
        let f = fixture(0).await;
        for priority in [0, 11] {
            let err = f
                .coordinator
                .schedule(&f.hash, LocationKind::Local, LocationKind::Cdn, priority)
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Invalid(_)));
        }
    }

    #[tokio::test]
    async fn unknown_content_is_not_scheduled() {
        let f = fixture(0).await;
        let other = ContentAddress::compute(b"never stored");
        let err = f
            .coordinator
            .schedule(&other, LocationKind::Local, LocationKind::Cdn, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ContentNotFound(_)));
    }

    #[tokio::test]
    async fn run_once_completes_and_registers_target() {
        let f = fixture(0).await;
        let job = f
            .coordinator
            .schedule(&f.hash, LocationKind::Local, LocationKind::Cdn, 5)
            .await
            .unwrap();

        assert_eq!(f.coordinator.run_once().await.unwrap(), 1);

        let job = f.coordinator.job(job.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.bytes_replicated, 12);
        assert!(job.completed_at.is_some());
        assert!(f.registry.location(&f.hash, LocationKind::Cdn).await.unwrap().is_some());

        let statuses = f.store.replication_statuses(&f.hash.to_string()).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, "completed");
    }

    #[tokio::test]
    async fn run_once_drains_a_queue_wider_than_one_claim() {
        let f = fixture(0).await;
        let mut jobs = Vec::new();
        for target in [
            LocationKind::Cdn,
            LocationKind::OverlayResolution,
            LocationKind::ObjectStore,
        ] {
            let job = f
                .coordinator
                .schedule(&f.hash, LocationKind::Local, target, 5)
                .await
                .unwrap();
            jobs.push(job.job_id);
        }

        let attempts = tokio::time::timeout(Duration::from_secs(10), f.coordinator.run_once())
            .await
            .expect("run_once finished")
            .unwrap();
        // Two transfers succeed, the unconfigured object store uses all three tries.
        assert_eq!(attempts, 5);

        let mut statuses = Vec::new();
        for job_id in jobs {
            statuses.push(f.coordinator.job(job_id).await.unwrap().status);
        }
        assert_eq!(
            statuses,
            vec![JobStatus::Completed, JobStatus::Completed, JobStatus::Failed]
        );
    }

    #[tokio::test]
    async fn failures_stop_at_max_retries() {
        let f = fixture(0).await;
        let job = f
            .coordinator
            .schedule(&f.hash, LocationKind::Local, LocationKind::ObjectStore, 5)
            .await
            .unwrap();

        let attempts = f.coordinator.run_once().await.unwrap();
        assert_eq!(attempts, 3);

        let job = f.coordinator.job(job.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 3);
        assert!(job.last_error.is_some());
        assert!(
            f.registry
                .location(&f.hash, LocationKind::ObjectStore)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn failed_attempt_waits_for_backoff() {
        let f = fixture(60_000).await;
        let job = f
            .coordinator
            .schedule(&f.hash, LocationKind::Local, LocationKind::ObjectStore, 5)
            .await
            .unwrap();

        assert_eq!(f.coordinator.run_once().await.unwrap(), 1);

        let job = f.coordinator.job(job.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert!(job.not_before.unwrap() > OffsetDateTime::now_utc());
    }

    #[tokio::test]
    async fn cancelled_job_is_never_run() {
        let f = fixture(0).await;
        let job = f
            .coordinator
            .schedule(&f.hash, LocationKind::Local, LocationKind::Cdn, 5)
            .await
            .unwrap();

        assert!(f.coordinator.cancel(job.job_id).await.unwrap());
        assert!(!f.coordinator.cancel(job.job_id).await.unwrap());
        assert_eq!(f.coordinator.run_once().await.unwrap(), 0);

        let job = f.coordinator.job(job.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(f.registry.location(&f.hash, LocationKind::Cdn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn schedule_if_missing_skips_open_and_present_targets() {
        let f = fixture(0).await;
        let first = f
            .coordinator
            .schedule_if_missing(&f.hash, LocationKind::Local, LocationKind::Cdn, 5)
            .await
            .unwrap();
        assert!(first.is_some());
        let again = f
            .coordinator
            .schedule_if_missing(&f.hash, LocationKind::Local, LocationKind::Cdn, 5)
            .await
            .unwrap();
        assert!(again.is_none());

        f.coordinator.run_once().await.unwrap();
        let after = f
            .coordinator
            .schedule_if_missing(&f.hash, LocationKind::Local, LocationKind::Cdn, 5)
            .await
            .unwrap();
        assert!(after.is_none());
    }

    #[tokio::test]
    async fn unknown_job_is_reported() {
        let f = fixture(0).await;
        let err = f.coordinator.cancel(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EngineError::JobNotFound(_)));
    }
}
