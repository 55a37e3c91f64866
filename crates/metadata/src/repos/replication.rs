//! Replication job repository.

use crate::error::MetadataResult;
use crate::models::{ReplicationJobRow, ReplicationStatusRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for replication jobs and per-target replication state.
///
/// Every state change is a compare-and-set on the current status; methods
/// returning `bool` report whether the row was in the expected state.
#[async_trait]
pub trait ReplicationRepo: Send + Sync {
    /// Insert a new pending job.
    async fn create_job(&self, job: &ReplicationJobRow) -> MetadataResult<()>;

    /// Get a job by ID.
    async fn get_job(&self, job_id: Uuid) -> MetadataResult<Option<ReplicationJobRow>>;

    /// Atomically claim the most urgent eligible pending job.
    ///
    /// Eligible means `not_before` is unset or not after `now`. Ordering is
    /// priority descending, then enqueue time. The returned row is already
    /// `in_progress`; concurrent callers never receive the same job.
    async fn claim_next_job(&self, now: OffsetDateTime) -> MetadataResult<Option<ReplicationJobRow>>;

    /// Record transfer progress on an in-progress job.
    async fn update_job_progress(
        &self,
        job_id: Uuid,
        progress_percent: i64,
        bytes_replicated: i64,
    ) -> MetadataResult<bool>;

    /// `in_progress -> completed`.
    async fn complete_job(
        &self,
        job_id: Uuid,
        bytes_replicated: i64,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// `in_progress -> pending` with a bumped retry count and a backoff gate.
    async fn retry_job(
        &self,
        job_id: Uuid,
        retry_count: i64,
        not_before: OffsetDateTime,
        error: &str,
    ) -> MetadataResult<bool>;

    /// `in_progress -> failed`.
    async fn fail_job(
        &self,
        job_id: Uuid,
        retry_count: i64,
        error: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// `pending | in_progress -> cancelled`.
    async fn cancel_job(&self, job_id: Uuid, now: OffsetDateTime) -> MetadataResult<bool>;

    /// All jobs for a hash, oldest first.
    async fn jobs_for_content(&self, content_hash: &str) -> MetadataResult<Vec<ReplicationJobRow>>;

    /// Whether a pending or in-progress job exists for `(content_hash, target)`.
    async fn has_open_job(&self, content_hash: &str, target: &str) -> MetadataResult<bool>;

    /// Job counts keyed by status text.
    async fn count_jobs_by_status(&self) -> MetadataResult<Vec<(String, u64)>>;

    /// Put jobs left `in_progress` by a previous process back to `pending`.
    async fn requeue_abandoned_jobs(&self) -> MetadataResult<u64>;

    /// Upsert the replication state of one target.
    async fn set_replication_status(
        &self,
        content_hash: &str,
        target: &str,
        status: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Replication state of every target of a hash.
    async fn replication_statuses(
        &self,
        content_hash: &str,
    ) -> MetadataResult<Vec<ReplicationStatusRow>>;
}
