//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{
    AdvertisementRepo, ContentRepo, LocationRepo, ReplicationRepo, RoutingRepo, VerificationRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    ContentRepo
    + LocationRepo
    + ReplicationRepo
    + VerificationRepo
    + AdvertisementRepo
    + RoutingRepo
    + Send
    + Sync
{
    /// Create tables and indexes if they do not exist.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(30));

        let in_memory = path == Path::new(":memory:");

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        }
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway, and the claim
        // query relies on that for its compare-and-set. An in-memory database
        // lives only as long as its connection, so that one is never recycled.
        let mut pool_opts = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(query_timeout);
        if in_memory {
            pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs = store.query_timeout.as_secs(),
            "opened sqlite metadata store"
        );
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Map insert failures on keyed tables to domain errors.
fn map_insert_error(err: sqlx::Error, what: &str) -> MetadataError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            MetadataError::AlreadyExists(what.to_string())
        }
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            MetadataError::NotFound(format!("content referenced by {what}"))
        }
        other => other.into(),
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl ContentRepo for SqliteStore {
        async fn insert_content(&self, row: &ContentRow) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO content_records (
                    content_hash, size_bytes, mime_type, storage_tier, local_path,
                    verification_agents, last_verified_at, access_count, update_count,
                    access_frequency_per_hour, update_frequency_per_day, last_accessed_at,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.content_hash)
            .bind(row.size_bytes)
            .bind(&row.mime_type)
            .bind(&row.storage_tier)
            .bind(&row.local_path)
            .bind(&row.verification_agents)
            .bind(row.last_verified_at)
            .bind(row.access_count)
            .bind(row.update_count)
            .bind(row.access_frequency_per_hour)
            .bind(row.update_frequency_per_day)
            .bind(row.last_accessed_at)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn get_content(&self, content_hash: &str) -> MetadataResult<Option<ContentRow>> {
            let row = sqlx::query_as::<_, ContentRow>(
                "SELECT * FROM content_records WHERE content_hash = ?",
            )
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn record_content_update(
            &self,
            content_hash: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<ContentRow>> {
            let mut tx = self.pool.begin().await?;
            let Some(mut row) = sqlx::query_as::<_, ContentRow>(
                "SELECT * FROM content_records WHERE content_hash = ?",
            )
            .bind(content_hash)
            .fetch_optional(&mut *tx)
            .await?
            else {
                return Ok(None);
            };

            let mut stats = row.access_statistics();
            stats.record_update(row.created_at, now);
            row.update_count = to_i64(stats.update_count);
            row.update_frequency_per_day = stats.update_frequency_per_day;
            row.updated_at = now;

            sqlx::query(
                "UPDATE content_records SET update_count = ?, update_frequency_per_day = ?, updated_at = ? WHERE content_hash = ?",
            )
            .bind(row.update_count)
            .bind(row.update_frequency_per_day)
            .bind(now)
            .bind(content_hash)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(Some(row))
        }

        async fn record_content_access(
            &self,
            content_hash: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<ContentRow>> {
            let mut tx = self.pool.begin().await?;
            let Some(mut row) = sqlx::query_as::<_, ContentRow>(
                "SELECT * FROM content_records WHERE content_hash = ?",
            )
            .bind(content_hash)
            .fetch_optional(&mut *tx)
            .await?
            else {
                return Ok(None);
            };

            let mut stats = row.access_statistics();
            stats.record_access(row.created_at, now);
            row.access_count = to_i64(stats.access_count);
            row.access_frequency_per_hour = stats.access_frequency_per_hour;
            row.last_accessed_at = stats.last_accessed_at;

            sqlx::query(
                "UPDATE content_records SET access_count = ?, access_frequency_per_hour = ?, last_accessed_at = ? WHERE content_hash = ?",
            )
            .bind(row.access_count)
            .bind(row.access_frequency_per_hour)
            .bind(row.last_accessed_at)
            .bind(content_hash)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(Some(row))
        }

        async fn set_local_path(
            &self,
            content_hash: &str,
            local_path: Option<&str>,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE content_records SET local_path = ?, updated_at = ? WHERE content_hash = ?",
            )
            .bind(local_path)
            .bind(now)
            .bind(content_hash)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("content {content_hash}")));
            }
            Ok(())
        }

        async fn add_verification_agent(
            &self,
            content_hash: &str,
            verifier_id: &str,
            verified_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;
            let agents: Option<String> = sqlx::query_scalar(
                "SELECT verification_agents FROM content_records WHERE content_hash = ?",
            )
            .bind(content_hash)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(agents) = agents else {
                return Err(MetadataError::NotFound(format!("content {content_hash}")));
            };

            let mut set: std::collections::BTreeSet<String> = serde_json::from_str(&agents)?;
            set.insert(verifier_id.to_string());

            sqlx::query(
                "UPDATE content_records SET verification_agents = ?, last_verified_at = ? WHERE content_hash = ?",
            )
            .bind(serde_json::to_string(&set)?)
            .bind(verified_at)
            .bind(content_hash)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(())
        }

        async fn content_due_for_verification(
            &self,
            cutoff: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<String>> {
            let hashes = sqlx::query_scalar::<_, String>(
                r#"
                SELECT content_hash FROM content_records
                WHERE last_verified_at IS NULL OR last_verified_at < ?
                ORDER BY last_verified_at IS NOT NULL, last_verified_at ASC, created_at ASC
                LIMIT ?
                "#,
            )
            .bind(cutoff)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(hashes)
        }

        async fn content_coverage(&self) -> MetadataResult<ContentCoverage> {
            let (total, well_replicated): (i64, i64) = sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN n >= 2 THEN 1 ELSE 0 END), 0)
                FROM (
                    SELECT c.content_hash,
                           (SELECT COUNT(*) FROM content_locations l
                            WHERE l.content_hash = c.content_hash) AS n
                    FROM content_records c
                )
                "#,
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(ContentCoverage {
                total_content: to_u64(total),
                well_replicated: to_u64(well_replicated),
            })
        }
    }

    #[async_trait]
    impl LocationRepo for SqliteStore {
        async fn register_location(&self, row: &LocationRow) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO content_locations (
                    content_hash, kind, url, availability, latency_ms, bandwidth_mbps,
                    cost_per_gb_satoshis, geographic_regions, verified_at, registered_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.content_hash)
            .bind(&row.kind)
            .bind(&row.url)
            .bind(row.availability)
            .bind(row.latency_ms)
            .bind(row.bandwidth_mbps)
            .bind(row.cost_per_gb_satoshis)
            .bind(&row.geographic_regions)
            .bind(row.verified_at)
            .bind(row.registered_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, "location"))?;
            Ok(result.rows_affected() > 0)
        }

        async fn remove_location(&self, content_hash: &str, kind: &str) -> MetadataResult<bool> {
            let result =
                sqlx::query("DELETE FROM content_locations WHERE content_hash = ? AND kind = ?")
                    .bind(content_hash)
                    .bind(kind)
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn locations_for(&self, content_hash: &str) -> MetadataResult<Vec<LocationRow>> {
            let rows = sqlx::query_as::<_, LocationRow>(
                "SELECT * FROM content_locations WHERE content_hash = ? ORDER BY kind",
            )
            .bind(content_hash)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_location(
            &self,
            content_hash: &str,
            kind: &str,
        ) -> MetadataResult<Option<LocationRow>> {
            let row = sqlx::query_as::<_, LocationRow>(
                "SELECT * FROM content_locations WHERE content_hash = ? AND kind = ?",
            )
            .bind(content_hash)
            .bind(kind)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn update_location_metrics(
            &self,
            content_hash: &str,
            kind: &str,
            availability: f64,
            latency_ms: i64,
            verified_at: Option<OffsetDateTime>,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                UPDATE content_locations
                SET availability = ?, latency_ms = ?, verified_at = COALESCE(?, verified_at)
                WHERE content_hash = ? AND kind = ?
                "#,
            )
            .bind(availability.clamp(0.0, 1.0))
            .bind(latency_ms)
            .bind(verified_at)
            .bind(content_hash)
            .bind(kind)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl ReplicationRepo for SqliteStore {
        async fn create_job(&self, job: &ReplicationJobRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO replication_jobs (
                    job_id, content_hash, source, target, status, progress_percent,
                    bytes_replicated, priority, retry_count, max_retries, last_error,
                    not_before_ms, enqueued_at, started_at, completed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(job.job_id)
            .bind(&job.content_hash)
            .bind(&job.source)
            .bind(&job.target)
            .bind(&job.status)
            .bind(job.progress_percent)
            .bind(job.bytes_replicated)
            .bind(job.priority)
            .bind(job.retry_count)
            .bind(job.max_retries)
            .bind(&job.last_error)
            .bind(job.not_before_ms)
            .bind(job.enqueued_at)
            .bind(job.started_at)
            .bind(job.completed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, &format!("replication job {}", job.job_id)))?;
            Ok(())
        }

        async fn get_job(&self, job_id: Uuid) -> MetadataResult<Option<ReplicationJobRow>> {
            let row = sqlx::query_as::<_, ReplicationJobRow>(
                "SELECT * FROM replication_jobs WHERE job_id = ?",
            )
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn claim_next_job(
            &self,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<ReplicationJobRow>> {
            // rowid is insertion order, so it doubles as the FIFO key.
            let row = sqlx::query_as::<_, ReplicationJobRow>(
                r#"
                UPDATE replication_jobs
                SET status = 'in_progress', started_at = ?
                WHERE job_id = (
                    SELECT job_id FROM replication_jobs
                    WHERE status = 'pending'
                      AND (not_before_ms IS NULL OR not_before_ms <= ?)
                    ORDER BY priority DESC, rowid ASC
                    LIMIT 1
                )
                AND status = 'pending'
                RETURNING *
                "#,
            )
            .bind(now)
            .bind(unix_ms(now))
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn update_job_progress(
            &self,
            job_id: Uuid,
            progress_percent: i64,
            bytes_replicated: i64,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE replication_jobs
                SET progress_percent = ?, bytes_replicated = ?
                WHERE job_id = ? AND status = 'in_progress'
                "#,
            )
            .bind(progress_percent.clamp(0, 100))
            .bind(bytes_replicated)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn complete_job(
            &self,
            job_id: Uuid,
            bytes_replicated: i64,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE replication_jobs
                SET status = 'completed', progress_percent = 100, bytes_replicated = ?,
                    last_error = NULL, completed_at = ?
                WHERE job_id = ? AND status = 'in_progress'
                "#,
            )
            .bind(bytes_replicated)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn retry_job(
            &self,
            job_id: Uuid,
            retry_count: i64,
            not_before: OffsetDateTime,
            error: &str,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE replication_jobs
                SET status = 'pending', retry_count = ?, not_before_ms = ?, last_error = ?,
                    progress_percent = 0, started_at = NULL
                WHERE job_id = ? AND status = 'in_progress'
                "#,
            )
            .bind(retry_count)
            .bind(unix_ms(not_before))
            .bind(error)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn fail_job(
            &self,
            job_id: Uuid,
            retry_count: i64,
            error: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE replication_jobs
                SET status = 'failed', retry_count = ?, last_error = ?, completed_at = ?
                WHERE job_id = ? AND status = 'in_progress'
                "#,
            )
            .bind(retry_count)
            .bind(error)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn cancel_job(&self, job_id: Uuid, now: OffsetDateTime) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE replication_jobs
                SET status = 'cancelled', completed_at = ?
                WHERE job_id = ? AND status IN ('pending', 'in_progress')
                "#,
            )
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn jobs_for_content(
            &self,
            content_hash: &str,
        ) -> MetadataResult<Vec<ReplicationJobRow>> {
            let rows = sqlx::query_as::<_, ReplicationJobRow>(
                "SELECT * FROM replication_jobs WHERE content_hash = ? ORDER BY rowid ASC",
            )
            .bind(content_hash)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn has_open_job(&self, content_hash: &str, target: &str) -> MetadataResult<bool> {
            let exists: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM replication_jobs
                    WHERE content_hash = ? AND target = ?
                      AND status IN ('pending', 'in_progress')
                )
                "#,
            )
            .bind(content_hash)
            .bind(target)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        }

        async fn count_jobs_by_status(&self) -> MetadataResult<Vec<(String, u64)>> {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT status, COUNT(*) FROM replication_jobs GROUP BY status ORDER BY status",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|(status, n)| (status, to_u64(n)))
                .collect())
        }

        async fn requeue_abandoned_jobs(&self) -> MetadataResult<u64> {
            let result = sqlx::query(
                r#"
                UPDATE replication_jobs
                SET status = 'pending', started_at = NULL, progress_percent = 0
                WHERE status = 'in_progress'
                "#,
            )
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }

        async fn set_replication_status(
            &self,
            content_hash: &str,
            target: &str,
            status: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO replication_status (content_hash, target, status, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(content_hash, target)
                DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at
                "#,
            )
            .bind(content_hash)
            .bind(target)
            .bind(status)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, "replication status"))?;
            Ok(())
        }

        async fn replication_statuses(
            &self,
            content_hash: &str,
        ) -> MetadataResult<Vec<ReplicationStatusRow>> {
            let rows = sqlx::query_as::<_, ReplicationStatusRow>(
                "SELECT * FROM replication_status WHERE content_hash = ? ORDER BY target",
            )
            .bind(content_hash)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl VerificationRepo for SqliteStore {
        async fn insert_verification(&self, row: &VerificationRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO verification_records (
                    id, content_hash, location, verifier_id, verification_type, hash_match,
                    response_time_ms, content_size, error, verified_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.id)
            .bind(&row.content_hash)
            .bind(&row.location)
            .bind(&row.verifier_id)
            .bind(&row.verification_type)
            .bind(row.hash_match)
            .bind(row.response_time_ms)
            .bind(row.content_size)
            .bind(&row.error)
            .bind(row.verified_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, &format!("verification record {}", row.id)))?;
            Ok(())
        }

        async fn recent_verifications(
            &self,
            content_hash: &str,
            location: &str,
            limit: u32,
        ) -> MetadataResult<Vec<VerificationRow>> {
            let rows = sqlx::query_as::<_, VerificationRow>(
                r#"
                SELECT * FROM verification_records
                WHERE content_hash = ? AND location = ?
                ORDER BY rowid DESC
                LIMIT ?
                "#,
            )
            .bind(content_hash)
            .bind(location)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn verifications_for(
            &self,
            content_hash: &str,
            limit: u32,
        ) -> MetadataResult<Vec<VerificationRow>> {
            let rows = sqlx::query_as::<_, VerificationRow>(
                "SELECT * FROM verification_records WHERE content_hash = ? ORDER BY rowid DESC LIMIT ?",
            )
            .bind(content_hash)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl AdvertisementRepo for SqliteStore {
        async fn insert_advertisement(&self, row: &AdvertisementRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO advertisements (
                    advertisement_id, content_hash, storage_provider, capability, endpoints,
                    geographic_regions, ttl_hours, published_at, expires_at, active, signature
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.advertisement_id)
            .bind(&row.content_hash)
            .bind(&row.storage_provider)
            .bind(&row.capability)
            .bind(&row.endpoints)
            .bind(&row.geographic_regions)
            .bind(row.ttl_hours)
            .bind(row.published_at)
            .bind(row.expires_at)
            .bind(row.active)
            .bind(&row.signature)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                map_insert_error(e, &format!("advertisement {}", row.advertisement_id))
            })?;
            Ok(())
        }

        async fn get_advertisement(
            &self,
            advertisement_id: Uuid,
        ) -> MetadataResult<Option<AdvertisementRow>> {
            let row = sqlx::query_as::<_, AdvertisementRow>(
                "SELECT * FROM advertisements WHERE advertisement_id = ?",
            )
            .bind(advertisement_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn active_advertisements(
            &self,
            content_hash: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<Vec<AdvertisementRow>> {
            let rows = sqlx::query_as::<_, AdvertisementRow>(
                r#"
                SELECT * FROM advertisements
                WHERE content_hash = ? AND active = 1 AND expires_at > ?
                ORDER BY published_at DESC
                "#,
            )
            .bind(content_hash)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn deactivate_advertisement(&self, advertisement_id: Uuid) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE advertisements SET active = 0 WHERE advertisement_id = ? AND active = 1",
            )
            .bind(advertisement_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn expire_advertisements(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let result = sqlx::query(
                "UPDATE advertisements SET active = 0 WHERE active = 1 AND expires_at <= ?",
            )
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl RoutingRepo for SqliteStore {
        async fn insert_decision(&self, row: &RoutingDecisionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO routing_decisions (
                    decision_id, content_hash, client_id, selected_kind, selected,
                    routing_score, routing_reason, estimated_latency_ms,
                    estimated_cost_satoshis, alternatives, cache_recommendation,
                    actual_latency_ms, decided_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.decision_id)
            .bind(&row.content_hash)
            .bind(&row.client_id)
            .bind(&row.selected_kind)
            .bind(&row.selected)
            .bind(row.routing_score)
            .bind(&row.routing_reason)
            .bind(row.estimated_latency_ms)
            .bind(row.estimated_cost_satoshis)
            .bind(&row.alternatives)
            .bind(&row.cache_recommendation)
            .bind(row.actual_latency_ms)
            .bind(row.decided_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, &format!("routing decision {}", row.decision_id)))?;
            Ok(())
        }

        async fn get_decision(
            &self,
            decision_id: Uuid,
        ) -> MetadataResult<Option<RoutingDecisionRow>> {
            let row = sqlx::query_as::<_, RoutingDecisionRow>(
                "SELECT * FROM routing_decisions WHERE decision_id = ?",
            )
            .bind(decision_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn set_actual_latency(
            &self,
            decision_id: Uuid,
            latency_ms: i64,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE routing_decisions SET actual_latency_ms = ?
                WHERE decision_id = ? AND actual_latency_ms IS NULL
                "#,
            )
            .bind(latency_ms)
            .bind(decision_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn routing_aggregate(&self) -> MetadataResult<RoutingAggregate> {
            let (total, mean_score, mean_estimated, mean_actual): (i64, f64, f64, Option<f64>) =
                sqlx::query_as(
                    r#"
                    SELECT
                        COUNT(*),
                        COALESCE(AVG(routing_score), 0.0),
                        COALESCE(AVG(CAST(estimated_latency_ms AS REAL)), 0.0),
                        AVG(CAST(actual_latency_ms AS REAL))
                    FROM routing_decisions
                    "#,
                )
                .fetch_one(&self.pool)
                .await?;

            let by_location: Vec<(String, i64)> = sqlx::query_as(
                r#"
                SELECT selected_kind, COUNT(*) FROM routing_decisions
                GROUP BY selected_kind ORDER BY selected_kind
                "#,
            )
            .fetch_all(&self.pool)
            .await?;

            Ok(RoutingAggregate {
                total_decisions: to_u64(total),
                by_location: by_location
                    .into_iter()
                    .map(|(kind, n)| (kind, to_u64(n)))
                    .collect(),
                mean_routing_score: mean_score,
                mean_estimated_latency_ms: mean_estimated,
                mean_actual_latency_ms: mean_actual,
            })
        }

        async fn insert_access_log(&self, row: &AccessLogRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO access_logs (
                    content_hash, client_id, location, response_time_ms, bytes_served,
                    cache_hit, accessed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.content_hash)
            .bind(&row.client_id)
            .bind(&row.location)
            .bind(row.response_time_ms)
            .bind(row.bytes_served)
            .bind(row.cache_hit)
            .bind(row.accessed_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn mean_response_time(
            &self,
            content_hash: &str,
            location: &str,
            window: u32,
        ) -> MetadataResult<Option<f64>> {
            let mean: Option<f64> = sqlx::query_scalar(
                r#"
                SELECT AVG(CAST(response_time_ms AS REAL)) FROM (
                    SELECT response_time_ms FROM access_logs
                    WHERE content_hash = ? AND location = ? AND cache_hit = 0
                    ORDER BY rowid DESC
                    LIMIT ?
                )
                "#,
            )
            .bind(content_hash)
            .bind(location)
            .bind(i64::from(window))
            .fetch_one(&self.pool)
            .await?;
            Ok(mean)
        }

        async fn access_logs_for(
            &self,
            content_hash: &str,
            limit: u32,
        ) -> MetadataResult<Vec<AccessLogRow>> {
            let rows = sqlx::query_as::<_, AccessLogRow>(
                "SELECT * FROM access_logs WHERE content_hash = ? ORDER BY rowid DESC LIMIT ?",
            )
            .bind(content_hash)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS content_records (
    content_hash TEXT PRIMARY KEY,
    size_bytes INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    storage_tier TEXT NOT NULL DEFAULT 'hot',
    local_path TEXT,
    verification_agents TEXT NOT NULL DEFAULT '[]',
    last_verified_at TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    update_count INTEGER NOT NULL DEFAULT 0,
    access_frequency_per_hour REAL NOT NULL DEFAULT 0,
    update_frequency_per_day REAL NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_content_last_verified ON content_records(last_verified_at);

-- One row per (content, location type); append-only apart from metrics.
CREATE TABLE IF NOT EXISTS content_locations (
    content_hash TEXT NOT NULL REFERENCES content_records(content_hash),
    kind TEXT NOT NULL,
    url TEXT NOT NULL,
    availability REAL NOT NULL,
    latency_ms INTEGER NOT NULL,
    bandwidth_mbps INTEGER NOT NULL,
    cost_per_gb_satoshis INTEGER NOT NULL,
    geographic_regions TEXT NOT NULL DEFAULT '[]',
    verified_at TEXT,
    registered_at TEXT NOT NULL,
    PRIMARY KEY (content_hash, kind)
);

CREATE TABLE IF NOT EXISTS replication_status (
    content_hash TEXT NOT NULL REFERENCES content_records(content_hash),
    target TEXT NOT NULL,
    status TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (content_hash, target)
);

CREATE TABLE IF NOT EXISTS replication_jobs (
    job_id BLOB PRIMARY KEY,
    content_hash TEXT NOT NULL REFERENCES content_records(content_hash),
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    progress_percent INTEGER NOT NULL DEFAULT 0,
    bytes_replicated INTEGER NOT NULL DEFAULT 0,
    priority INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL,
    last_error TEXT,
    not_before_ms INTEGER,
    enqueued_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    CHECK (source <> target),
    CHECK (priority BETWEEN 1 AND 10)
);
CREATE INDEX IF NOT EXISTS idx_replication_jobs_claim
    ON replication_jobs(status, priority DESC, not_before_ms);
CREATE INDEX IF NOT EXISTS idx_replication_jobs_content
    ON replication_jobs(content_hash, target, status);

-- Append-only evidence.
CREATE TABLE IF NOT EXISTS verification_records (
    id BLOB PRIMARY KEY,
    content_hash TEXT NOT NULL,
    location TEXT NOT NULL,
    verifier_id TEXT NOT NULL,
    verification_type TEXT NOT NULL,
    hash_match INTEGER NOT NULL,
    response_time_ms INTEGER NOT NULL,
    content_size INTEGER,
    error TEXT,
    verified_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_verification_records_location
    ON verification_records(content_hash, location);

CREATE TABLE IF NOT EXISTS advertisements (
    advertisement_id BLOB PRIMARY KEY,
    content_hash TEXT NOT NULL,
    storage_provider TEXT NOT NULL,
    capability TEXT NOT NULL,
    endpoints TEXT NOT NULL,
    geographic_regions TEXT NOT NULL,
    ttl_hours INTEGER NOT NULL,
    published_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    signature TEXT
);
CREATE INDEX IF NOT EXISTS idx_advertisements_content ON advertisements(content_hash, active);
CREATE INDEX IF NOT EXISTS idx_advertisements_expiry ON advertisements(active, expires_at);

CREATE TABLE IF NOT EXISTS routing_decisions (
    decision_id BLOB PRIMARY KEY,
    content_hash TEXT NOT NULL,
    client_id TEXT,
    selected_kind TEXT NOT NULL,
    selected TEXT NOT NULL,
    routing_score REAL NOT NULL,
    routing_reason TEXT NOT NULL,
    estimated_latency_ms INTEGER NOT NULL,
    estimated_cost_satoshis REAL NOT NULL,
    alternatives TEXT NOT NULL,
    cache_recommendation TEXT,
    actual_latency_ms INTEGER,
    decided_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS access_logs (
    content_hash TEXT NOT NULL,
    client_id TEXT,
    location TEXT,
    response_time_ms INTEGER NOT NULL,
    bytes_served INTEGER NOT NULL,
    cache_hit INTEGER NOT NULL,
    accessed_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_access_logs_location ON access_logs(content_hash, location);
"#;
