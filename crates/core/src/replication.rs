//! Replication job types and lifecycle.

use crate::hash::ContentAddress;
use crate::location::LocationKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Default number of attempts before a job is marked failed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lowest and highest job priority (10 is most urgent).
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// Replication job status.
///
/// `Pending -> InProgress -> Completed | Failed`, with `Cancelled` reachable
/// from either non-terminal state. A failed attempt that still has retries
/// left moves back to `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Check if the job reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Pending)
                | (Pending, Cancelled)
                | (InProgress, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(crate::Error::InvalidState(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

/// Validate a job priority.
pub fn validate_priority(priority: u8) -> crate::Result<u8> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(priority)
    } else {
        Err(crate::Error::InvalidPriority(priority))
    }
}

/// One attempt (with retries) to copy content between two locations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplicationJob {
    pub job_id: Uuid,
    pub content_hash: ContentAddress,
    pub source: LocationKind,
    pub target: LocationKind,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub bytes_replicated: u64,
    pub priority: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    /// The job is not eligible to be claimed before this instant.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub not_before: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub enqueued_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub completed_at: Option<OffsetDateTime>,
}

/// What happens to a job after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to pending, not claimable before `not_before`.
    Retry {
        retry_count: u32,
        not_before: OffsetDateTime,
    },
    /// Retries exhausted.
    GiveUp { retry_count: u32 },
}

impl ReplicationJob {
    /// Create a pending job.
    pub fn new(
        content_hash: ContentAddress,
        source: LocationKind,
        target: LocationKind,
        priority: u8,
        max_retries: u32,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            content_hash,
            source,
            target,
            status: JobStatus::Pending,
            progress_percent: 0,
            bytes_replicated: 0,
            priority,
            retry_count: 0,
            max_retries,
            last_error: None,
            not_before: None,
            enqueued_at: OffsetDateTime::now_utc(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Decide the next state after a failed attempt.
    ///
    /// The backoff grows linearly with the retry count.
    pub fn after_failure(&self, backoff_base: time::Duration, now: OffsetDateTime) -> RetryDecision {
        let retry_count = self.retry_count.saturating_add(1);
        if retry_count < self.max_retries {
            RetryDecision::Retry {
                retry_count,
                not_before: now + backoff_base * retry_count,
            }
        } else {
            RetryDecision::GiveUp { retry_count }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(max_retries: u32) -> ReplicationJob {
        ReplicationJob::new(
            ContentAddress::compute(b"x"),
            LocationKind::Local,
            LocationKind::Cdn,
            5,
            max_retries,
        )
    }

    #[test]
    fn test_status_text_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Pending));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_backoff_is_proportional_to_retry_count() {
        let now = OffsetDateTime::now_utc();
        let base = time::Duration::seconds(2);

        let mut j = job(3);
        assert_eq!(
            j.after_failure(base, now),
            RetryDecision::Retry {
                retry_count: 1,
                not_before: now + time::Duration::seconds(2)
            }
        );

        j.retry_count = 1;
        assert_eq!(
            j.after_failure(base, now),
            RetryDecision::Retry {
                retry_count: 2,
                not_before: now + time::Duration::seconds(4)
            }
        );
    }

    #[test]
    fn test_gives_up_after_max_retries_attempts() {
        let now = OffsetDateTime::now_utc();
        let mut j = job(3);
        j.retry_count = 2;
        assert_eq!(
            j.after_failure(time::Duration::seconds(1), now),
            RetryDecision::GiveUp { retry_count: 3 }
        );
    }

    #[test]
    fn test_zero_max_retries_gives_up_immediately() {
        let j = job(0);
        assert!(matches!(
            j.after_failure(time::Duration::seconds(1), OffsetDateTime::now_utc()),
            RetryDecision::GiveUp { retry_count: 1 }
        ));
    }

    #[test]
    fn test_validate_priority() {
        assert!(validate_priority(1).is_ok());
        assert!(validate_priority(10).is_ok());
        assert!(validate_priority(0).is_err());
        assert!(validate_priority(11).is_err());
    }
}
