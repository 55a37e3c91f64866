//! Verification evidence and quorum decisions.

use crate::hash::ContentAddress;
use crate::location::LocationKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Default fraction of responding locations that must agree.
pub const DEFAULT_CONSENSUS_THRESHOLD: f64 = 0.6;

/// How thoroughly a location is checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationType {
    /// Compare a digest reported by the location.
    Hash,
    /// Only check that the location still has the object.
    Availability,
    /// Fetch the full content and hash it.
    #[default]
    Integrity,
    /// Integrity plus a size check against the record.
    Full,
}

impl VerificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Availability => "availability",
            Self::Integrity => "integrity",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "hash" => Ok(Self::Hash),
            "availability" => Ok(Self::Availability),
            "integrity" => Ok(Self::Integrity),
            "full" => Ok(Self::Full),
            other => Err(crate::Error::InvalidState(format!(
                "unknown verification type: {other}"
            ))),
        }
    }
}

/// Append-only evidence from probing one location once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub content_hash: ContentAddress,
    pub location: LocationKind,
    pub verifier_id: String,
    pub verification_type: VerificationType,
    pub hash_match: bool,
    pub response_time_ms: u64,
    pub content_size: Option<u64>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub verified_at: OffsetDateTime,
}

/// How a single probe ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The location returned the expected content.
    Match,
    /// The location returned different content.
    Mismatch { actual: String },
    /// The location answered, but with an error (missing object, bad size, ...).
    Error { message: String },
    /// The location did not answer within its per-location timeout.
    TimedOut,
    /// The location could not be reached at all.
    Unreachable { message: String },
    /// Still outstanding when the overall deadline expired.
    NoResponse,
}

impl ProbeOutcome {
    /// Whether the probe counts toward the agreement denominator.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Self::Match | Self::Mismatch { .. } | Self::Error { .. } | Self::TimedOut
        )
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// Error text stored on the evidence record.
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::Match => None,
            Self::Mismatch { actual } => Some(format!("hash mismatch: got {actual}")),
            Self::Error { message } => Some(message.clone()),
            Self::TimedOut => Some("timed out".to_string()),
            Self::Unreachable { message } => Some(format!("unreachable: {message}")),
            Self::NoResponse => Some("no response before deadline".to_string()),
        }
    }
}

/// Overall condition of a verification run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationCondition {
    ConsensusAchieved,
    ConsensusNotAchieved,
    /// Nothing answered; no decision could be made.
    NoLocationsReachable,
}

/// Per-location line of an [`IntegrityVerification`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationProbe {
    pub location: LocationKind,
    pub url: String,
    pub outcome: ProbeOutcome,
    pub response_time_ms: u64,
}

/// Result of verifying one content address across its locations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrityVerification {
    pub content_hash: ContentAddress,
    pub verification_type: VerificationType,
    pub probes: Vec<LocationProbe>,
    pub matching_locations: usize,
    pub responding_locations: usize,
    pub agreement_ratio: f64,
    pub consensus_threshold: f64,
    pub consensus_achieved: bool,
    pub condition: VerificationCondition,
    /// True if the overall deadline cut the run short.
    pub partial: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub verified_at: OffsetDateTime,
}

/// The agreement ratio and quorum decision for a set of responses.
///
/// Returns `None` when nothing responded.
pub fn consensus(matching: usize, responding: usize, threshold: f64) -> Option<(f64, bool)> {
    if responding == 0 {
        return None;
    }
    let ratio = matching as f64 / responding as f64;
    Some((ratio, ratio >= threshold))
}
