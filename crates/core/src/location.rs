//! Storage locations and their quality metrics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// The kind of place a copy of some content lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationKind {
    /// The node's own content store.
    Local,
    /// Resolution through the overlay (distributed hash) network.
    OverlayResolution,
    /// A remote object store bucket.
    ObjectStore,
    /// A content delivery network edge.
    Cdn,
}

impl LocationKind {
    /// Every kind, in declaration order.
    pub const ALL: [LocationKind; 4] = [
        LocationKind::Local,
        LocationKind::OverlayResolution,
        LocationKind::ObjectStore,
        LocationKind::Cdn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::OverlayResolution => "overlay-resolution",
            Self::ObjectStore => "object-store",
            Self::Cdn => "cdn",
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "overlay-resolution" | "overlay" => Ok(Self::OverlayResolution),
            "object-store" | "s3" => Ok(Self::ObjectStore),
            "cdn" => Ok(Self::Cdn),
            other => Err(crate::Error::UnknownLocation(other.to_string())),
        }
    }
}

/// A pointer to one copy of some content.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationRef {
    pub kind: LocationKind,
    pub url: String,
}

impl LocationRef {
    pub fn new(kind: LocationKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }
}

/// A copy of some content together with the current view of its quality.
///
/// Values are derived from the registered location row and the latest
/// verification and access evidence; they are never edited directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub kind: LocationKind,
    pub url: String,
    /// Rolling reliability score in `[0, 1]`.
    pub availability: f64,
    pub latency_ms: u64,
    pub bandwidth_mbps: u64,
    pub cost_per_gb_satoshis: u64,
    pub geographic_regions: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub verified_at: Option<OffsetDateTime>,
}

impl StorageLocation {
    /// The pointer half of this location.
    pub fn location_ref(&self) -> LocationRef {
        LocationRef::new(self.kind, self.url.clone())
    }

    /// True if any of this location's regions appear in `preference`.
    pub fn serves_any_region(&self, preference: &[String]) -> bool {
        preference
            .iter()
            .any(|region| self.geographic_regions.contains(region))
    }
}
