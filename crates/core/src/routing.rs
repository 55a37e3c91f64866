//! Routing inputs, decisions and access logs.

use crate::cache::CacheRecommendation;
use crate::hash::ContentAddress;
use crate::location::{LocationKind, LocationRef, StorageLocation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// The requester's network link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Wifi,
    Ethernet,
    #[serde(rename = "5g")]
    FiveG,
    #[serde(rename = "4g")]
    FourG,
    #[serde(rename = "3g")]
    ThreeG,
    #[default]
    Unknown,
}

impl NetworkType {
    /// Multiplier applied to a location's latency to estimate what this
    /// client will observe.
    pub fn latency_multiplier(&self) -> f64 {
        match self {
            Self::Wifi | Self::Ethernet => 1.0,
            Self::FiveG => 0.8,
            Self::FourG => 1.5,
            Self::ThreeG => 3.0,
            Self::Unknown => 1.2,
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::FiveG | Self::FourG | Self::ThreeG)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wifi => "wifi",
            Self::Ethernet => "ethernet",
            Self::FiveG => "5g",
            Self::FourG => "4g",
            Self::ThreeG => "3g",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wifi" => Ok(Self::Wifi),
            "ethernet" => Ok(Self::Ethernet),
            "5g" => Ok(Self::FiveG),
            "4g" => Ok(Self::FourG),
            "3g" => Ok(Self::ThreeG),
            "unknown" => Ok(Self::Unknown),
            other => Err(crate::Error::InvalidState(format!(
                "unknown network type: {other}"
            ))),
        }
    }
}

/// Who is asking, and from where.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientContext {
    pub client_id: Option<String>,
    /// Coarse region of the requester, e.g. `US`.
    pub geographic_location: Option<String>,
    #[serde(default)]
    pub network_type: NetworkType,
    pub latency_tolerance_ms: Option<u64>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub request_time: Option<OffsetDateTime>,
}

/// Which location type the caller wants, if any.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreferredMethod {
    #[default]
    Auto,
    Local,
    OverlayResolution,
    ObjectStore,
    Cdn,
}

impl PreferredMethod {
    /// The explicit location kind, or `None` for `auto`.
    pub fn kind(&self) -> Option<LocationKind> {
        match self {
            Self::Auto => None,
            Self::Local => Some(LocationKind::Local),
            Self::OverlayResolution => Some(LocationKind::OverlayResolution),
            Self::ObjectStore => Some(LocationKind::ObjectStore),
            Self::Cdn => Some(LocationKind::Cdn),
        }
    }
}

impl FromStr for PreferredMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        if s == "auto" {
            return Ok(Self::Auto);
        }
        Ok(match s.parse::<LocationKind>()? {
            LocationKind::Local => Self::Local,
            LocationKind::OverlayResolution => Self::OverlayResolution,
            LocationKind::ObjectStore => Self::ObjectStore,
            LocationKind::Cdn => Self::Cdn,
        })
    }
}

impl fmt::Display for PreferredMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => f.write_str(kind.as_str()),
            None => f.write_str("auto"),
        }
    }
}

/// Per-request routing options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingOptions {
    #[serde(default)]
    pub preferred_method: PreferredMethod,
    pub max_latency_ms: Option<u64>,
    #[serde(default)]
    pub geographic_preference: Vec<String>,
}

/// An immutable record of one routing choice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub decision_id: Uuid,
    pub content_hash: ContentAddress,
    pub client_id: Option<String>,
    pub selected: StorageLocation,
    pub routing_score: f64,
    pub routing_reason: Vec<String>,
    pub estimated_latency_ms: u64,
    pub estimated_cost_satoshis: f64,
    pub alternatives: Vec<LocationRef>,
    pub cache_recommendation: Option<CacheRecommendation>,
    pub actual_latency_ms: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub decided_at: OffsetDateTime,
}

/// Aggregate view over logged routing decisions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingStats {
    pub total_decisions: u64,
    pub by_location: Vec<(LocationKind, u64)>,
    pub mean_routing_score: f64,
    pub mean_estimated_latency_ms: f64,
    /// Mean over decisions whose actual latency has been reported.
    pub mean_actual_latency_ms: Option<f64>,
}

/// One served read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub content_hash: ContentAddress,
    pub client_id: Option<String>,
    pub location: Option<LocationKind>,
    pub response_time_ms: u64,
    pub bytes_served: u64,
    pub cache_hit: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub accessed_at: OffsetDateTime,
}
