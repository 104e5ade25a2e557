//! Risk analysis request/response types and the risk legend.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::RawIncident;

/// Body of `POST /api/risk-analysis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskRequest {
    /// Center latitude.
    pub latitude: f64,
    /// Center longitude.
    pub longitude: f64,
    /// Search radius in meters.
    pub radius: u32,
}

/// Location echoed back by the risk endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLocation {
    /// Center latitude.
    pub latitude: f64,
    /// Center longitude.
    pub longitude: f64,
    /// Search radius in meters.
    pub radius: u32,
}

/// Response of `POST /api/risk-analysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// The analyzed location.
    pub location: RiskLocation,
    /// Risk score, 0-100.
    pub risk_score: u32,
    /// Server-side risk label.
    pub risk_level: RiskLevel,
    /// Number of incidents inside the radius.
    pub incident_count: usize,
    /// The incidents inside the radius, as sent by the server.
    #[serde(default)]
    pub incidents: Vec<RawIncident>,
    /// When the analysis ran.
    #[serde(default)]
    pub analysis_time: Option<String>,
}

/// Risk legend buckets.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    /// Score below the low threshold.
    Low,
    /// Score below the moderate threshold.
    Moderate,
    /// Everything else.
    High,
}

/// Score boundaries for [`RiskLevel::from_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Scores strictly below this are [`RiskLevel::Low`].
    pub low_below: u32,
    /// Scores strictly below this (and not low) are [`RiskLevel::Moderate`].
    pub moderate_below: u32,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low_below: 30,
            moderate_below: 70,
        }
    }
}

impl RiskLevel {
    /// Classifies a 0-100 score.
    #[must_use]
    pub const fn from_score(score: u32, thresholds: RiskThresholds) -> Self {
        if score < thresholds.low_below {
            Self::Low
        } else if score < thresholds.moderate_below {
            Self::Moderate
        } else {
            Self::High
        }
    }

    /// Legend label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::Moderate => "Moderate Risk",
            Self::High => "High Risk",
        }
    }
}
