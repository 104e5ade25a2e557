//! Conjunctive incident filtering: free-text search, criticality, and
//! length bucket.

use crashlens_incident_models::{Criticality, Incident};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Upper bound (exclusive) of the short bucket, in meters.
pub const SHORT_MAX_M: f64 = 1000.0;

/// Lower bound (inclusive) of the long bucket, in meters.
pub const LONG_MIN_M: f64 = 5000.0;

/// Length bucket selector.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LengthBucket {
    /// No length restriction; incidents without a length are included.
    #[default]
    All,
    /// Shorter than 1 km.
    Short,
    /// At least 1 km and shorter than 5 km.
    Medium,
    /// 5 km or longer.
    Long,
}

impl LengthBucket {
    /// The bucket a defined length falls into (never [`LengthBucket::All`]).
    #[must_use]
    pub fn of(length: f64) -> Self {
        if length < SHORT_MAX_M {
            Self::Short
        } else if length < LONG_MIN_M {
            Self::Medium
        } else {
            Self::Long
        }
    }

    /// Returns `true` if an incident with this length passes the selector.
    ///
    /// Missing lengths only pass [`LengthBucket::All`].
    #[must_use]
    pub fn matches(self, length: Option<f64>) -> bool {
        match (self, length) {
            (Self::All, _) => true,
            (_, None) => false,
            (bucket, Some(len)) => Self::of(len) == bucket,
        }
    }

    /// Display label used by the dashboard selector.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::All => "All Lengths",
            Self::Short => "< 1km",
            Self::Medium => "1-5km",
            Self::Long => "> 5km",
        }
    }
}

/// Transient, UI-owned filter state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Free-text query; empty matches everything.
    pub search: String,
    /// Exact criticality to keep, or `None` for all.
    pub criticality: Option<Criticality>,
    /// Length bucket selector.
    pub length: LengthBucket,
}

impl FilterCriteria {
    /// Returns `true` if no stage would reject anything.
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        self.search.is_empty()
            && self.criticality.is_none()
            && self.length == LengthBucket::All
    }
}

/// Keeps the incidents that pass every stage, in input order.
#[must_use]
pub fn filter<'a>(incidents: &'a [Incident], criteria: &FilterCriteria) -> Vec<&'a Incident> {
    let query = criteria.search.to_lowercase();

    incidents
        .iter()
        .filter(|incident| {
            criteria
                .criticality
                .is_none_or(|wanted| incident.criticality == wanted)
        })
        .filter(|incident| criteria.length.matches(incident.length))
        .filter(|incident| query.is_empty() || incident.search_text().contains(&query))
        .collect()
}
