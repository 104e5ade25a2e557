#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Traffic incident types and the ingestion normalization step.
//!
//! Incidents arrive from the API as loosely-typed [`RawIncident`] records
//! with optional and sometimes empty fields. [`normalize_all`] converts them
//! into [`Incident`] values exactly once, right after decoding and before
//! anything is cached, so downstream pipelines never deal with missing-field
//! handling themselves.

pub mod flow;
pub mod health;
pub mod risk;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Criticality of a traffic incident as reported by the upstream feed.
///
/// [`Criticality::Unknown`] is the sentinel for missing or unrecognized
/// values; it sorts after every known level.
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
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Criticality {
    /// Road closed or life-threatening conditions.
    Critical,
    /// Significant delays expected.
    Major,
    /// Minor delays.
    Minor,
    /// Informational.
    Low,
    /// Missing or unrecognized criticality.
    #[serde(other)]
    Unknown,
}

impl Criticality {
    /// Rank used by severity ordering: most severe first, unknown last.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Major => 1,
            Self::Minor => 2,
            Self::Low => 3,
            Self::Unknown => 99,
        }
    }

    /// Parses a raw criticality label, falling back to
    /// [`Criticality::Unknown`] for missing or unrecognized values.
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        label
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::Unknown)
    }

    /// Returns the known criticality levels, most severe first.
    #[must_use]
    pub const fn known() -> &'static [Self] {
        &[Self::Critical, Self::Major, Self::Minor, Self::Low]
    }
}

/// An incident record exactly as the API serializes it.
///
/// Every field is optional because the upstream feed is inconsistent:
/// the backend fills unknown road names with `""`, omits lengths, and
/// occasionally sends criticality labels outside the known set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawIncident {
    /// Upstream incident identifier.
    pub id: Option<String>,
    /// Incident category label (e.g. `"accident"`, `"construction"`).
    #[serde(rename = "type")]
    pub incident_type: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Criticality label.
    pub criticality: Option<String>,
    /// Start time (RFC 3339).
    pub start_time: Option<String>,
    /// End time (RFC 3339), often empty.
    pub end_time: Option<String>,
    /// Road name, often empty.
    pub road_name: Option<String>,
    /// Human-readable location name.
    pub location_name: Option<String>,
    /// Affected road length in meters.
    pub length: Option<f64>,
}

/// A normalized traffic incident.
///
/// Immutable once built; the cache shares these behind an `Arc` and the
/// pipelines only ever borrow them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Unique, stable identifier.
    pub id: String,
    /// Incident category label.
    #[serde(rename = "type")]
    pub incident_type: String,
    /// Free-text description (empty when the feed had none).
    pub description: String,
    /// Criticality level.
    pub criticality: Criticality,
    /// Road name, if known.
    pub road_name: Option<String>,
    /// Location name, if known.
    pub location_name: Option<String>,
    /// When the incident started.
    pub start_time: DateTime<Utc>,
    /// When the incident is expected to end, if known.
    pub end_time: Option<DateTime<Utc>>,
    /// Affected road length in meters, if known.
    pub length: Option<f64>,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
}

impl Incident {
    /// Lower-cased concatenation of the free-text fields used by search.
    ///
    /// Missing fields contribute an empty string; fields are joined with a
    /// single space.
    #[must_use]
    pub fn search_text(&self) -> String {
        [
            self.incident_type.as_str(),
            self.description.as_str(),
            self.road_name.as_deref().unwrap_or(""),
            self.location_name.as_deref().unwrap_or(""),
        ]
        .join(" ")
        .to_lowercase()
    }

    /// Location label for display: location name, then road name.
    #[must_use]
    pub fn place_label(&self) -> Option<&str> {
        self.location_name.as_deref().or(self.road_name.as_deref())
    }
}

/// Errors that prevent a raw record from becoming an [`Incident`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// The record has no identifier.
    #[error("incident has no id")]
    MissingId,

    /// The record has no coordinates.
    #[error("incident {id} has no coordinates")]
    MissingCoordinates {
        /// Identifier of the offending record.
        id: String,
    },

    /// The start time is missing or unparseable.
    #[error("incident {id} has an invalid start time: {value:?}")]
    InvalidStartTime {
        /// Identifier of the offending record.
        id: String,
        /// The raw value, if any.
        value: Option<String>,
    },
}

impl RawIncident {
    /// Converts this wire record into a normalized [`Incident`].
    ///
    /// Defaulting rules: missing type becomes `"unknown"`, missing
    /// description becomes `""`, empty road/location names become `None`,
    /// unrecognized criticality becomes [`Criticality::Unknown`], and a
    /// negative or non-finite length is treated as missing.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError`] if the record lacks an id, coordinates, or
    /// a parseable start time.
    pub fn normalize(self) -> Result<Incident, NormalizeError> {
        let id = non_empty(self.id).ok_or(NormalizeError::MissingId)?;

        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            return Err(NormalizeError::MissingCoordinates { id });
        };

        let Some(start_time) = self.start_time.as_deref().and_then(parse_timestamp) else {
            return Err(NormalizeError::InvalidStartTime {
                id,
                value: self.start_time,
            });
        };

        Ok(Incident {
            id,
            incident_type: non_empty(self.incident_type).unwrap_or_else(|| "unknown".to_string()),
            description: self.description.unwrap_or_default(),
            criticality: Criticality::from_label(self.criticality.as_deref()),
            road_name: non_empty(self.road_name),
            location_name: non_empty(self.location_name),
            start_time,
            end_time: self.end_time.as_deref().and_then(parse_timestamp),
            length: self.length.filter(|l| l.is_finite() && *l >= 0.0),
            latitude,
            longitude,
        })
    }
}

/// Normalizes a batch of raw records, skipping (and logging) any that
/// cannot be converted.
#[must_use]
pub fn normalize_all(raw: Vec<RawIncident>) -> Vec<Incident> {
    let total = raw.len();
    let incidents: Vec<Incident> = raw
        .into_iter()
        .filter_map(|record| match record.normalize() {
            Ok(incident) => Some(incident),
            Err(e) => {
                log::warn!("Skipping malformed incident: {e}");
                None
            }
        })
        .collect();

    if incidents.len() < total {
        log::debug!("Normalized {}/{total} incidents", incidents.len());
    }

    incidents
}

/// Parses an RFC 3339 timestamp, or a naive ISO 8601 one interpreted as UTC.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
