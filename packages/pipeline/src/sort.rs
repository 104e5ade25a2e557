//! Stable orderings over a filtered incident list.

use std::cmp::Ordering;

use crashlens_incident_models::Incident;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Sort key selectable from the dashboard.
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
pub enum SortKey {
    /// Most severe first; unknown criticality last.
    #[default]
    Severity,
    /// Newest start time first.
    Time,
    /// Longest affected length first; missing lengths count as zero.
    Length,
}

impl SortKey {
    fn compare(self, a: &Incident, b: &Incident) -> Ordering {
        match self {
            Self::Severity => a.criticality.rank().cmp(&b.criticality.rank()),
            Self::Time => b.start_time.cmp(&a.start_time),
            Self::Length => b
                .length
                .unwrap_or(0.0)
                .total_cmp(&a.length.unwrap_or(0.0)),
        }
    }
}

/// Sorts by `key`. Equal elements keep their relative input order.
#[must_use]
pub fn sort(mut incidents: Vec<&Incident>, key: SortKey) -> Vec<&Incident> {
    incidents.sort_by(|a, b| key.compare(a, b));
    incidents
}

/// Sorts by a key given by name.
///
/// An unrecognized name is a programming error: debug builds panic, release
/// builds log it and return the input order unchanged.
#[must_use]
pub fn sort_by_name<'a>(incidents: Vec<&'a Incident>, name: &str) -> Vec<&'a Incident> {
    match name.parse::<SortKey>() {
        Ok(key) => sort(incidents, key),
        Err(_) => {
            debug_assert!(false, "unknown sort key: {name}");
            log::error!("Unknown sort key '{name}', leaving order unchanged");
            incidents
        }
    }
}
