#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Client-side analytics over a cached incident collection.
//!
//! [`aggregate`] produces the same [`AnalyticsSummary`] shape the summary
//! endpoint returns, so the dashboard can render either interchangeably.

use std::collections::BTreeMap;

use crashlens_analytics_models::{AnalyticsSummary, IncidentStats};
use crashlens_incident_models::{Criticality, Incident};

/// Counts incidents by criticality and by type.
///
/// Only values that occur get a key. The result depends on the multiset of
/// incidents, not on their order.
#[must_use]
pub fn aggregate<'a, I>(incidents: I, period: &str) -> AnalyticsSummary
where
    I: IntoIterator<Item = &'a Incident>,
{
    let mut total = 0_u64;
    let mut by_severity = BTreeMap::<String, u64>::new();
    let mut by_type = BTreeMap::<String, u64>::new();

    for incident in incidents {
        total += 1;
        *by_severity
            .entry(incident.criticality.to_string())
            .or_default() += 1;
        *by_type.entry(incident.incident_type.clone()).or_default() += 1;
    }

    log::trace!(
        "Aggregated {total} incidents into {} severities, {} types",
        by_severity.len(),
        by_type.len()
    );

    AnalyticsSummary {
        total_incidents: total,
        by_severity,
        by_type,
        period: period.to_string(),
        timestamp: None,
    }
}

/// Headline counters for the incident list.
#[must_use]
pub fn stats<'a, I>(incidents: I) -> IncidentStats
where
    I: IntoIterator<Item = &'a Incident>,
{
    incidents
        .into_iter()
        .fold(IncidentStats::default(), |mut acc, incident| {
            acc.total += 1;
            match incident.criticality {
                Criticality::Critical => acc.critical += 1,
                Criticality::Major => acc.major += 1,
                Criticality::Minor => acc.minor += 1,
                Criticality::Low | Criticality::Unknown => {}
            }
            acc
        })
}
