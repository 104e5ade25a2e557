#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Analytics summary types shared by the server-side summary endpoint and
//! the client-side aggregator.
//!
//! Counts are stored in [`BTreeMap`]s so a summary is a deterministic
//! function of the incidents it was built from, independent of their order.
//! Percentages are derived on the consumer side from those counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reporting period label used when none is supplied.
pub const DEFAULT_PERIOD: &str = "24h";

fn default_period() -> String {
    DEFAULT_PERIOD.to_string()
}

/// Aggregate counts over a set of incidents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    /// Number of incidents aggregated.
    #[serde(default)]
    pub total_incidents: u64,
    /// Count per criticality label. Only labels that occur are present.
    #[serde(default)]
    pub by_severity: BTreeMap<String, u64>,
    /// Count per incident type. Only types that occur are present.
    #[serde(default)]
    pub by_type: BTreeMap<String, u64>,
    /// Reporting period label (e.g. `"24h"`).
    #[serde(default = "default_period")]
    pub period: String,
    /// Server timestamp, when the summary came from the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Default for AnalyticsSummary {
    fn default() -> Self {
        Self {
            total_incidents: 0,
            by_severity: BTreeMap::new(),
            by_type: BTreeMap::new(),
            period: default_period(),
            timestamp: None,
        }
    }
}

/// One labelled row of a percentage breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Share {
    /// Category label.
    pub label: String,
    /// Raw count.
    pub count: u64,
    /// Share of the total in percent, rounded to one decimal place.
    pub percent: f64,
}

impl AnalyticsSummary {
    /// Severity breakdown with percentages, in label order.
    #[must_use]
    pub fn severity_shares(&self) -> Vec<Share> {
        shares(&self.by_severity, self.total_incidents)
    }

    /// Type breakdown with percentages, largest count first.
    ///
    /// Ties keep label order.
    #[must_use]
    pub fn type_shares(&self) -> Vec<Share> {
        let mut rows = shares(&self.by_type, self.total_incidents);
        rows.sort_by(|a, b| b.count.cmp(&a.count));
        rows
    }

    /// Count recorded for a severity label, zero if absent.
    #[must_use]
    pub fn severity_count(&self, label: &str) -> u64 {
        self.by_severity.get(label).copied().unwrap_or(0)
    }
}

fn shares(counts: &BTreeMap<String, u64>, total: u64) -> Vec<Share> {
    counts
        .iter()
        .map(|(label, &count)| Share {
            label: label.clone(),
            count,
            percent: round_one_decimal(percentage(count, total)),
        })
        .collect()
}

/// `count / total * 100`, or `0.0` when `total` is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)] // display-only percentage
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}

/// Rounds half away from zero to one decimal place.
#[must_use]
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Headline counters shown above the incident list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentStats {
    /// All incidents in view.
    pub total: usize,
    /// Incidents with critical criticality.
    pub critical: usize,
    /// Incidents with major criticality.
    pub major: usize,
    /// Incidents with minor criticality.
    pub minor: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(severity: &[(&str, u64)], types: &[(&str, u64)]) -> AnalyticsSummary {
        AnalyticsSummary {
            total_incidents: severity.iter().map(|(_, n)| n).sum(),
            by_severity: severity.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
            by_type: types.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
            ..AnalyticsSummary::default()
        }
    }

    #[test]
    fn percentage_is_zero_for_empty_total() {
        assert!(percentage(0, 0).abs() < f64::EPSILON);
        assert!(percentage(5, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn shares_round_to_one_decimal() {
        let s = summary(&[("critical", 2), ("minor", 1)], &[]);
        let rows = s.severity_shares();
        assert_eq!(rows[0].label, "critical");
        assert!((rows[0].percent - 66.7).abs() < 1e-9, "got {}", rows[0].percent);
        assert!((rows[1].percent - 33.3).abs() < 1e-9, "got {}", rows[1].percent);
    }

    #[test]
    fn unrounded_percentages_sum_to_one_hundred() {
        let s = summary(
            &[("critical", 3), ("major", 7), ("minor", 11), ("unknown", 2)],
            &[],
        );
        let sum: f64 = s
            .by_severity
            .values()
            .map(|&n| percentage(n, s.total_incidents))
            .sum();
        assert!((sum - 100.0).abs() < 1e-9, "sum was {sum}");
    }

    #[test]
    fn type_shares_put_largest_first() {
        let s = AnalyticsSummary {
            total_incidents: 6,
            by_type: [("accident", 1), ("construction", 3), ("congestion", 2)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            ..AnalyticsSummary::default()
        };
        let labels: Vec<String> = s.type_shares().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["construction", "congestion", "accident"]);
    }

    #[test]
    fn decodes_server_summary_without_period() {
        let s: AnalyticsSummary = serde_json::from_str(
            r#"{"total_incidents": 3, "by_severity": {"major": 3}, "by_type": {"accident": 3}, "timestamp": "2024-05-01T12:00:00"}"#,
        )
        .unwrap();
        assert_eq!(s.period, "24h");
        assert_eq!(s.severity_count("major"), 3);
        assert_eq!(s.severity_count("critical"), 0);
        assert_eq!(s.timestamp.as_deref(), Some("2024-05-01T12:00:00"));
    }
}
