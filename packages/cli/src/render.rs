//! Plain-text rendering of dashboard views.

use std::fmt::Write as _;

use crashlens_analytics_models::{AnalyticsSummary, IncidentStats, Share};
use crashlens_incident_models::{
    Incident,
    flow::FlowSnapshot,
    health::HealthReport,
    risk::{RiskAssessment, RiskLevel, RiskThresholds},
};
use crashlens_sync::CacheEntry;

const DETAIL_WIDTH: usize = 44;

/// Headline counters line.
pub fn stats_line(stats: &IncidentStats) -> String {
    format!(
        "Total: {}  Critical: {}  Major: {}  Minor: {}",
        stats.total, stats.critical, stats.major, stats.minor
    )
}

/// One line of freshness information for a cache entry.
pub fn freshness_line(entry: &CacheEntry) -> String {
    let mut line = entry.fetched_at_utc.map_or_else(
        || "Not loaded yet".to_string(),
        |at| format!("Updated {}", at.format("%H:%M:%S UTC")),
    );
    if entry.in_flight {
        line.push_str(" (refreshing)");
    }
    if let Some(error) = &entry.error {
        let _ = write!(line, " [last refresh failed: {error}]");
    }
    line
}

/// Incident list table.
pub fn incident_table(incidents: &[Incident]) -> String {
    if incidents.is_empty() {
        return "No incidents match the current filters.".to_string();
    }

    let mut out = format!(
        "{:<9} {:<14} {:<width$} {:>8}  {}\n",
        "LEVEL",
        "TYPE",
        "DETAIL",
        "LENGTH",
        "STARTED",
        width = DETAIL_WIDTH
    );
    for incident in incidents {
        let detail = match incident.place_label() {
            Some(place) if !incident.description.is_empty() => {
                format!("{place}: {}", incident.description)
            }
            Some(place) => place.to_string(),
            None => incident.description.clone(),
        };
        let _ = writeln!(
            out,
            "{:<9} {:<14} {:<width$} {:>8}  {}",
            incident.criticality.as_ref(),
            truncate(&incident.incident_type, 14),
            truncate(&detail, DETAIL_WIDTH),
            format_length(incident.length),
            incident.start_time.format("%m-%d %H:%M"),
            width = DETAIL_WIDTH
        );
    }
    out
}

/// Severity and type breakdowns with percentages.
pub fn summary_table(summary: &AnalyticsSummary) -> String {
    let mut out = format!(
        "Period: {}  Total incidents: {}\n",
        summary.period, summary.total_incidents
    );
    if let Some(timestamp) = &summary.timestamp {
        let _ = writeln!(out, "As of: {timestamp}");
    }
    out.push_str("\nBy severity\n");
    push_shares(&mut out, &summary.severity_shares());
    out.push_str("\nBy type\n");
    push_shares(&mut out, &summary.type_shares());
    out
}

fn push_shares(out: &mut String, shares: &[Share]) {
    if shares.is_empty() {
        out.push_str("  (none)\n");
    }
    for share in shares {
        let _ = writeln!(
            out,
            "  {:<16} {:>6} {:>6.1}%",
            truncate(&share.label, 16),
            share.count,
            share.percent
        );
    }
}

/// Traffic flow snapshot header.
pub fn flow_line(flow: &FlowSnapshot) -> String {
    format!(
        "{} flow samples{}",
        flow.count,
        flow.timestamp
            .as_deref()
            .map_or_else(String::new, |t| format!(" as of {t}"))
    )
}

/// Risk assessment, classified with the configured legend.
pub fn risk_report(assessment: &RiskAssessment, thresholds: RiskThresholds) -> String {
    let level = RiskLevel::from_score(assessment.risk_score, thresholds);
    let location = &assessment.location;
    let mut out = format!(
        "Risk at ({:.4}, {:.4}) within {} m: {}/100 ({})\n",
        location.latitude,
        location.longitude,
        location.radius,
        assessment.risk_score,
        level.label()
    );
    if level != assessment.risk_level {
        let _ = writeln!(out, "Server classified this as {}", assessment.risk_level);
    }
    let _ = write!(out, "{} incidents nearby", assessment.incident_count);
    out
}

/// Health report.
pub fn health_report(report: &HealthReport) -> String {
    let mut out = format!("Status: {}\n", report.status);
    for (name, value) in &report.checks {
        let value = value
            .as_str()
            .map_or_else(|| value.to_string(), ToString::to_string);
        let _ = writeln!(out, "  {name:<12} {value}");
    }
    out
}

/// Length in kilometers with one decimal, or `-` if unknown.
pub fn format_length(length: Option<f64>) -> String {
    length.map_or_else(|| "-".to_string(), |m| format!("{:.1} km", m / 1000.0))
}

/// Truncates to at most `max` characters, marking the cut with `~`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('~');
    cut
}
