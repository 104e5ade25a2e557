//! Traffic flow samples.
//!
//! Flow data is cached and refreshed like incidents but is otherwise
//! passed through untouched, so the individual samples stay as JSON.

use serde::{Deserialize, Serialize};

/// Response of `GET /api/traffic-flow`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    /// Server timestamp of the snapshot (RFC 3339).
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Number of samples returned.
    #[serde(default)]
    pub count: usize,
    /// Raw flow samples, at most `max_points`.
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}
