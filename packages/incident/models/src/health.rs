//! Backend health report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Response of `GET /health`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status label, `"healthy"` when every check passed.
    #[serde(default)]
    pub status: String,
    /// Individual dependency checks.
    #[serde(default)]
    pub checks: BTreeMap<String, serde_json::Value>,
}

impl HealthReport {
    /// Returns `true` if the backend reports itself healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}
