#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dashboard API access.
//!
//! The [`DashboardApi`] trait is the seam between the refresh scheduler and
//! the network. [`HttpDashboardApi`] implements it over `reqwest`; tests
//! substitute an in-memory implementation.

pub mod http;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use crashlens_analytics_models::AnalyticsSummary;
use crashlens_incident_models::{
    Criticality, Incident,
    flow::FlowSnapshot,
    health::HealthReport,
    risk::{RiskAssessment, RiskRequest},
};
use crashlens_viewport::BoundingBox;

pub use http::HttpDashboardApi;

/// Errors that can occur while talking to the dashboard API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with an error status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// Response status code.
        status: u16,
        /// Response body preview or reason phrase.
        message: String,
    },

    /// The fetch did not complete in time.
    #[error("Request timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },
}

/// Read access to the dashboard backend.
///
/// Incident results are already normalized: implementations convert wire
/// records with [`crashlens_incident_models::normalize_all`] before
/// returning them.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Incidents inside `bbox`, optionally restricted to one criticality.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body is malformed.
    async fn incidents(
        &self,
        bbox: &BoundingBox,
        criticality: Option<Criticality>,
    ) -> Result<Vec<Incident>, ApiError>;

    /// Traffic flow samples inside `bbox`, at most `max_points`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body is malformed.
    async fn traffic_flow(
        &self,
        bbox: &BoundingBox,
        max_points: u32,
    ) -> Result<FlowSnapshot, ApiError>;

    /// Server-side analytics summary, optionally limited to `bbox`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body is malformed.
    async fn analytics_summary(
        &self,
        bbox: Option<&BoundingBox>,
    ) -> Result<AnalyticsSummary, ApiError>;

    /// Risk assessment around a point.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body is malformed.
    async fn risk_analysis(&self, request: RiskRequest) -> Result<RiskAssessment, ApiError>;

    /// Backend health report.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body is malformed.
    async fn health(&self) -> Result<HealthReport, ApiError>;
}
