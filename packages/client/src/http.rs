//! `reqwest`-backed [`DashboardApi`].

use async_trait::async_trait;
use crashlens_analytics_models::AnalyticsSummary;
use crashlens_config::ApiConfig;
use crashlens_incident_models::{
    Criticality, Incident, RawIncident,
    flow::FlowSnapshot,
    health::HealthReport,
    normalize_all,
    risk::{RiskAssessment, RiskRequest},
};
use crashlens_viewport::BoundingBox;
use reqwest::{Client, RequestBuilder};

use crate::{ApiError, DashboardApi, retry};

/// HTTP client for the dashboard API.
#[derive(Debug, Clone)]
pub struct HttpDashboardApi {
    client: Client,
    base_url: String,
    token: Option<String>,
    max_retries: u32,
}

impl HttpDashboardApi {
    /// Builds a client from the `[api]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the underlying client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("crashlens/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            max_retries: config.max_retries,
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(self.url(path)))
    }

    /// `GET /api/incidents`.
    #[must_use]
    pub fn incidents_request(
        &self,
        bbox: &BoundingBox,
        criticality: Option<Criticality>,
    ) -> RequestBuilder {
        let request = self
            .get("/api/incidents")
            .query(&[("bbox", bbox.to_param())]);
        match criticality {
            Some(c) => request.query(&[("criticality", c.as_ref())]),
            None => request,
        }
    }

    /// `GET /api/traffic-flow`.
    #[must_use]
    pub fn traffic_flow_request(&self, bbox: &BoundingBox, max_points: u32) -> RequestBuilder {
        self.get("/api/traffic-flow").query(&[
            ("bbox", bbox.to_param()),
            ("max_points", max_points.to_string()),
        ])
    }

    /// `GET /api/analytics/summary`.
    #[must_use]
    pub fn analytics_summary_request(&self, bbox: Option<&BoundingBox>) -> RequestBuilder {
        let request = self.get("/api/analytics/summary");
        match bbox {
            Some(bbox) => request.query(&[("bbox", bbox.to_param())]),
            None => request,
        }
    }

    /// `POST /api/risk-analysis`.
    #[must_use]
    pub fn risk_analysis_request(&self, request: &RiskRequest) -> RequestBuilder {
        self.authorize(self.client.post(self.url("/api/risk-analysis")))
            .json(request)
    }

    /// `GET /health`.
    #[must_use]
    pub fn health_request(&self) -> RequestBuilder {
        self.get("/health")
    }
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn incidents(
        &self,
        bbox: &BoundingBox,
        criticality: Option<Criticality>,
    ) -> Result<Vec<Incident>, ApiError> {
        log::debug!("Fetching incidents bbox={bbox} criticality={criticality:?}");
        let raw: Vec<RawIncident> =
            retry::send_json(|| self.incidents_request(bbox, criticality), self.max_retries)
                .await?;
        Ok(normalize_all(raw))
    }

    async fn traffic_flow(
        &self,
        bbox: &BoundingBox,
        max_points: u32,
    ) -> Result<FlowSnapshot, ApiError> {
        log::debug!("Fetching traffic flow bbox={bbox} max_points={max_points}");
        retry::send_json(
            || self.traffic_flow_request(bbox, max_points),
            self.max_retries,
        )
        .await
    }

    async fn analytics_summary(
        &self,
        bbox: Option<&BoundingBox>,
    ) -> Result<AnalyticsSummary, ApiError> {
        log::debug!("Fetching analytics summary bbox={bbox:?}");
        retry::send_json(|| self.analytics_summary_request(bbox), self.max_retries).await
    }

    async fn risk_analysis(&self, request: RiskRequest) -> Result<RiskAssessment, ApiError> {
        log::debug!(
            "Requesting risk analysis at ({}, {}) r={}m",
            request.latitude,
            request.longitude,
            request.radius
        );
        retry::send_json(|| self.risk_analysis_request(&request), self.max_retries).await
    }

    async fn health(&self) -> Result<HealthReport, ApiError> {
        retry::send_json(|| self.health_request(), self.max_retries).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use reqwest::header::AUTHORIZATION;

    use super::*;

    fn api(token: Option<&str>) -> HttpDashboardApi {
        HttpDashboardApi::new(&ApiConfig {
            base_url: "http://localhost:8000/".to_string(),
            token: token.map(ToString::to_string),
            ..ApiConfig::default()
        })
        .unwrap()
    }

    fn bbox() -> BoundingBox {
        BoundingBox::try_new(-86.9, 36.0, -86.6, 36.3).unwrap()
    }

    fn query(request: &reqwest::Request) -> HashMap<String, String> {
        request.url().query_pairs().into_owned().collect()
    }

    #[test]
    fn incidents_request_carries_bbox_and_criticality() {
        let request = api(None)
            .incidents_request(&bbox(), Some(Criticality::Major))
            .build()
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/api/incidents");
        let q = query(&request);
        assert_eq!(q["bbox"], "-86.9,36,-86.6,36.3");
        assert_eq!(q["criticality"], "major");
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn incidents_request_omits_criticality_for_all() {
        let request = api(None).incidents_request(&bbox(), None).build().unwrap();
        assert!(!query(&request).contains_key("criticality"));
    }

    #[test]
    fn traffic_flow_request_carries_max_points() {
        let request = api(None)
            .traffic_flow_request(&bbox(), 100)
            .build()
            .unwrap();
        assert_eq!(request.url().path(), "/api/traffic-flow");
        assert_eq!(query(&request)["max_points"], "100");
    }

    #[test]
    fn analytics_request_bbox_is_optional() {
        let api = api(None);
        let without = api.analytics_summary_request(None).build().unwrap();
        assert_eq!(without.url().path(), "/api/analytics/summary");
        assert_eq!(without.url().query(), None);

        let with = api.analytics_summary_request(Some(&bbox())).build().unwrap();
        assert_eq!(query(&with)["bbox"], "-86.9,36,-86.6,36.3");
    }

    #[test]
    fn risk_request_posts_json_body() {
        let request = api(None)
            .risk_analysis_request(&RiskRequest {
                latitude: 36.1627,
                longitude: -86.7816,
                radius: 5000,
            })
            .build()
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/api/risk-analysis");
        let body = request.body().and_then(reqwest::Body::as_bytes).unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json["radius"], 5000);
        assert_eq!(json["latitude"], 36.1627);
    }

    #[test]
    fn token_is_sent_as_bearer_auth() {
        let request = api(Some("abc123")).health_request().build().unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8000/health");
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer abc123"
        );
    }
}
