#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dashboard configuration.
//!
//! Every field has a default, so an absent or partial TOML file is valid.
//! After the file is read, `CRASHLENS_API_URL` and `CRASHLENS_API_TOKEN`
//! override the API section.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crashlens_incident_models::risk::RiskThresholds;
use crashlens_viewport::{BoundingBox, ViewportError};
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`ApiConfig::base_url`].
pub const API_URL_ENV: &str = "CRASHLENS_API_URL";

/// Environment variable overriding [`ApiConfig::token`].
pub const API_TOKEN_ENV: &str = "CRASHLENS_API_TOKEN";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has the wrong shape.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },

    /// The default map viewport is degenerate.
    #[error("Invalid default viewport: {0}")]
    Viewport(#[from] ViewportError),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Backend API connection.
    pub api: ApiConfig,
    /// Cache and refresh policy.
    pub sync: SyncConfig,
    /// Initial map view.
    pub map: MapConfig,
    /// Risk legend thresholds.
    pub risk: RiskThresholds,
}

/// Backend API connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the dashboard API.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Bearer token sent with every request, if set.
    pub token: Option<String>,
    /// Retries for transient failures before a fetch is reported failed.
    pub max_retries: u32,
    /// Maximum number of traffic flow samples to request.
    pub max_flow_points: u32,
    /// Default radius for risk analysis, in meters.
    pub risk_radius_m: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 10,
            token: None,
            max_retries: 2,
            max_flow_points: 100,
            risk_radius_m: 5000,
        }
    }
}

impl ApiConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Cache and refresh policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Staleness threshold and refresh period for incidents.
    pub incident_ttl_secs: u64,
    /// Staleness threshold for traffic flow.
    pub flow_ttl_secs: u64,
    /// Staleness threshold and refresh period for the analytics summary.
    pub analytics_ttl_secs: u64,
    /// Upper bound on a single fetch, retries included. Must exceed
    /// `api.timeout_secs`, otherwise a timed-out request is never retried.
    pub fetch_timeout_secs: u64,
    /// Maximum number of cached query keys.
    pub max_entries: usize,
    /// Decimal places viewport boxes are snapped to. `None` disables
    /// quantization.
    pub bbox_precision: Option<u32>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            incident_ttl_secs: 60,
            flow_ttl_secs: 30,
            analytics_ttl_secs: 300,
            // Room for the default request timeout, two retries and backoff.
            fetch_timeout_secs: 35,
            max_entries: 64,
            bbox_precision: None,
        }
    }
}

impl SyncConfig {
    /// Incident staleness threshold.
    #[must_use]
    pub const fn incident_ttl(&self) -> Duration {
        Duration::from_secs(self.incident_ttl_secs)
    }

    /// Traffic flow staleness threshold.
    #[must_use]
    pub const fn flow_ttl(&self) -> Duration {
        Duration::from_secs(self.flow_ttl_secs)
    }

    /// Analytics summary staleness threshold.
    #[must_use]
    pub const fn analytics_ttl(&self) -> Duration {
        Duration::from_secs(self.analytics_ttl_secs)
    }

    /// Fetch timeout.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Initial map view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Map center as `[lat, lon]`.
    pub center: [f64; 2],
    /// Initial zoom level.
    pub zoom: u8,
    /// Latitude degrees from the center to each edge of the default box.
    pub span_lat: f64,
    /// Longitude degrees from the center to each edge of the default box.
    pub span_lon: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: [36.1627, -86.7816],
            zoom: 12,
            span_lat: 0.35,
            span_lon: 0.45,
        }
    }
}

impl MapConfig {
    /// The box queried before the map reports its first viewport.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Viewport`] if the spans produce a degenerate
    /// box.
    pub fn default_bbox(&self) -> Result<BoundingBox, ConfigError> {
        let [lat, lon] = self.center;
        Ok(BoundingBox::from_center_span(
            lat,
            lon,
            self.span_lat,
            self.span_lon,
        )?)
    }
}

impl DashboardConfig {
    /// Loads configuration from an optional TOML file, then applies the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if
    /// the result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                log::debug!("Loaded config from {}", path.display());
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without touching the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid config.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies environment overrides, reading variables through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(API_URL_ENV) {
            log::debug!("Using API URL from {API_URL_ENV}");
            self.api.base_url = url;
        }
        if let Some(token) = get(API_TOKEN_ENV) {
            self.api.token = Some(token);
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.api.base_url.trim().is_empty() {
            return invalid("api.base_url must not be empty");
        }
        if self.sync.incident_ttl_secs == 0
            || self.sync.flow_ttl_secs == 0
            || self.sync.analytics_ttl_secs == 0
        {
            return invalid("sync TTLs must be positive");
        }
        if self.sync.fetch_timeout_secs <= self.api.timeout_secs {
            return invalid("sync.fetch_timeout_secs must exceed api.timeout_secs");
        }
        if self.sync.max_entries == 0 {
            return invalid("sync.max_entries must be positive");
        }
        if self.risk.low_below > self.risk.moderate_below {
            return invalid("risk.low_below must not exceed risk.moderate_below");
        }

        self.map.default_bbox()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dashboard_settings() {
        let config = DashboardConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.sync.incident_ttl(), Duration::from_secs(60));
        assert_eq!(config.sync.flow_ttl(), Duration::from_secs(30));
        assert_eq!(config.sync.analytics_ttl(), Duration::from_secs(300));
        assert!(
            config.sync.fetch_timeout() > config.api.timeout() * (1 + config.api.max_retries),
            "default fetch budget must cover every retry"
        );
        assert_eq!(config.risk, RiskThresholds::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_bbox_spans_the_center() {
        let bbox = MapConfig::default().default_bbox().unwrap();
        assert!((bbox.south - (36.1627 - 0.35)).abs() < 1e-9);
        assert!((bbox.east - (-86.7816 + 0.45)).abs() < 1e-9);
        assert!(bbox.contains(36.1627, -86.7816));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = DashboardConfig::from_toml(
            r#"
            [api]
            base_url = "https://traffic.example.com"
            max_retries = 0

            [sync]
            bbox_precision = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://traffic.example.com");
        assert_eq!(config.api.max_retries, 0);
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.sync.bbox_precision, Some(3));
        assert_eq!(config.sync.incident_ttl_secs, 60);
        assert_eq!(config.map, MapConfig::default());
    }

    #[test]
    fn rejects_unparseable_toml() {
        assert!(matches!(
            DashboardConfig::from_toml("[sync]\nmax_entries = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_replace_api_settings() {
        let mut config = DashboardConfig::default();
        config.apply_overrides(|name| match name {
            API_URL_ENV => Some("http://10.0.0.5:8000".to_string()),
            API_TOKEN_ENV => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.api.base_url, "http://10.0.0.5:8000");
        assert_eq!(config.api.token.as_deref(), Some("secret"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = DashboardConfig::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.token, None);
    }

    #[test]
    fn validation_rejects_zero_ttl_and_inverted_thresholds() {
        let mut config = DashboardConfig::default();
        config.sync.flow_ttl_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = DashboardConfig::default();
        config.risk.low_below = 80;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = DashboardConfig::default();
        config.map.span_lat = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Viewport(_))));
    }

    #[test]
    fn validation_rejects_fetch_budget_below_request_timeout() {
        let mut config = DashboardConfig::default();
        config.sync.fetch_timeout_secs = config.api.timeout_secs;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fetch_timeout_secs"), "{err}");

        config.sync.fetch_timeout_secs = config.api.timeout_secs + 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_reports_its_path() {
        let path = Path::new("/nonexistent/crashlens/dashboard.toml");
        let err = DashboardConfig::load(Some(path)).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(
            err.to_string().contains("/nonexistent/crashlens/dashboard.toml"),
            "{err}"
        );
    }
}
