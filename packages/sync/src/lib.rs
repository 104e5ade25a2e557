#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Viewport-driven data synchronization.
//!
//! [`QueryScheduler`] is a key-addressed cache over the dashboard API. Each
//! [`QueryKey`] has at most one tracked fetch in flight, a staleness
//! threshold that depends on its [`DataKind`], and an optional periodic
//! refresh timer that lives exactly as long as the key has subscribers.
//!
//! [`ViewportSession`] sits on top: it canonicalizes map viewports into
//! keys, keeps one subscription for the active key, and only surfaces
//! updates that belong to it.

pub mod scheduler;
pub mod session;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crashlens_analytics_models::AnalyticsSummary;
use crashlens_client::ApiError;
use crashlens_incident_models::{Criticality, Incident, flow::FlowSnapshot};
use crashlens_viewport::{BboxKey, BoundingBox, ViewportError};
use strum_macros::{AsRefStr, Display};
use tokio::time::Instant;

pub use scheduler::{QueryScheduler, Subscription};
pub use session::ViewportSession;

/// Errors produced while loading a query.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The API call failed or timed out.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A cache key did not describe a valid bounding box.
    #[error("Invalid query bbox: {0}")]
    Viewport(#[from] ViewportError),
}

/// The kind of data a query returns. Staleness thresholds are per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DataKind {
    /// Incident lists.
    Incidents,
    /// Traffic flow snapshots.
    TrafficFlow,
    /// Analytics summaries.
    AnalyticsSummary,
}

/// Identity of a logical query. Equal keys share one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryKey {
    /// Incidents in a box, optionally restricted to one criticality.
    Incidents {
        /// Canonical box.
        bbox: BboxKey,
        /// Criticality filter applied server-side.
        criticality: Option<Criticality>,
    },
    /// Traffic flow samples in a box.
    TrafficFlow {
        /// Canonical box.
        bbox: BboxKey,
        /// Sample limit.
        max_points: u32,
    },
    /// Analytics summary, global or limited to a box.
    AnalyticsSummary {
        /// Canonical box, if any.
        bbox: Option<BboxKey>,
    },
}

impl QueryKey {
    /// Incident query for a canonical box.
    #[must_use]
    pub fn incidents(bbox: &BoundingBox, criticality: Option<Criticality>) -> Self {
        Self::Incidents {
            bbox: bbox.key(),
            criticality,
        }
    }

    /// Traffic flow query for a canonical box.
    #[must_use]
    pub fn traffic_flow(bbox: &BoundingBox, max_points: u32) -> Self {
        Self::TrafficFlow {
            bbox: bbox.key(),
            max_points,
        }
    }

    /// Analytics summary query.
    #[must_use]
    pub fn analytics_summary(bbox: Option<&BoundingBox>) -> Self {
        Self::AnalyticsSummary {
            bbox: bbox.map(BoundingBox::key),
        }
    }

    /// The data kind this key returns.
    #[must_use]
    pub const fn kind(&self) -> DataKind {
        match self {
            Self::Incidents { .. } => DataKind::Incidents,
            Self::TrafficFlow { .. } => DataKind::TrafficFlow,
            Self::AnalyticsSummary { .. } => DataKind::AnalyticsSummary,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incidents { bbox, criticality } => match criticality {
                Some(c) => write!(f, "incidents[{bbox}|{c}]"),
                None => write!(f, "incidents[{bbox}]"),
            },
            Self::TrafficFlow { bbox, max_points } => {
                write!(f, "traffic_flow[{bbox}|{max_points}]")
            }
            Self::AnalyticsSummary { bbox: Some(bbox) } => write!(f, "analytics[{bbox}]"),
            Self::AnalyticsSummary { bbox: None } => write!(f, "analytics[*]"),
        }
    }
}

/// Cached query result. Cloning is cheap: the data sits behind an `Arc`.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Normalized incidents.
    Incidents(Arc<[Incident]>),
    /// Traffic flow snapshot.
    TrafficFlow(Arc<FlowSnapshot>),
    /// Analytics summary.
    AnalyticsSummary(Arc<AnalyticsSummary>),
}

impl Payload {
    /// The incidents, if this is an incident payload.
    #[must_use]
    pub const fn incidents(&self) -> Option<&Arc<[Incident]>> {
        match self {
            Self::Incidents(items) => Some(items),
            _ => None,
        }
    }

    /// The flow snapshot, if this is a flow payload.
    #[must_use]
    pub const fn traffic_flow(&self) -> Option<&Arc<FlowSnapshot>> {
        match self {
            Self::TrafficFlow(flow) => Some(flow),
            _ => None,
        }
    }

    /// The summary, if this is an analytics payload.
    #[must_use]
    pub const fn analytics_summary(&self) -> Option<&Arc<AnalyticsSummary>> {
        match self {
            Self::AnalyticsSummary(summary) => Some(summary),
            _ => None,
        }
    }
}

/// Snapshot of one key's cache state.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    /// Last successfully fetched data. Kept when a later fetch fails.
    pub data: Option<Payload>,
    /// When `data` was fetched (monotonic clock).
    pub fetched_at: Option<Instant>,
    /// When `data` was fetched (wall clock), for display.
    pub fetched_at_utc: Option<DateTime<Utc>>,
    /// Message of the most recent failed fetch; cleared on success.
    pub error: Option<String>,
    /// Whether a tracked fetch is currently running.
    pub in_flight: bool,
}

impl CacheEntry {
    /// Returns `true` if the data is missing or at least `ttl` old.
    #[must_use]
    pub fn is_stale(&self, ttl: Duration, now: Instant) -> bool {
        self.fetched_at
            .is_none_or(|at| now.saturating_duration_since(at) >= ttl)
    }

    /// Returns `true` if the last fetch failed.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Cached incidents, if any.
    #[must_use]
    pub fn incidents(&self) -> Option<&Arc<[Incident]>> {
        self.data.as_ref().and_then(Payload::incidents)
    }
}

/// Scheduler construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Staleness threshold and refresh period for incidents.
    pub incident_ttl: Duration,
    /// Staleness threshold and refresh period for traffic flow.
    pub flow_ttl: Duration,
    /// Staleness threshold and refresh period for analytics summaries.
    pub analytics_ttl: Duration,
    /// Box queried before the first viewport is known.
    pub default_bbox: BoundingBox,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
    /// Maximum number of cached keys.
    pub max_entries: usize,
}

impl SchedulerConfig {
    /// Config with the dashboard's default thresholds.
    #[must_use]
    pub const fn new(default_bbox: BoundingBox) -> Self {
        Self {
            incident_ttl: Duration::from_secs(60),
            flow_ttl: Duration::from_secs(30),
            analytics_ttl: Duration::from_secs(300),
            default_bbox,
            fetch_timeout: Duration::from_secs(35),
            max_entries: 64,
        }
    }

    /// Staleness threshold for a data kind.
    #[must_use]
    pub const fn ttl(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::Incidents => self.incident_ttl,
            DataKind::TrafficFlow => self.flow_ttl,
            DataKind::AnalyticsSummary => self.analytics_ttl,
        }
    }
}

/// Callback invoked when a key's entry changes.
pub type Listener = Arc<dyn Fn(&QueryKey, &CacheEntry) + Send + Sync>;
