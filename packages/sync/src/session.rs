//! The active viewport query.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crashlens_analytics_models::{AnalyticsSummary, IncidentStats};
use crashlens_incident_models::{Criticality, Incident};
use crashlens_pipeline::{FilterCriteria, SortKey};
use crashlens_viewport::{BoundingBox, Canonicalizer, Viewport};

use crate::{CacheEntry, Listener, QueryKey, QueryScheduler, Subscription};

fn lock(key: &Mutex<QueryKey>) -> MutexGuard<'_, QueryKey> {
    key.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks the map viewport and keeps exactly one incident query active.
///
/// Each viewport change is canonicalized into a [`QueryKey`]. When the key
/// changes, the session subscribes to the new key before releasing the old
/// one, so a key shared by both keeps its refresh timer. The listener only
/// hears about the key that is active at the time the update lands;
/// responses for keys the user has panned away from still fill the cache
/// but are not surfaced.
pub struct ViewportSession {
    scheduler: QueryScheduler,
    canonicalizer: Canonicalizer,
    bbox: BoundingBox,
    criticality: Option<Criticality>,
    active: Arc<Mutex<QueryKey>>,
    listener: Listener,
    subscription: Option<Subscription>,
}

impl std::fmt::Debug for ViewportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportSession")
            .field("bbox", &self.bbox)
            .field("criticality", &self.criticality)
            .field("active", &*lock(&self.active))
            .finish_non_exhaustive()
    }
}

impl ViewportSession {
    /// Starts a session on the scheduler's default box and resolves it.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        scheduler: QueryScheduler,
        canonicalizer: Canonicalizer,
        listener: Listener,
    ) -> Self {
        let default_bbox = scheduler.config().default_bbox;
        let bbox = canonicalizer
            .canonicalize(Viewport::from(default_bbox))
            .unwrap_or(default_bbox);
        let key = QueryKey::incidents(&bbox, None);

        let mut session = Self {
            scheduler,
            canonicalizer,
            bbox,
            criticality: None,
            active: Arc::new(Mutex::new(key.clone())),
            listener,
            subscription: None,
        };
        session.activate(key);
        session
    }

    /// Handles a map move or zoom.
    ///
    /// Returns `true` if the active key changed. Degenerate viewports are
    /// ignored and keep the previous key.
    pub fn on_viewport_change(&mut self, viewport: Viewport) -> bool {
        match self.canonicalizer.canonicalize(viewport) {
            Ok(bbox) => {
                self.bbox = bbox;
                self.activate(QueryKey::incidents(&bbox, self.criticality))
            }
            Err(e) => {
                log::debug!("Ignoring viewport: {e}");
                false
            }
        }
    }

    /// Changes the server-side criticality filter.
    ///
    /// Returns `true` if the active key changed.
    pub fn set_criticality(&mut self, criticality: Option<Criticality>) -> bool {
        self.criticality = criticality;
        self.activate(QueryKey::incidents(&self.bbox, criticality))
    }

    fn activate(&mut self, key: QueryKey) -> bool {
        let changed = self
            .subscription
            .as_ref()
            .is_none_or(|subscription| *subscription.key() != key);

        if changed {
            log::debug!("Active query is now {key}");
            *lock(&self.active) = key.clone();

            let active = Arc::clone(&self.active);
            let listener = Arc::clone(&self.listener);
            let subscription = self.scheduler.subscribe(
                &key,
                Arc::new(move |updated: &QueryKey, entry: &CacheEntry| {
                    let is_active = *lock(&active) == *updated;
                    if is_active {
                        listener(updated, entry);
                    } else {
                        log::debug!("Ignoring update for inactive {updated}");
                    }
                }),
            );
            self.subscription = Some(subscription);
        }

        self.scheduler.resolve(&key);
        changed
    }

    /// Key of the active query.
    #[must_use]
    pub fn active_key(&self) -> QueryKey {
        lock(&self.active).clone()
    }

    /// Canonical box of the active query.
    #[must_use]
    pub const fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Active criticality filter.
    #[must_use]
    pub const fn criticality(&self) -> Option<Criticality> {
        self.criticality
    }

    /// The scheduler backing this session.
    #[must_use]
    pub const fn scheduler(&self) -> &QueryScheduler {
        &self.scheduler
    }

    /// Current cache entry of the active key, without side effects.
    #[must_use]
    pub fn current(&self) -> CacheEntry {
        self.scheduler
            .entry(&self.active_key())
            .unwrap_or_default()
    }

    /// Cached incidents of the active key (empty until the first fetch
    /// lands).
    #[must_use]
    pub fn incidents(&self) -> Arc<[Incident]> {
        self.current()
            .incidents()
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Filtered and sorted incidents of the active key.
    #[must_use]
    pub fn view(&self, criteria: &FilterCriteria, sort: SortKey) -> Vec<Incident> {
        let incidents = self.incidents();
        crashlens_pipeline::apply(&incidents, criteria, sort)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Headline counters over the active key's incidents.
    #[must_use]
    pub fn stats(&self) -> IncidentStats {
        crashlens_analytics::stats(self.incidents().iter())
    }

    /// Client-side analytics over the active key's incidents.
    #[must_use]
    pub fn local_summary(&self, period: &str) -> AnalyticsSummary {
        crashlens_analytics::aggregate(self.incidents().iter(), period)
    }

    /// Manual refresh of the active key.
    pub async fn refresh(&self) -> CacheEntry {
        self.scheduler.refetch(&self.active_key()).await
    }
}
