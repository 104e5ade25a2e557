//! Key-addressed query cache with staleness tracking, fetch
//! de-duplication, and subscription-scoped refresh timers.
//!
//! All cache state lives behind one `std::sync::Mutex` that is only held
//! for short synchronous sections and never across an `.await`. Fetches
//! run as spawned tasks. Every fetch takes a sequence number from a global
//! counter when it is issued, and a completed fetch is applied to its key
//! only if that number is newer than the one the entry already holds, so
//! the last issued request wins no matter which response arrives first.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use crashlens_client::{ApiError, DashboardApi};
use crashlens_viewport::BboxKey;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{CacheEntry, Listener, Payload, QueryKey, SchedulerConfig, SyncError};

/// Shortest refresh period a timer will run with.
const MIN_REFRESH_PERIOD: Duration = Duration::from_millis(100);

struct Slot {
    entry: CacheEntry,
    /// Sequence number of the tracked in-flight fetch.
    in_flight: Option<u64>,
    /// Sequence number of the fetch whose result `entry` reflects.
    applied_seq: u64,
    /// Set by `invalidate`; the next resolve refetches regardless of age.
    forced: bool,
    subscribers: BTreeMap<u64, Listener>,
    timer: Option<JoinHandle<()>>,
    last_used: u64,
    /// Highest sequence number that has completed for this key.
    settled: watch::Sender<u64>,
}

impl Slot {
    fn new(tick: u64) -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            entry: CacheEntry::default(),
            in_flight: None,
            applied_seq: 0,
            forced: false,
            subscribers: BTreeMap::new(),
            timer: None,
            last_used: tick,
            settled,
        }
    }

    fn evictable(&self) -> bool {
        self.subscribers.is_empty() && self.in_flight.is_none()
    }
}

#[derive(Default)]
struct State {
    slots: HashMap<QueryKey, Slot>,
    tick: u64,
    next_subscriber: u64,
}

impl State {
    /// Returns the slot for `key`, creating it if needed, and marks it as
    /// most recently used.
    fn slot(&mut self, key: &QueryKey) -> &mut Slot {
        self.tick += 1;
        let tick = self.tick;
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(tick));
        slot.last_used = tick;
        slot
    }

    /// Drops least recently used slots until at most `max` remain. Slots
    /// with subscribers or a tracked fetch, and `keep` itself, are never
    /// evicted.
    fn evict(&mut self, max: usize, keep: &QueryKey) {
        while self.slots.len() > max {
            let victim = self
                .slots
                .iter()
                .filter(|(key, slot)| *key != keep && slot.evictable())
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone());

            let Some(victim) = victim else {
                log::debug!(
                    "Cache holds {} keys (limit {max}) but all are in use",
                    self.slots.len()
                );
                break;
            };
            log::debug!("Evicting {victim}");
            self.slots.remove(&victim);
        }
    }
}

struct Inner {
    api: Arc<dyn DashboardApi>,
    config: SchedulerConfig,
    state: Mutex<State>,
    seq: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for slot in state.slots.values_mut() {
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
        }
    }
}

/// Outcome of [`Inner::begin`].
struct Begin {
    entry: CacheEntry,
    started: Option<u64>,
    waiting: Option<(u64, watch::Receiver<u64>)>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Issues a fetch for `key` when none is tracked and the entry is
    /// missing, stale, errored, invalidated, or `force` is set.
    fn begin(&self, key: &QueryKey, force: bool) -> Begin {
        let ttl = self.config.ttl(key.kind());
        let now = Instant::now();
        let mut state = self.lock();
        let slot = state.slot(key);

        let wanted =
            force || slot.forced || slot.entry.has_error() || slot.entry.is_stale(ttl, now);
        let started = if slot.in_flight.is_none() && wanted {
            let seq = self.next_seq();
            slot.in_flight = Some(seq);
            slot.forced = false;
            slot.entry.in_flight = true;
            Some(seq)
        } else {
            None
        };

        let waiting = slot.in_flight.map(|seq| (seq, slot.settled.subscribe()));
        let entry = slot.entry.clone();
        state.evict(self.config.max_entries, key);

        Begin {
            entry,
            started,
            waiting,
        }
    }

    async fn load(&self, key: &QueryKey) -> Result<Payload, SyncError> {
        Ok(match key {
            QueryKey::Incidents { bbox, criticality } => {
                let bbox = bbox.to_bbox()?;
                let incidents = self.api.incidents(&bbox, *criticality).await?;
                Payload::Incidents(incidents.into())
            }
            QueryKey::TrafficFlow { bbox, max_points } => {
                let bbox = bbox.to_bbox()?;
                let flow = self.api.traffic_flow(&bbox, *max_points).await?;
                Payload::TrafficFlow(Arc::new(flow))
            }
            QueryKey::AnalyticsSummary { bbox } => {
                let bbox = bbox.as_ref().map(BboxKey::to_bbox).transpose()?;
                let summary = self.api.analytics_summary(bbox.as_ref()).await?;
                Payload::AnalyticsSummary(Arc::new(summary))
            }
        })
    }

    /// Records a finished fetch and notifies subscribers if it was applied.
    fn complete(&self, key: &QueryKey, seq: u64, result: Result<Payload, SyncError>) {
        let (listeners, entry) = {
            let mut state = self.lock();
            let Some(slot) = state.slots.get_mut(key) else {
                log::debug!("Dropping response for evicted key {key} (seq {seq})");
                return;
            };

            if slot.in_flight == Some(seq) {
                slot.in_flight = None;
                slot.entry.in_flight = false;
            }

            let applied = seq > slot.applied_seq;
            if applied {
                slot.applied_seq = seq;
                match result {
                    Ok(payload) => {
                        log::debug!("Fetched {key} (seq {seq})");
                        slot.entry.data = Some(payload);
                        slot.entry.fetched_at = Some(Instant::now());
                        slot.entry.fetched_at_utc = Some(Utc::now());
                        slot.entry.error = None;
                    }
                    Err(e) => {
                        log::warn!("Fetch for {key} failed: {e}");
                        slot.entry.error = Some(e.to_string());
                    }
                }
            } else {
                log::debug!(
                    "Discarding superseded response for {key} (seq {seq}, applied {})",
                    slot.applied_seq
                );
            }

            slot.settled.send_if_modified(|settled| {
                if seq > *settled {
                    *settled = seq;
                    true
                } else {
                    false
                }
            });

            if !applied {
                return;
            }
            (
                slot.subscribers.values().cloned().collect::<Vec<_>>(),
                slot.entry.clone(),
            )
        };

        for listener in listeners {
            listener(key, &entry);
        }
    }
}

/// Query cache and refresh scheduler.
///
/// Cheap to clone; clones share the same cache. Methods that may start a
/// fetch spawn a Tokio task and must be called from within a runtime.
#[derive(Clone)]
pub struct QueryScheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for QueryScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryScheduler")
            .field("config", &self.inner.config)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl QueryScheduler {
    /// Creates an empty scheduler over `api`.
    #[must_use]
    pub fn new(api: Arc<dyn DashboardApi>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                config,
                state: Mutex::new(State::default()),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Construction parameters.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Returns the current entry for `key` immediately, possibly stale or
    /// empty, and starts a background fetch if one is due.
    ///
    /// A resolve for a key whose fetch is already running attaches to it
    /// instead of issuing another request.
    pub fn resolve(&self, key: &QueryKey) -> CacheEntry {
        let begin = self.inner.begin(key, false);
        if let Some(seq) = begin.started {
            self.spawn_fetch(key.clone(), seq);
        }
        begin.entry
    }

    /// Resolves `key` and waits for its in-flight fetch, if any, to finish.
    pub async fn fetch(&self, key: &QueryKey) -> CacheEntry {
        let begin = self.inner.begin(key, false);
        if let Some(seq) = begin.started {
            self.spawn_fetch(key.clone(), seq);
        }

        if let Some((target, mut settled)) = begin.waiting
            && settled.wait_for(|done| *done >= target).await.is_err()
        {
            log::debug!("{key} was evicted before its fetch settled");
        }

        self.entry(key).unwrap_or_default()
    }

    /// Forces the next resolve of `key` to refetch.
    ///
    /// A fetch already in flight is detached: it may still complete, but it
    /// no longer blocks a new fetch and is applied only if nothing newer has
    /// been applied by then.
    pub fn invalidate(&self, key: &QueryKey) {
        let mut state = self.inner.lock();
        if let Some(slot) = state.slots.get_mut(key) {
            slot.forced = true;
            if let Some(seq) = slot.in_flight.take() {
                log::debug!("Detaching in-flight fetch for {key} (seq {seq})");
                slot.entry.in_flight = false;
            }
        }
    }

    /// Manual refresh: invalidates `key` and waits for the new fetch.
    pub async fn refetch(&self, key: &QueryKey) -> CacheEntry {
        self.invalidate(key);
        self.fetch(key).await
    }

    /// Peeks at the entry for `key` without touching recency or starting a
    /// fetch.
    #[must_use]
    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner
            .lock()
            .slots
            .get(key)
            .map(|slot| slot.entry.clone())
    }

    /// Registers `listener` for updates to `key`.
    ///
    /// The first subscription for a key starts a timer that refreshes it
    /// every TTL; dropping the last [`Subscription`] stops it. Subscribing
    /// does not fetch by itself.
    pub fn subscribe(&self, key: &QueryKey, listener: Listener) -> Subscription {
        let mut state = self.inner.lock();
        state.next_subscriber += 1;
        let id = state.next_subscriber;

        let slot = state.slot(key);
        slot.subscribers.insert(id, listener);
        if slot.timer.is_none() {
            log::debug!("Starting refresh timer for {key}");
            slot.timer = Some(self.spawn_timer(key.clone()));
        }
        state.evict(self.inner.config.max_entries, key);

        Subscription {
            inner: Arc::downgrade(&self.inner),
            key: key.clone(),
            id,
        }
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live subscriptions for `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.inner
            .lock()
            .slots
            .get(key)
            .map_or(0, |slot| slot.subscribers.len())
    }

    /// Number of running refresh timers.
    #[must_use]
    pub fn refresh_timer_count(&self) -> usize {
        self.inner
            .lock()
            .slots
            .values()
            .filter(|slot| slot.timer.is_some())
            .count()
    }

    fn refresh(&self, key: &QueryKey) {
        let begin = self.inner.begin(key, true);
        if let Some(seq) = begin.started {
            self.spawn_fetch(key.clone(), seq);
        }
    }

    fn spawn_fetch(&self, key: QueryKey, seq: u64) {
        log::debug!("Fetching {key} (seq {seq})");
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let timeout = inner.config.fetch_timeout;
            let result = tokio::time::timeout(timeout, inner.load(&key))
                .await
                .unwrap_or_else(|_| Err(ApiError::Timeout { after: timeout }.into()));
            inner.complete(&key, seq, result);
        });
    }

    fn spawn_timer(&self, key: QueryKey) -> JoinHandle<()> {
        let period = self
            .inner
            .config
            .ttl(key.kind())
            .max(MIN_REFRESH_PERIOD);
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            // The subscriber resolves right away, so the first tick is one
            // period out.
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                QueryScheduler { inner }.refresh(&key);
            }
        })
    }
}

/// Keeps a listener registered; dropping it unsubscribes.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    inner: Weak<Inner>,
    key: QueryKey,
    id: u64,
}

impl Subscription {
    /// The subscribed key.
    #[must_use]
    pub const fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = inner.lock();
        let Some(slot) = state.slots.get_mut(&self.key) else {
            return;
        };

        slot.subscribers.remove(&self.id);
        if slot.subscribers.is_empty()
            && let Some(timer) = slot.timer.take()
        {
            log::debug!("Stopping refresh timer for {}", self.key);
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

    use crashlens_incident_models::Criticality;
    use crashlens_viewport::BoundingBox;

    use super::*;
    use crate::test_support::{FakeApi, ids, incident, settle, unavailable};

    fn bbox() -> BoundingBox {
        BoundingBox::try_new(-86.9, 36.0, -86.6, 36.3).unwrap()
    }

    fn key() -> QueryKey {
        QueryKey::incidents(&bbox(), None)
    }

    fn scheduler(api: &Arc<FakeApi>) -> QueryScheduler {
        QueryScheduler::new(api.clone(), SchedulerConfig::new(bbox()))
    }

    fn noop() -> Listener {
        Arc::new(|_: &QueryKey, _: &CacheEntry| {})
    }

    fn shifted(i: u32) -> QueryKey {
        let d = f64::from(i);
        QueryKey::incidents(
            &BoundingBox::try_new(-87.0 + d, 36.0, -86.5 + d, 36.5).unwrap(),
            None,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_resolves_share_one_fetch() {
        let api = FakeApi::gated();
        let s = scheduler(&api);

        let first = s.resolve(&key());
        assert!(first.data.is_none());
        assert!(first.in_flight);
        settle().await;

        let second = s.resolve(&key());
        assert!(second.in_flight);
        settle().await;
        assert_eq!(api.calls(), 1, "second resolve must attach to the running fetch");

        api.release(0, Ok(vec![incident("a")]));
        settle().await;
        let entry = s.entry(&key()).unwrap();
        assert_eq!(ids(&entry), vec!["a"]);
        assert!(!entry.in_flight);
        assert!(entry.fetched_at_utc.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_fetches_wait_for_the_same_result() {
        let api = FakeApi::auto();
        let s = scheduler(&api);

        let k = key();
        let (a, b) = tokio::join!(s.fetch(&k), s.fetch(&k));
        assert_eq!(api.calls(), 1);
        assert_eq!(ids(&a), vec!["call-1"]);
        assert_eq!(ids(&b), vec!["call-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_are_served_from_cache() {
        let api = FakeApi::auto();
        let s = scheduler(&api);

        s.fetch(&key()).await;
        tokio::time::advance(Duration::from_secs(59)).await;

        let entry = s.resolve(&key());
        settle().await;
        assert_eq!(ids(&entry), vec!["call-1"]);
        assert!(!entry.in_flight);
        assert_eq!(api.calls(), 1, "entry within TTL must not refetch");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_returned_while_revalidating() {
        let api = FakeApi::auto();
        let s = scheduler(&api);

        s.fetch(&key()).await;
        tokio::time::advance(Duration::from_secs(60)).await;

        let entry = s.resolve(&key());
        assert_eq!(ids(&entry), vec!["call-1"], "stale data is returned immediately");
        assert!(entry.in_flight);

        settle().await;
        assert_eq!(ids(&s.entry(&key()).unwrap()), vec!["call-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn staleness_threshold_depends_on_data_kind() {
        let api = FakeApi::auto();
        let s = scheduler(&api);
        let flow = QueryKey::traffic_flow(&bbox(), 100);

        let entry = s.fetch(&flow).await;
        let count = entry
            .data
            .as_ref()
            .and_then(Payload::traffic_flow)
            .map(|f| f.count);
        assert_eq!(count, Some(100));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(s.resolve(&flow).in_flight, "flow goes stale after 30s");

        let summary = QueryKey::analytics_summary(None);
        s.fetch(&summary).await;
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!s.resolve(&summary).in_flight, "analytics stays fresh for 5 minutes");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_keeps_last_good_data() {
        let api = FakeApi::auto();
        let s = scheduler(&api);
        s.fetch(&key()).await;

        api.set_failing(true);
        let entry = s.refetch(&key()).await;
        assert!(entry.has_error());
        assert_eq!(ids(&entry), vec!["call-1"]);

        // An errored entry is retried by the next resolve.
        api.set_failing(false);
        let entry = s.fetch(&key()).await;
        assert!(!entry.has_error(), "success clears the error flag");
        assert_eq!(ids(&entry), vec!["call-3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch() {
        let api = FakeApi::auto();
        let s = scheduler(&api);
        s.fetch(&key()).await;

        s.invalidate(&key());
        assert!(s.resolve(&key()).in_flight);
        settle().await;
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_issuance_wins_when_responses_arrive_out_of_order() {
        let api = FakeApi::gated();
        let s = scheduler(&api);

        s.resolve(&key());
        settle().await;
        s.invalidate(&key());
        s.resolve(&key());
        settle().await;
        assert_eq!(api.calls(), 2);

        api.release(1, Ok(vec![incident("newer")]));
        settle().await;
        api.release(0, Ok(vec![incident("older")]));
        settle().await;

        assert_eq!(ids(&s.entry(&key()).unwrap()), vec!["newer"]);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_issuance_wins_when_responses_arrive_in_order() {
        let api = FakeApi::gated();
        let s = scheduler(&api);

        s.resolve(&key());
        settle().await;
        s.invalidate(&key());
        s.resolve(&key());
        settle().await;

        api.release(0, Ok(vec![incident("older")]));
        settle().await;
        assert_eq!(ids(&s.entry(&key()).unwrap()), vec!["older"]);

        api.release(1, Ok(vec![incident("newer")]));
        settle().await;
        assert_eq!(ids(&s.entry(&key()).unwrap()), vec!["newer"]);
    }

    #[tokio::test(start_paused = true)]
    async fn detached_failure_does_not_override_newer_success() {
        let api = FakeApi::gated();
        let s = scheduler(&api);

        s.resolve(&key());
        settle().await;
        s.invalidate(&key());
        s.resolve(&key());
        settle().await;

        api.release(1, Ok(vec![incident("newer")]));
        settle().await;
        api.release(0, Err(unavailable()));
        settle().await;

        let entry = s.entry(&key()).unwrap();
        assert!(!entry.has_error());
        assert_eq!(ids(&entry), vec!["newer"]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_failure_for_one_key_leaves_another_key_untouched() {
        let api = FakeApi::gated();
        let s = scheduler(&api);
        let first = shifted(0);
        let second = shifted(1);
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);
        let _sub = s.subscribe(
            &second,
            Arc::new(move |_: &QueryKey, _: &CacheEntry| {
                counter.fetch_add(1, SeqCst);
            }),
        );

        s.resolve(&first);
        settle().await;
        s.resolve(&second);
        settle().await;
        assert_eq!(api.calls(), 2);

        api.release(1, Ok(vec![incident("b")]));
        settle().await;
        api.release(0, Err(unavailable()));
        settle().await;

        let entry = s.entry(&second).unwrap();
        assert_eq!(ids(&entry), vec!["b"]);
        assert!(!entry.has_error(), "a failure for another key must not leak");
        assert_eq!(updates.load(SeqCst), 1);

        let entry = s.entry(&first).unwrap();
        assert!(entry.has_error());
        assert!(entry.data.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn criticality_keys_are_independent() {
        let api = FakeApi::auto();
        let s = scheduler(&api);
        let all = QueryKey::incidents(&bbox(), None);
        let major = QueryKey::incidents(&bbox(), Some(Criticality::Major));

        s.fetch(&all).await;
        s.fetch(&major).await;
        assert_eq!(api.calls(), 2);
        assert_eq!(s.len(), 2);
        assert_eq!(api.requests()[1].1, Some(Criticality::Major));
        assert_eq!(api.requests()[1].0, "-86.9,36,-86.6,36.3");
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_timeout_marks_entry_failed() {
        let api = FakeApi::gated();
        let s = scheduler(&api);

        // The paused clock auto-advances to the timeout while we wait.
        let entry = s.fetch(&key()).await;
        assert!(!entry.in_flight);
        assert!(entry.data.is_none());
        let message = entry.error.unwrap();
        assert!(message.contains("timed out"), "got {message}");
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_timer_lives_with_subscriptions() {
        let api = FakeApi::auto();
        let s = scheduler(&api);

        let a = s.subscribe(&key(), noop());
        let b = s.subscribe(&key(), noop());
        assert_eq!(s.refresh_timer_count(), 1);
        assert_eq!(s.subscriber_count(&key()), 2);

        drop(a);
        assert_eq!(s.refresh_timer_count(), 1);
        drop(b);
        assert_eq!(s.refresh_timer_count(), 0);
        assert_eq!(s.subscriber_count(&key()), 0);

        tokio::time::advance(Duration::from_secs(180)).await;
        settle().await;
        assert_eq!(api.calls(), 0, "no refresh after the last subscriber left");
    }

    #[tokio::test(start_paused = true)]
    async fn subscribed_keys_refresh_every_ttl() {
        let api = FakeApi::auto();
        let s = scheduler(&api);
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);

        let _sub = s.subscribe(
            &key(),
            Arc::new(move |_: &QueryKey, _: &CacheEntry| {
                counter.fetch_add(1, SeqCst);
            }),
        );
        s.fetch(&key()).await;
        assert_eq!(api.calls(), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(api.calls(), 2);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(api.calls(), 3);
        assert_eq!(updates.load(SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn lru_evicts_least_recently_used_keys() {
        let api = FakeApi::auto();
        let mut config = SchedulerConfig::new(bbox());
        config.max_entries = 2;
        let s = QueryScheduler::new(api.clone(), config);

        s.fetch(&shifted(0)).await;
        s.fetch(&shifted(1)).await;
        s.resolve(&shifted(0));
        settle().await;
        s.fetch(&shifted(2)).await;

        assert_eq!(s.len(), 2);
        assert!(s.entry(&shifted(1)).is_none());
        assert!(s.entry(&shifted(0)).is_some());
        assert!(s.entry(&shifted(2)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn lru_never_evicts_subscribed_keys() {
        let api = FakeApi::auto();
        let mut config = SchedulerConfig::new(bbox());
        config.max_entries = 1;
        let s = QueryScheduler::new(api.clone(), config);

        let _pin = s.subscribe(&shifted(0), noop());
        s.fetch(&shifted(0)).await;
        s.fetch(&shifted(1)).await;
        s.fetch(&shifted(2)).await;

        assert!(s.entry(&shifted(0)).is_some());
        assert!(s.entry(&shifted(1)).is_none());
        assert!(s.entry(&shifted(2)).is_some());
    }
}
