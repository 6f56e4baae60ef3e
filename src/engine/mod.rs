//! The sync engine: owns the event cache, the per-source refresh timers,
//! and the live source set, and coordinates concurrent refreshes.
//!
//! All cache and settings writes funnel through one commit lock, so a
//! manual refresh and a timer fire racing on the same source cannot
//! interleave their updates. Disabling or deleting a source removes its
//! cache entry synchronously; an in-flight fetch for it is left to finish
//! and its result is discarded at commit time.

pub mod event_cache;
pub mod scheduler;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::app::{AlmanacError, Result};
use crate::cache::CacheStore;
use crate::config::{Settings, SettingsStore, HOLIDAY_SOURCE_ID};
use crate::domain::{expand_holidays, HolidayMap, Source, Trigger};
use crate::fetcher::{EventFetcher, FetchOutcome};

pub use event_cache::{EventCache, EventsSnapshot};
pub use scheduler::RefreshScheduler;

/// Cap on simultaneous in-flight feed fetches during a full refresh.
pub const MAX_CONCURRENT_FETCHES: usize = 8;

pub struct SyncEngine {
    settings: Arc<SettingsStore>,
    fetcher: Arc<EventFetcher>,
    cache_store: Arc<CacheStore>,
    event_cache: EventCache,
    scheduler: RefreshScheduler,
    /// Live working set: enabled configured sources plus the synthetic
    /// holiday source. Mutated only under `commit_lock` once running.
    sources: RwLock<HashMap<String, Source>>,
    commit_lock: Mutex<()>,
    fetch_permits: Arc<Semaphore>,
    events_tx: watch::Sender<EventsSnapshot>,
    holidays_tx: watch::Sender<HolidayMap>,
    /// Handed to timer tasks so they never keep the engine alive.
    self_ref: Weak<SyncEngine>,
}

impl SyncEngine {
    pub fn new(
        settings: Arc<SettingsStore>,
        fetcher: Arc<EventFetcher>,
        cache_store: Arc<CacheStore>,
    ) -> Arc<Self> {
        let (events_tx, _) = watch::channel(EventsSnapshot::new());
        let (holidays_tx, _) = watch::channel(HolidayMap::new());

        let engine = Arc::new_cyclic(|weak| Self {
            settings: settings.clone(),
            fetcher,
            cache_store,
            event_cache: EventCache::new(),
            scheduler: RefreshScheduler::new(),
            sources: RwLock::new(HashMap::new()),
            commit_lock: Mutex::new(()),
            fetch_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES)),
            events_tx,
            holidays_tx,
            self_ref: weak.clone(),
        });
        engine.load_live_set(&settings.get());
        engine
    }

    /// Arm all timers and run the startup refresh (cache-first for fresh
    /// sources, per the skip-network policy).
    pub async fn start(&self) -> Result<EventsSnapshot> {
        let snapshot = self.refresh_all(Trigger::Startup).await?;
        if self.contains_source(HOLIDAY_SOURCE_ID) {
            self.refresh_one(HOLIDAY_SOURCE_ID, Trigger::Startup).await?;
        }
        // Timers arm against the freshness state the initial refresh just
        // established; arming first would fire a never-fetched source's
        // floored timer right behind the startup fetch.
        self.arm_all();
        Ok(snapshot)
    }

    /// Cancel every scheduled task. The engine can be restarted with
    /// [`Self::arm_all`].
    pub fn shutdown(&self) {
        self.scheduler.disarm_all();
    }

    pub fn snapshot(&self) -> EventsSnapshot {
        self.event_cache.snapshot()
    }

    pub fn subscribe_events(&self) -> watch::Receiver<EventsSnapshot> {
        self.events_tx.subscribe()
    }

    pub fn subscribe_holidays(&self) -> watch::Receiver<HolidayMap> {
        self.holidays_tx.subscribe()
    }

    /// Current live sources, holiday feed included.
    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self
            .sources
            .read()
            .expect("sources lock poisoned")
            .values()
            .cloned()
            .collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));
        sources
    }

    // ---- refresh paths -------------------------------------------------

    /// Fetch every enabled configured source concurrently and merge the
    /// results. One source failing (even cachelessly) yields an empty list
    /// for that source only; the returned mapping always covers the full
    /// enabled set at call time.
    pub async fn refresh_all(&self, trigger: Trigger) -> Result<EventsSnapshot> {
        let targets: Vec<Source> = {
            self.sources
                .read()
                .expect("sources lock poisoned")
                .values()
                .filter(|s| s.is_enabled && s.id != HOLIDAY_SOURCE_ID)
                .cloned()
                .collect()
        };

        let mut ids: Vec<String> = Vec::new();
        let mut tasks: Vec<JoinHandle<FetchOutcome>> = Vec::new();
        for source in targets {
            let fetcher = self.fetcher.clone();
            let permits = self.fetch_permits.clone();
            ids.push(source.id.clone());
            tasks.push(tokio::spawn(async move {
                let _permit = permits.acquire().await.expect("Semaphore closed");
                fetcher.fetch(&source, trigger).await
            }));
        }

        let mut outcomes: Vec<(String, FetchOutcome)> = Vec::new();
        for (id, joined) in ids.into_iter().zip(futures::future::join_all(tasks).await) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Fetch task for {} failed: {}", id, e);
                    FetchOutcome {
                        events: Vec::new(),
                        fetched_at: None,
                    }
                }
            };
            outcomes.push((id, outcome));
        }

        let persisted = {
            let _guard = self.commit_lock.lock().await;
            for (id, outcome) in &outcomes {
                self.apply_outcome(id, outcome);
            }
            self.notify_events();
            self.persist_sources()
        };

        let results: EventsSnapshot = outcomes
            .into_iter()
            .map(|(id, outcome)| (id, outcome.events))
            .collect();

        match persisted {
            Err(e) if trigger.surfaces_persist_errors() => Err(e),
            Err(e) => {
                tracing::warn!("Settings persist failed after refresh: {}", e);
                Ok(results)
            }
            Ok(()) => Ok(results),
        }
    }

    /// Fetch one source and publish its result. The result is discarded if
    /// the source was disabled or deleted while the fetch was in flight.
    pub async fn refresh_one(&self, source_id: &str, trigger: Trigger) -> Result<()> {
        let source = {
            self.sources
                .read()
                .expect("sources lock poisoned")
                .get(source_id)
                .filter(|s| s.is_enabled)
                .cloned()
        }
        .ok_or_else(|| AlmanacError::SourceNotFound(source_id.to_string()))?;

        let outcome = self.fetcher.fetch(&source, trigger).await;

        let persisted = {
            let _guard = self.commit_lock.lock().await;
            if !self.apply_outcome(source_id, &outcome) {
                tracing::debug!("Discarded stale refresh result for {}", source_id);
                return Ok(());
            }
            if source_id == HOLIDAY_SOURCE_ID {
                // Synthetic source: nothing to persist in the settings file.
                return Ok(());
            }
            self.notify_events();
            self.persist_sources()
        };

        match persisted {
            Err(e) if trigger.surfaces_persist_errors() => Err(e),
            Err(e) => {
                tracing::warn!("Settings persist failed after refresh: {}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Apply one fetch outcome to the live state. Returns false (and
    /// touches nothing) when the source is no longer present and enabled,
    /// so a stale in-flight completion cannot resurrect a removed key.
    fn apply_outcome(&self, source_id: &str, outcome: &FetchOutcome) -> bool {
        {
            let mut sources = self.sources.write().expect("sources lock poisoned");
            match sources.get_mut(source_id) {
                Some(source) if source.is_enabled => {
                    if let Some(fetched_at) = outcome.fetched_at {
                        // last_updated only ever advances.
                        if source.last_updated.is_none_or(|prev| fetched_at > prev) {
                            source.last_updated = Some(fetched_at);
                        }
                    }
                }
                _ => return false,
            }
        }

        if source_id == HOLIDAY_SOURCE_ID {
            let markers = self.settings.get().holiday.markers();
            self.holidays_tx
                .send_replace(expand_holidays(&outcome.events, &markers));
        } else {
            self.event_cache.upsert(source_id, outcome.events.clone());
        }
        true
    }

    // ---- scheduling ----------------------------------------------------

    pub fn arm_all(&self) {
        let ids: Vec<String> = {
            self.sources
                .read()
                .expect("sources lock poisoned")
                .keys()
                .cloned()
                .collect()
        };
        for id in ids {
            self.arm(&id);
        }
    }

    /// (Re)arm the timer for one source. A source with auto-refresh
    /// disabled stays idle. Replaces any existing timer for the id.
    pub fn arm(&self, source_id: &str) {
        let auto_refresh = {
            self.sources
                .read()
                .expect("sources lock poisoned")
                .get(source_id)
                .map(|s| s.is_enabled && s.refresh_interval_minutes > 0)
                .unwrap_or(false)
        };
        if !auto_refresh {
            self.scheduler.disarm(source_id);
            return;
        }

        let weak = self.self_ref.clone();
        let id = source_id.to_string();
        let handle = tokio::spawn(run_timer_loop(weak, id));
        self.scheduler.register(source_id, handle);
    }

    pub fn disarm(&self, source_id: &str) {
        self.scheduler.disarm(source_id);
    }

    fn last_updated_of(&self, source_id: &str) -> Option<DateTime<Utc>> {
        self.sources
            .read()
            .expect("sources lock poisoned")
            .get(source_id)
            .and_then(|s| s.last_updated)
    }

    // ---- configuration changes -----------------------------------------

    /// Stop refreshing a source and drop its events immediately, without
    /// waiting for any in-flight fetch. The on-disk byte cache is kept for
    /// a future re-enable.
    pub async fn disable_source(&self, source_id: &str) -> Result<()> {
        self.scheduler.disarm(source_id);
        let _guard = self.commit_lock.lock().await;
        {
            let mut sources = self.sources.write().expect("sources lock poisoned");
            if let Some(source) = sources.get_mut(source_id) {
                source.is_enabled = false;
            }
        }
        self.event_cache.remove(source_id);
        self.notify_events();
        self.persist_flag(source_id, false)
    }

    /// Remove a source entirely. Like disable, but the source also leaves
    /// the settings file. The on-disk byte cache is intentionally kept.
    pub async fn delete_source(&self, source_id: &str) -> Result<()> {
        self.scheduler.disarm(source_id);
        let _guard = self.commit_lock.lock().await;
        self.sources
            .write()
            .expect("sources lock poisoned")
            .remove(source_id);
        self.event_cache.remove(source_id);
        self.notify_events();

        let mut settings = self.settings.get();
        settings.sources.retain(|s| s.id != source_id);
        self.settings.save(settings)
    }

    /// Add or edit a source, persist it, re-arm its timer, and refresh it
    /// right away.
    pub async fn upsert_source(&self, source: Source) -> Result<()> {
        if !source.is_enabled {
            return self.disable_source(&source.id).await;
        }

        let id = source.id.clone();
        {
            let _guard = self.commit_lock.lock().await;
            let mut live = source.clone();
            if live.last_updated.is_none() {
                live.last_updated = self.cache_store.last_modified(&live.url);
            }
            self.sources
                .write()
                .expect("sources lock poisoned")
                .insert(id.clone(), live);

            let mut settings = self.settings.get();
            match settings.sources.iter_mut().find(|s| s.id == id) {
                Some(existing) => *existing = source,
                None => settings.sources.push(source),
            }
            self.settings.save(settings)?;
        }

        self.arm(&id);
        self.refresh_one(&id, Trigger::EditSource).await
    }

    /// Rebuild the live set after a full reconfiguration: disarm removed
    /// sources, prune their cache entries, arm the rest.
    pub async fn apply_settings(&self, settings: Settings) -> Result<()> {
        {
            let _guard = self.commit_lock.lock().await;
            self.settings.save(settings.clone())?;

            let old_ids: HashSet<String> = {
                self.sources
                    .read()
                    .expect("sources lock poisoned")
                    .keys()
                    .cloned()
                    .collect()
            };
            self.load_live_set(&settings);
            let new_ids: HashSet<String> = {
                self.sources
                    .read()
                    .expect("sources lock poisoned")
                    .keys()
                    .cloned()
                    .collect()
            };

            for removed in old_ids.difference(&new_ids) {
                self.scheduler.disarm(removed);
            }
            self.event_cache.prune_to_enabled(&new_ids);
            self.notify_events();
            if !new_ids.contains(HOLIDAY_SOURCE_ID) {
                self.holidays_tx.send_replace(HolidayMap::new());
            }
        }
        self.arm_all();
        Ok(())
    }

    // ---- internals -----------------------------------------------------

    /// Populate the live set from settings. A source with no persisted
    /// `last_updated` is seeded from its cache file's mtime, so a restart
    /// doesn't re-fetch feeds that were cached moments ago.
    fn load_live_set(&self, settings: &Settings) {
        let previous = {
            self.sources
                .read()
                .expect("sources lock poisoned")
                .clone()
        };

        let mut live = HashMap::new();
        for source in settings.enabled_sources() {
            let mut source = source.clone();
            let in_memory = previous.get(&source.id).and_then(|s| s.last_updated);
            source.last_updated = [
                source.last_updated,
                in_memory,
                self.cache_store.last_modified(&source.url),
            ]
            .into_iter()
            .flatten()
            .max();
            live.insert(source.id.clone(), source);
        }

        if settings.show_holiday_feed {
            let mut holiday = settings.holiday.to_source();
            holiday.last_updated = previous
                .get(HOLIDAY_SOURCE_ID)
                .and_then(|s| s.last_updated)
                .or_else(|| self.cache_store.last_modified(&holiday.url));
            live.insert(holiday.id.clone(), holiday);
        }

        *self.sources.write().expect("sources lock poisoned") = live;
    }

    fn contains_source(&self, source_id: &str) -> bool {
        self.sources
            .read()
            .expect("sources lock poisoned")
            .contains_key(source_id)
    }

    /// Copy live freshness state back into the settings file. The holiday
    /// source is synthetic and never persisted.
    fn persist_sources(&self) -> Result<()> {
        let live = {
            self.sources
                .read()
                .expect("sources lock poisoned")
                .clone()
        };
        let mut settings = self.settings.get();
        for source in settings.sources.iter_mut() {
            if let Some(current) = live.get(&source.id) {
                source.last_updated = current.last_updated;
            }
        }
        self.settings.save(settings)
    }

    fn persist_flag(&self, source_id: &str, enabled: bool) -> Result<()> {
        let mut settings = self.settings.get();
        for source in settings.sources.iter_mut() {
            if source.id == source_id {
                source.is_enabled = enabled;
            }
        }
        self.settings.save(settings)
    }

    fn notify_events(&self) {
        self.events_tx.send_replace(self.event_cache.snapshot());
    }
}

/// The self-correcting timer loop for one source: a successful fetch
/// pushes the next fire a full interval out; a fetch that did not advance
/// `last_updated` re-arms with the retry backoff instead of re-firing off
/// the same past-due time. Holds the engine weakly, so a dropped engine
/// ends the loop at the next wakeup.
async fn run_timer_loop(weak: Weak<SyncEngine>, source_id: String) {
    let mut after_stall = false;
    loop {
        let delay = {
            let Some(engine) = weak.upgrade() else { return };
            let sources = engine.sources.read().expect("sources lock poisoned");
            let Some(source) = sources.get(&source_id).filter(|s| s.is_enabled) else {
                return;
            };
            match scheduler::next_delay(
                source.last_updated,
                source.refresh_interval_minutes,
                Utc::now(),
                after_stall,
            ) {
                Some(delay) => delay,
                None => return,
            }
        };

        tokio::time::sleep(delay).await;

        let Some(engine) = weak.upgrade() else { return };
        let before = engine.last_updated_of(&source_id);
        if let Err(e) = engine.refresh_one(&source_id, Trigger::Timer).await {
            tracing::debug!("Timer refresh for {} failed: {}", source_id, e);
        }
        let after = engine.last_updated_of(&source_id);
        after_stall = after <= before;
    }
}
