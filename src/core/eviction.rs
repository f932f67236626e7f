//! Purpose: Chronological eviction of cached records and reclamation of payload arenas.
//! Exports: `PurgeObservable`, `PurgePredicate`, `TimePurgePredicate`, `EvictionStrategy`,
//!   `ChronologicalEviction`, `PurgeObserver`, `PurgeReport`.
//! Role: Decides what leaves the cache and when an arena is safe to recycle.
//! Invariants: Records leave strictly oldest-first.
//! Invariants: Arenas are released oldest-first and only once no retained record views them.
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::Error;
use crate::core::monitor::CacheMonitor;
use crate::core::options::duration_ms;
use crate::core::record::{ArenaId, EventRecord, Timestamp};

/// The view of a cache an eviction strategy needs.
pub trait PurgeObservable {
    fn is_empty(&self) -> bool;
    fn item_count(&self) -> usize;
    fn oldest(&self) -> Option<&EventRecord>;
    fn newest(&self) -> Option<&EventRecord>;
    /// Removes the oldest record and records purge bookkeeping at `now`.
    fn remove_oldest_at(&mut self, now: Timestamp) -> Result<EventRecord, Error>;
    /// Oldest arena still referenced by a retained or pending record.
    fn arena_frontier(&self) -> Option<ArenaId>;
    fn open_arena(&self) -> Option<ArenaId>;
    /// Returns the oldest live arena to its pool; bytes released.
    fn release_arena(&mut self, arena: ArenaId) -> Result<usize, Error>;
}

pub trait PurgePredicate {
    fn should_purge(&self, time_in_cache: Duration, relative_age: Duration) -> bool;
}

/// Purges once a record has been cached long enough and is old relative to the newest record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimePurgePredicate {
    #[serde(rename = "min_time_in_cache_ms", with = "duration_ms")]
    pub min_time_in_cache: Duration,
    #[serde(rename = "max_relative_age_ms", with = "duration_ms")]
    pub max_relative_age: Duration,
}

impl TimePurgePredicate {
    pub fn new(min_time_in_cache: Duration, max_relative_age: Duration) -> Self {
        Self {
            min_time_in_cache,
            max_relative_age,
        }
    }
}

impl Default for TimePurgePredicate {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60), Duration::from_secs(30 * 60))
    }
}

impl PurgePredicate for TimePurgePredicate {
    fn should_purge(&self, time_in_cache: Duration, relative_age: Duration) -> bool {
        time_in_cache > self.min_time_in_cache && relative_age > self.max_relative_age
    }
}

/// Outcome of one purge pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PurgeReport {
    pub purged: usize,
    pub last_purged: Option<EventRecord>,
    pub newest: Option<EventRecord>,
    pub arenas_released: usize,
    pub bytes_released: usize,
}

impl PurgeReport {
    fn record_removed(&mut self, record: EventRecord) {
        self.purged += 1;
        self.last_purged = Some(record);
    }
}

pub trait PurgeObserver: Send {
    fn on_purged(&self, last_purged: &EventRecord, newest: Option<&EventRecord>);
}

pub trait EvictionStrategy {
    /// Called for every arena checked out for payloads, in checkout order.
    fn on_arena_allocated(&mut self, arena: ArenaId, capacity: usize);

    fn perform_purge(
        &mut self,
        cache: &mut dyn PurgeObservable,
        now: Timestamp,
    ) -> Result<PurgeReport, Error>;

    /// Removes records until nothing references `arena`, ignoring age, then reclaims it.
    fn purge_arena(
        &mut self,
        cache: &mut dyn PurgeObservable,
        arena: ArenaId,
        now: Timestamp,
    ) -> Result<PurgeReport, Error>;

    fn oldest_in_use(&self) -> Option<ArenaId>;

    fn attach_monitor(&mut self, _monitor: Arc<dyn CacheMonitor>) {}
}

pub struct ChronologicalEviction<P: PurgePredicate = TimePurgePredicate> {
    predicate: P,
    in_use: VecDeque<ArenaId>,
    monitor: Option<Arc<dyn CacheMonitor>>,
    observers: Vec<Box<dyn PurgeObserver>>,
}

impl Default for ChronologicalEviction<TimePurgePredicate> {
    fn default() -> Self {
        Self::new(TimePurgePredicate::default())
    }
}

impl<P: PurgePredicate> ChronologicalEviction<P> {
    pub fn new(predicate: P) -> Self {
        Self {
            predicate,
            in_use: VecDeque::new(),
            monitor: None,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl PurgeObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn PurgeObserver>) {
        self.observers.push(observer);
    }

    pub fn predicate(&self) -> &P {
        &self.predicate
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    fn finish(&self, cache: &dyn PurgeObservable, report: &mut PurgeReport) {
        report.newest = cache.newest().copied();
        if let Some(last_purged) = &report.last_purged {
            if let Some(monitor) = &self.monitor {
                monitor.track_messages_purged(report.purged);
            }
            for observer in &self.observers {
                observer.on_purged(last_purged, report.newest.as_ref());
            }
        }
    }

    /// Releases in-use arenas oldest-first up to the reference frontier.
    ///
    /// With nothing referenced, the open arena is kept unless `reclaim`
    /// names it or a later arena.
    fn release_superseded(
        &mut self,
        cache: &mut dyn PurgeObservable,
        report: &mut PurgeReport,
        reclaim: Option<ArenaId>,
    ) -> Result<(), Error> {
        let frontier = cache.arena_frontier();
        let open = cache.open_arena();
        while let Some(&arena) = self.in_use.front() {
            let releasable = match frontier {
                Some(frontier) => arena < frontier,
                None => Some(arena) != open || reclaim.is_some_and(|target| arena <= target),
            };
            if !releasable {
                break;
            }
            let bytes = cache.release_arena(arena)?;
            self.in_use.pop_front();
            report.arenas_released += 1;
            report.bytes_released += bytes;
            debug!(%arena, bytes, "released payload arena");
        }
        if report.bytes_released > 0
            && let Some(monitor) = &self.monitor
        {
            monitor.track_memory_released(report.bytes_released);
        }
        Ok(())
    }
}

impl<P: PurgePredicate> EvictionStrategy for ChronologicalEviction<P> {
    fn on_arena_allocated(&mut self, arena: ArenaId, _capacity: usize) {
        self.in_use.push_back(arena);
    }

    fn perform_purge(
        &mut self,
        cache: &mut dyn PurgeObservable,
        now: Timestamp,
    ) -> Result<PurgeReport, Error> {
        let Some(newest) = cache.newest().copied() else {
            return Ok(PurgeReport::default());
        };
        let mut report = PurgeReport::default();
        while let Some(oldest) = cache.oldest().copied() {
            let time_in_cache = now.saturating_duration_since(oldest.dequeue_time);
            let relative_age = newest
                .enqueue_time
                .saturating_duration_since(oldest.enqueue_time);
            if !self.predicate.should_purge(time_in_cache, relative_age) {
                break;
            }
            report.record_removed(cache.remove_oldest_at(now)?);
        }
        self.finish(cache, &mut report);
        if report.purged > 0 {
            self.release_superseded(cache, &mut report, None)?;
            debug!(
                purged = report.purged,
                remaining = cache.item_count(),
                arenas_released = report.arenas_released,
                bytes_released = report.bytes_released,
                "purged aged records"
            );
        }
        Ok(report)
    }

    fn purge_arena(
        &mut self,
        cache: &mut dyn PurgeObservable,
        arena: ArenaId,
        now: Timestamp,
    ) -> Result<PurgeReport, Error> {
        let mut report = PurgeReport::default();
        while let Some(oldest) = cache.oldest().copied()
            && oldest.payload.arena <= arena
        {
            report.record_removed(cache.remove_oldest_at(now)?);
        }
        self.finish(cache, &mut report);
        self.release_superseded(cache, &mut report, Some(arena))?;
        debug!(
            %arena,
            purged = report.purged,
            remaining = cache.item_count(),
            arenas_released = report.arenas_released,
            "purged records to reclaim arena"
        );
        Ok(report)
    }

    fn oldest_in_use(&self) -> Option<ArenaId> {
        self.in_use.front().copied()
    }

    fn attach_monitor(&mut self, monitor: Arc<dyn CacheMonitor>) {
        self.monitor = Some(monitor);
    }
}
