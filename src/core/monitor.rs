//! Purpose: Observability hooks for the cache, its eviction strategy, and its pools.
//! Exports: `CacheMonitor`, `PoolMonitor`, `MessageStatistics`, `PoolStats`, `CacheStats`, `CacheStatsSnapshot`, `TracingMonitor`.
//! Role: Read-only reporting surface; implementations never influence control flow.
//! Invariants: Counters live on the monitor instance, never in process-wide globals.
//! Invariants: Every hook has a no-op default so implementors pick what they need.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::core::record::Timestamp;

/// Oldest/newest view of the retained backlog at reporting time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MessageStatistics {
    pub oldest_enqueue_time: Option<Timestamp>,
    pub oldest_dequeue_time: Option<Timestamp>,
    pub newest_enqueue_time: Option<Timestamp>,
    pub item_count: usize,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub claimed: usize,
}

pub trait CacheMonitor: Send + Sync {
    fn track_messages_added(&self, _count: usize) {}
    fn track_messages_purged(&self, _count: usize) {}
    fn track_memory_allocated(&self, _bytes: usize) {}
    fn track_memory_released(&self, _bytes: usize) {}
    fn report_message_statistics(&self, _stats: MessageStatistics) {}
    fn report_cache_size(&self, _bytes: usize) {}
}

pub trait PoolMonitor: Send + Sync {
    fn track_object_allocated(&self, _pool: &'static str) {}
    fn track_object_released(&self, _pool: &'static str) {}
    fn report(&self, _pool: &'static str, _stats: PoolStats) {}
}

impl<T: CacheMonitor + ?Sized> CacheMonitor for Arc<T> {
    fn track_messages_added(&self, count: usize) {
        (**self).track_messages_added(count)
    }

    fn track_messages_purged(&self, count: usize) {
        (**self).track_messages_purged(count)
    }

    fn track_memory_allocated(&self, bytes: usize) {
        (**self).track_memory_allocated(bytes)
    }

    fn track_memory_released(&self, bytes: usize) {
        (**self).track_memory_released(bytes)
    }

    fn report_message_statistics(&self, stats: MessageStatistics) {
        (**self).report_message_statistics(stats)
    }

    fn report_cache_size(&self, bytes: usize) {
        (**self).report_cache_size(bytes)
    }
}

/// Relaxed atomic counters, safe to read from an exporter thread.
#[derive(Debug, Default)]
pub struct CacheStats {
    added: AtomicU64,
    purged: AtomicU64,
    allocated_bytes: AtomicU64,
    released_bytes: AtomicU64,
    item_count: AtomicU64,
    cache_size: AtomicU64,
    pool_objects_claimed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStatsSnapshot {
    pub messages_added: u64,
    pub messages_purged: u64,
    pub bytes_allocated: u64,
    pub bytes_released: u64,
    pub item_count: u64,
    pub cache_size: u64,
    pub pool_objects_claimed: u64,
}

impl CacheStatsSnapshot {
    pub fn bytes_in_use(&self) -> u64 {
        self.bytes_allocated.saturating_sub(self.bytes_released)
    }
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            messages_added: self.added.load(Ordering::Relaxed),
            messages_purged: self.purged.load(Ordering::Relaxed),
            bytes_allocated: self.allocated_bytes.load(Ordering::Relaxed),
            bytes_released: self.released_bytes.load(Ordering::Relaxed),
            item_count: self.item_count.load(Ordering::Relaxed),
            cache_size: self.cache_size.load(Ordering::Relaxed),
            pool_objects_claimed: self.pool_objects_claimed.load(Ordering::Relaxed),
        }
    }
}

impl CacheMonitor for CacheStats {
    fn track_messages_added(&self, count: usize) {
        self.added.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn track_messages_purged(&self, count: usize) {
        self.purged.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn track_memory_allocated(&self, bytes: usize) {
        self.allocated_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn track_memory_released(&self, bytes: usize) {
        self.released_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn report_message_statistics(&self, stats: MessageStatistics) {
        self.item_count.store(stats.item_count as u64, Ordering::Relaxed);
    }

    fn report_cache_size(&self, bytes: usize) {
        self.cache_size.store(bytes as u64, Ordering::Relaxed);
    }
}

impl PoolMonitor for CacheStats {
    fn track_object_allocated(&self, _pool: &'static str) {
        self.pool_objects_claimed.fetch_add(1, Ordering::Relaxed);
    }

    fn track_object_released(&self, _pool: &'static str) {
        // Saturating decrement; a monitor attached mid-flight may see releases first.
        let _ = self.pool_objects_claimed.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
            Some(n.saturating_sub(1))
        });
    }
}

/// Emits monitor events as `tracing` records.
#[derive(Clone, Debug, Default)]
pub struct TracingMonitor {
    name: String,
}

impl TracingMonitor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl CacheMonitor for TracingMonitor {
    fn track_messages_added(&self, count: usize) {
        debug!(cache = %self.name, count, "messages added");
    }

    fn track_messages_purged(&self, count: usize) {
        debug!(cache = %self.name, count, "messages purged");
    }

    fn track_memory_allocated(&self, bytes: usize) {
        debug!(cache = %self.name, bytes, "arena memory allocated");
    }

    fn track_memory_released(&self, bytes: usize) {
        debug!(cache = %self.name, bytes, "arena memory released");
    }

    fn report_message_statistics(&self, stats: MessageStatistics) {
        info!(
            cache = %self.name,
            items = stats.item_count,
            oldest_enqueue = %format_ts(stats.oldest_enqueue_time),
            oldest_dequeue = %format_ts(stats.oldest_dequeue_time),
            newest_enqueue = %format_ts(stats.newest_enqueue_time),
            "cache statistics"
        );
    }

    fn report_cache_size(&self, bytes: usize) {
        info!(cache = %self.name, bytes, "cache size");
    }
}

impl PoolMonitor for TracingMonitor {
    fn report(&self, pool: &'static str, stats: PoolStats) {
        info!(
            cache = %self.name,
            pool,
            total = stats.total,
            available = stats.available,
            claimed = stats.claimed,
            "pool statistics"
        );
    }
}

fn format_ts(ts: Option<Timestamp>) -> String {
    ts.map(Timestamp::to_rfc3339).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::{CacheMonitor, CacheStats, MessageStatistics, PoolMonitor};
    use std::sync::Arc;

    #[test]
    fn stats_accumulate_through_shared_handle() {
        let stats = Arc::new(CacheStats::new());
        let monitor: Arc<dyn CacheMonitor> = stats.clone();
        monitor.track_messages_added(10);
        monitor.track_messages_purged(4);
        monitor.track_memory_allocated(4096);
        monitor.track_memory_released(1024);
        monitor.report_message_statistics(MessageStatistics {
            item_count: 6,
            ..MessageStatistics::default()
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_added, 10);
        assert_eq!(snapshot.messages_purged, 4);
        assert_eq!(snapshot.bytes_in_use(), 3072);
        assert_eq!(snapshot.item_count, 6);
    }

    #[test]
    fn pool_claims_never_underflow() {
        let stats = CacheStats::new();
        stats.track_object_released("blocks");
        stats.track_object_allocated("blocks");
        assert_eq!(stats.snapshot().pool_objects_claimed, 1);
    }
}
