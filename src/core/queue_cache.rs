// Single-owner facade tying a message cache to its eviction strategy.
use std::sync::Arc;

use tracing::debug;

use crate::core::adapter::DataAdapter;
use crate::core::cache::MessageCache;
use crate::core::cursor::Cursor;
use crate::core::error::{Error, ErrorKind};
use crate::core::eviction::{ChronologicalEviction, EvictionStrategy, PurgeReport};
use crate::core::monitor::{CacheMonitor, PoolMonitor};
use crate::core::options::CacheOptions;
use crate::core::record::{ArenaId, ArenaSlice, EventRecord, SequenceToken, StreamId, Timestamp};

pub struct QueueCache<A: DataAdapter, E: EvictionStrategy = ChronologicalEviction> {
    cache: MessageCache<A>,
    eviction: E,
}

impl<A: DataAdapter> QueueCache<A> {
    /// Cache with default chronological eviction.
    pub fn with_default_eviction(options: CacheOptions, adapter: A) -> Result<Self, Error> {
        Self::new(options, adapter, ChronologicalEviction::default())
    }
}

impl<A: DataAdapter, E: EvictionStrategy> QueueCache<A, E> {
    pub fn new(options: CacheOptions, adapter: A, eviction: E) -> Result<Self, Error> {
        Ok(Self {
            cache: MessageCache::new(options, adapter)?,
            eviction,
        })
    }

    /// Sends cache and eviction events to one monitor.
    pub fn with_monitor(mut self, monitor: Arc<dyn CacheMonitor>) -> Self {
        self.cache.set_monitor(Some(monitor.clone()));
        self.eviction.attach_monitor(monitor);
        self
    }

    pub fn with_pool_monitor(mut self, monitor: Arc<dyn PoolMonitor>) -> Self {
        self.cache.set_pool_monitor(Some(monitor));
        self
    }

    pub fn cache(&self) -> &MessageCache<A> {
        &self.cache
    }

    pub fn eviction(&self) -> &E {
        &self.eviction
    }

    pub fn eviction_mut(&mut self) -> &mut E {
        &mut self.eviction
    }

    pub fn write_payload(&mut self, payload: &[u8]) -> Result<ArenaSlice, Error> {
        self.write_payload_at(payload, Timestamp::now())
    }

    /// Copies a payload into arena memory, reclaiming the oldest arena when the pool is exhausted.
    ///
    /// `now` stamps purge bookkeeping for records removed to make room.
    pub fn write_payload_at(&mut self, payload: &[u8], now: Timestamp) -> Result<ArenaSlice, Error> {
        let write = match self.cache.write_payload(payload) {
            Ok(write) => write,
            Err(err) if err.kind() == ErrorKind::PoolExhausted => {
                let Some(oldest) = self.eviction.oldest_in_use() else {
                    return Err(err);
                };
                debug!(%oldest, "arena pool exhausted; purging oldest arena");
                let report = self.eviction.purge_arena(&mut self.cache, oldest, now)?;
                if report.arenas_released == 0 {
                    return Err(err.with_hint(
                        "Every arena is still referenced; add pending records or raise max_arenas.",
                    ));
                }
                self.cache.write_payload(payload)?
            }
            Err(err) => return Err(err),
        };
        if let Some((arena, capacity)) = write.allocated {
            self.eviction.on_arena_allocated(arena, capacity);
        }
        Ok(write.slice)
    }

    pub fn add<I>(&mut self, records: I, dequeue_time: Timestamp) -> Result<(), Error>
    where
        I: IntoIterator<Item = EventRecord>,
    {
        self.cache.add(records, dequeue_time)
    }

    pub fn get_cursor(
        &self,
        stream_id: StreamId,
        token: Option<SequenceToken>,
    ) -> Result<Cursor, Error> {
        self.cache.get_cursor(stream_id, token)
    }

    pub fn try_get_next(&self, cursor: &mut Cursor) -> Result<Option<A::Delivery>, Error> {
        self.cache.try_get_next(cursor)
    }

    pub fn perform_purge(&mut self, now: Timestamp) -> Result<PurgeReport, Error> {
        self.eviction.perform_purge(&mut self.cache, now)
    }

    /// Evicts every record stored in `arena` or older, regardless of age.
    pub fn purge_arena(&mut self, arena: ArenaId, now: Timestamp) -> Result<PurgeReport, Error> {
        self.eviction.purge_arena(&mut self.cache, arena, now)
    }

    pub fn report_statistics(&self) {
        self.cache.report_statistics();
    }
}
