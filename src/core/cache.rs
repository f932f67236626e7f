//! Purpose: The shared backlog of cached records and the cursor algorithm over it.
//! Exports: `MessageCache`, `PurgeMark`.
//! Role: Owns the block chain, the block pool, the payload arenas, and purge bookkeeping.
//! Invariants: The newest record of the newest block is the most recently admitted;
//!   the oldest record of the oldest block is the least recently admitted.
//! Invariants: Every block except the newest is full.
//! Invariants: Records only reference live arenas; an arena holding the oldest
//!   retained record, or any newer one, is never released.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::adapter::DataAdapter;
use crate::core::arena::{ArenaStore, PayloadWrite};
use crate::core::block::{Block, BlockChain};
use crate::core::block_pool::BlockPool;
use crate::core::cursor::{Cursor, CursorState, Position};
use crate::core::error::{Error, ErrorKind};
use crate::core::eviction::PurgeObservable;
use crate::core::monitor::{CacheMonitor, MessageStatistics, PoolMonitor, PoolStats};
use crate::core::options::CacheOptions;
use crate::core::periodic::PeriodicAction;
use crate::core::record::{ArenaId, EventRecord, SequenceToken, StreamId, Timestamp};

/// Last purge seen for a stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PurgeMark {
    pub purged_at: Timestamp,
    pub token: SequenceToken,
}

pub struct MessageCache<A: DataAdapter> {
    chain: BlockChain,
    block_pool: BlockPool,
    arenas: ArenaStore,
    adapter: A,
    item_count: usize,
    purged: HashMap<StreamId, PurgeMark>,
    retention: Option<Duration>,
    metadata_pruning: Option<PeriodicAction>,
    statistics: Option<PeriodicAction>,
    monitor: Option<Arc<dyn CacheMonitor>>,
}

impl<A: DataAdapter> MessageCache<A> {
    pub fn new(options: CacheOptions, adapter: A) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self {
            chain: BlockChain::new(),
            block_pool: BlockPool::new(options.block_capacity),
            arenas: ArenaStore::new(options.arena_capacity, options.max_arenas),
            adapter,
            item_count: 0,
            purged: HashMap::new(),
            retention: options.purge_metadata_retention,
            metadata_pruning: options
                .purge_metadata_retention
                .map(|retention| PeriodicAction::new(retention / 5)),
            statistics: options.statistics_interval.map(PeriodicAction::new),
            monitor: None,
        })
    }

    pub fn set_monitor(&mut self, monitor: Option<Arc<dyn CacheMonitor>>) {
        self.monitor = monitor;
    }

    pub fn set_pool_monitor(&mut self, monitor: Option<Arc<dyn PoolMonitor>>) {
        self.block_pool.set_monitor(monitor.clone());
        self.arenas.set_monitor(monitor);
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        match self.chain.len() {
            0 => true,
            1 => self.chain.newest().is_none_or(Block::is_empty),
            _ => false,
        }
    }

    pub fn newest(&self) -> Option<&EventRecord> {
        self.chain.newest().and_then(Block::newest)
    }

    pub fn oldest(&self) -> Option<&EventRecord> {
        self.chain.oldest().and_then(Block::oldest)
    }

    pub fn newest_token(&self) -> Option<SequenceToken> {
        self.newest().map(|record| self.adapter.sequence_token_of(record))
    }

    pub fn oldest_token(&self) -> Option<SequenceToken> {
        self.oldest().map(|record| self.adapter.sequence_token_of(record))
    }

    pub fn last_purged(&self, stream_id: StreamId) -> Option<PurgeMark> {
        self.purged.get(&stream_id).copied()
    }

    pub fn purge_mark_count(&self) -> usize {
        self.purged.len()
    }

    /// Bytes of the payload a record references.
    pub fn payload(&self, record: &EventRecord) -> Result<&[u8], Error> {
        self.arenas.resolve(record.payload)
    }

    /// Arena currently receiving payload bytes.
    pub fn open_arena(&self) -> Option<ArenaId> {
        self.arenas.open()
    }

    pub fn oldest_arena(&self) -> Option<ArenaId> {
        self.arenas.oldest()
    }

    pub fn arena_count(&self) -> usize {
        self.arenas.live_count()
    }

    pub fn arena_stats(&self) -> PoolStats {
        self.arenas.pool_stats()
    }

    pub fn block_stats(&self) -> PoolStats {
        self.block_pool.stats()
    }

    /// Copies a payload into the open arena; the slice is pinned until the next `add`.
    pub fn write_payload(&mut self, payload: &[u8]) -> Result<PayloadWrite, Error> {
        let write = self.arenas.write(payload)?;
        if let Some((arena, capacity)) = write.allocated {
            debug!(%arena, capacity, "checked out payload arena");
            if let Some(monitor) = &self.monitor {
                monitor.track_memory_allocated(capacity);
            }
        }
        Ok(write)
    }

    /// Admits a batch of records, stamping each with `dequeue_time`.
    pub fn add<I>(&mut self, records: I, dequeue_time: Timestamp) -> Result<(), Error>
    where
        I: IntoIterator<Item = EventRecord>,
    {
        let records: Vec<EventRecord> = records.into_iter().collect();
        self.check_admission(&records)?;

        let count = records.len();
        for mut record in records {
            record.dequeue_time = dequeue_time;
            self.block_pool.allocate_record(&mut self.chain, record)?;
            self.item_count += 1;
        }
        self.arenas.unpin();

        if let Some(monitor) = &self.monitor {
            monitor.track_messages_added(count);
        }
        if let Some(statistics) = &mut self.statistics
            && statistics.try_action(dequeue_time)
        {
            self.report_statistics();
        }
        Ok(())
    }

    // Payload arenas must not decrease in admission order, so the oldest
    // record always points into the oldest referenced arena.
    fn check_admission(&self, records: &[EventRecord]) -> Result<(), Error> {
        let mut floor = self.newest().map(|record| record.payload.arena);
        for record in records {
            self.arenas.resolve(record.payload)?;
            if let Some(floor) = floor
                && record.payload.arena < floor
            {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "payload in {} admitted after a record in {floor}",
                        record.payload.arena
                    ))
                    .with_stream(record.stream_id)
                    .with_token(record.token())
                    .with_hint("Admit records in the order their payloads were written."));
            }
            floor = Some(record.payload.arena);
        }
        Ok(())
    }

    fn oldest_referenced_arena(&self) -> Option<ArenaId> {
        self.oldest().map(|record| record.payload.arena)
    }

    pub fn get_cursor(
        &self,
        stream_id: StreamId,
        token: Option<SequenceToken>,
    ) -> Result<Cursor, Error> {
        let mut cursor = Cursor::new(stream_id, token);
        self.set_cursor(&mut cursor)?;
        Ok(cursor)
    }

    fn set_cursor(&self, cursor: &mut Cursor) -> Result<(), Error> {
        let requested = cursor.token;
        if self.is_empty() {
            cursor.unset(requested);
            return Ok(());
        }
        let (Some(newest_block), Some(oldest_block)) = (self.chain.newest(), self.chain.oldest())
        else {
            cursor.unset(requested);
            return Ok(());
        };
        let (Some(newest), Some(oldest)) = (newest_block.newest(), oldest_block.oldest()) else {
            cursor.unset(requested);
            return Ok(());
        };

        let Some(token) = requested else {
            let position = Position {
                block: newest_block.id(),
                index: newest_block.newest_index(),
            };
            cursor.idle(position, self.adapter.sequence_token_of(newest));
            return Ok(());
        };

        if newest.token() < token {
            cursor.unset(Some(token));
            return Ok(());
        }

        if oldest.token() > token {
            if let Some(mark) = self.purged.get(&cursor.stream_id())
                && mark.token <= token
            {
                let position = Position {
                    block: oldest_block.id(),
                    index: oldest_block.oldest_index(),
                };
                cursor.set(position, self.adapter.sequence_token_of(oldest));
                return Ok(());
            }
            return Err(self.cache_miss(cursor.stream_id(), token));
        }

        let block = self
            .chain
            .iter_newest_first()
            .find(|block| block.oldest().is_some_and(|record| record.token() <= token))
            .ok_or_else(|| {
                Error::new(ErrorKind::Internal)
                    .with_message("no block holds a record at or before a cached token")
                    .with_token(token)
            })?;
        let mut position = Position {
            block: block.id(),
            index: block.index_of_first_at_or_before(token)?,
        };

        if cursor.state == CursorState::Idle {
            if position.index < block.newest_index() {
                position.index += 1;
            } else if let Some(newer) = self.chain.newer(block.id()) {
                position = Position {
                    block: newer.id(),
                    index: newer.oldest_index(),
                };
            } else {
                cursor.idle(position, token);
                return Ok(());
            }
        }

        let token = self.token_at(position)?;
        cursor.set(position, token);
        Ok(())
    }

    /// Delivers the next record of the cursor's stream, or `None` once caught up.
    pub fn try_get_next(&self, cursor: &mut Cursor) -> Result<Option<A::Delivery>, Error> {
        if cursor.state != CursorState::Set {
            self.set_cursor(cursor)?;
            if cursor.state != CursorState::Set {
                return Ok(None);
            }
        }

        let (Some(token), Some(oldest)) = (cursor.token, self.oldest()) else {
            let token = cursor.token.unwrap_or_default();
            return Err(self.cache_miss(cursor.stream_id(), token));
        };
        if oldest.token() > token {
            return Err(self.cache_miss(cursor.stream_id(), token));
        }
        let newest_block = self.chain.newest().map(Block::id);

        while cursor.state == CursorState::Set {
            let position = cursor.position.ok_or_else(|| {
                Error::new(ErrorKind::Internal).with_message("set cursor has no position")
            })?;
            let block = self
                .chain
                .get(position.block)
                .ok_or_else(|| self.cache_miss(cursor.stream_id(), token))?;
            let current = *block.record_at(position.index)?;

            if Some(block.id()) == newest_block && position.index == block.newest_index() {
                cursor.idle(position, self.adapter.sequence_token_of(&current));
            } else {
                let next = if position.index == block.newest_index() {
                    let newer = self.chain.newer(block.id()).ok_or_else(|| {
                        Error::new(ErrorKind::Internal)
                            .with_message("non-newest block has no newer neighbour")
                    })?;
                    Position {
                        block: newer.id(),
                        index: newer
                            .find_first(cursor.stream_id(), newer.oldest_index())
                            .unwrap_or_else(|| newer.newest_index()),
                    }
                } else {
                    Position {
                        block: block.id(),
                        index: block
                            .find_first(cursor.stream_id(), position.index + 1)
                            .unwrap_or_else(|| block.newest_index()),
                    }
                };
                let next_token = self.token_at(next)?;
                cursor.set(next, next_token);
            }

            if current.stream_id == cursor.stream_id() {
                let payload = self.arenas.resolve(current.payload)?;
                let delivery = self.adapter.to_delivery(&current, payload)?;
                return Ok(Some(delivery));
            }
        }
        Ok(None)
    }

    /// Pops the oldest record, stamping purge bookkeeping with the current time.
    pub fn remove_oldest(&mut self) -> Result<EventRecord, Error> {
        self.remove_oldest_at(Timestamp::now())
    }

    pub fn remove_oldest_at(&mut self, now: Timestamp) -> Result<EventRecord, Error> {
        if self.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("cannot remove from an empty cache"));
        }
        let block = self.chain.oldest_mut().ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("non-empty cache has no blocks")
        })?;
        let record = *block.oldest().ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("oldest block has no live records")
        })?;
        block.pop_oldest();
        let drained = block.is_drained();
        self.item_count = self.item_count.saturating_sub(1);
        self.track_purged(&record, now);

        if drained && let Some(block) = self.chain.unlink_oldest() {
            self.block_pool.free(block);
        }
        Ok(record)
    }

    fn track_purged(&mut self, record: &EventRecord, now: Timestamp) {
        if self.retention.is_none() {
            return;
        }
        let mark = PurgeMark {
            purged_at: now,
            token: self.adapter.sequence_token_of(record),
        };
        self.purged.insert(record.stream_id, mark);
        if let Some(pruning) = &mut self.metadata_pruning
            && pruning.try_action(now)
        {
            self.prune_purge_metadata(now);
        }
    }

    /// Drops purge marks older than the retention window.
    pub fn prune_purge_metadata(&mut self, now: Timestamp) {
        let Some(retention) = self.retention else {
            return;
        };
        let before = self.purged.len();
        self.purged
            .retain(|_, mark| mark.purged_at.saturating_add(retention) >= now);
        let pruned = before - self.purged.len();
        if pruned > 0 {
            debug!(pruned, remaining = self.purged.len(), "pruned purge bookkeeping");
        }
    }

    pub fn report_statistics(&self) {
        if let Some(monitor) = &self.monitor {
            let stats = match (self.oldest(), self.newest()) {
                (Some(oldest), Some(newest)) if !self.is_empty() => MessageStatistics {
                    oldest_enqueue_time: Some(oldest.enqueue_time),
                    oldest_dequeue_time: Some(oldest.dequeue_time),
                    newest_enqueue_time: Some(newest.enqueue_time),
                    item_count: self.item_count,
                },
                _ => MessageStatistics {
                    item_count: self.item_count,
                    ..MessageStatistics::default()
                },
            };
            monitor.report_message_statistics(stats);
            monitor.report_cache_size(self.arenas.live_bytes());
        }
        self.block_pool.report_statistics();
        self.arenas.report_statistics();
    }

    fn token_at(&self, position: Position) -> Result<SequenceToken, Error> {
        let block = self.chain.get(position.block).ok_or_else(|| {
            Error::new(ErrorKind::OutOfRange).with_message("position refers to an unlinked block")
        })?;
        let record = block.record_at(position.index)?;
        Ok(self.adapter.sequence_token_of(record))
    }

    fn cache_miss(&self, stream_id: StreamId, token: SequenceToken) -> Error {
        let (oldest, newest) = (self.oldest_token(), self.newest_token());
        debug!(
            stream = %stream_id,
            %token,
            oldest = ?oldest,
            newest = ?newest,
            "cache miss"
        );
        Error::new(ErrorKind::StaleCursor)
            .with_message("requested token is older than the oldest cached record")
            .with_hint("Resubscribe from the newest token or accept the gap.")
            .with_stream(stream_id)
            .with_token(token)
            .with_bounds(oldest, newest)
    }
}

impl<A: DataAdapter> PurgeObservable for MessageCache<A> {
    fn is_empty(&self) -> bool {
        MessageCache::is_empty(self)
    }

    fn item_count(&self) -> usize {
        self.item_count
    }

    fn oldest(&self) -> Option<&EventRecord> {
        MessageCache::oldest(self)
    }

    fn newest(&self) -> Option<&EventRecord> {
        MessageCache::newest(self)
    }

    fn remove_oldest_at(&mut self, now: Timestamp) -> Result<EventRecord, Error> {
        MessageCache::remove_oldest_at(self, now)
    }

    fn arena_frontier(&self) -> Option<ArenaId> {
        self.arenas.frontier(self.oldest_referenced_arena())
    }

    fn open_arena(&self) -> Option<ArenaId> {
        MessageCache::open_arena(self)
    }

    fn release_arena(&mut self, arena: ArenaId) -> Result<usize, Error> {
        let referenced = self.oldest_referenced_arena();
        self.arenas.release(arena, referenced)
    }
}
