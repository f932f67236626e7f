//! Purpose: Fixed-capacity payload arenas and the store that owns the live ones.
//! Exports: `Arena`, `ArenaStore`, `PayloadWrite`.
//! Role: Byte storage behind every `ArenaSlice`; the only place payload bytes live.
//! Invariants: Arenas never resize; carving is a bump of `write_cursor`.
//! Invariants: Live arenas are ordered by id; only the oldest may be released,
//!   and only while it is strictly older than the release frontier.
//! Invariants: Ids are assigned at checkout and never reused, so stale slices fail to resolve.
use std::collections::VecDeque;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::monitor::{PoolMonitor, PoolStats};
use crate::core::pool::{ObjectPool, PoolOptions, Pooled};
use crate::core::record::{ArenaId, ArenaSlice};

const UNASSIGNED: ArenaId = ArenaId(0);

#[derive(Debug)]
pub struct Arena {
    id: ArenaId,
    buf: Box<[u8]>,
    write_cursor: usize,
}

impl Arena {
    pub fn new(capacity: usize) -> Self {
        Self {
            id: UNASSIGNED,
            buf: vec![0u8; capacity].into_boxed_slice(),
            write_cursor: 0,
        }
    }

    pub fn id(&self) -> ArenaId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.write_cursor
    }

    pub fn used(&self) -> usize {
        self.write_cursor
    }

    /// Copies `payload` into the free tail; `None` when it does not fit.
    pub fn try_carve(&mut self, payload: &[u8]) -> Option<ArenaSlice> {
        if payload.len() > self.remaining() {
            return None;
        }
        let offset = u32::try_from(self.write_cursor).ok()?;
        let len = u32::try_from(payload.len()).ok()?;
        let end = self.write_cursor + payload.len();
        self.buf[self.write_cursor..end].copy_from_slice(payload);
        self.write_cursor = end;
        Some(ArenaSlice {
            arena: self.id,
            offset,
            len,
        })
    }

    pub fn bytes(&self, slice: ArenaSlice) -> Option<&[u8]> {
        if slice.arena != self.id {
            return None;
        }
        let range = slice.range();
        if range.end > self.write_cursor {
            return None;
        }
        Some(&self.buf[range])
    }
}

impl Pooled for Arena {
    fn reset(&mut self) {
        self.id = UNASSIGNED;
        self.write_cursor = 0;
    }
}

/// Result of carving a payload; `allocated` is set when a new arena was checked out.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PayloadWrite {
    pub slice: ArenaSlice,
    pub allocated: Option<(ArenaId, usize)>,
}

#[derive(Debug)]
pub struct ArenaStore {
    pool: ObjectPool<Arena>,
    live: VecDeque<Arena>,
    arena_capacity: usize,
    next_id: u64,
    // Oldest arena holding payloads written but not yet admitted by `add`.
    pinned_from: Option<ArenaId>,
}

impl ArenaStore {
    pub fn new(arena_capacity: usize, max_arenas: Option<usize>) -> Self {
        let options = match max_arenas {
            Some(max) => PoolOptions::fixed(max),
            None => PoolOptions::unbounded(),
        };
        Self {
            pool: ObjectPool::new("arenas", options, move || Arena::new(arena_capacity)),
            live: VecDeque::new(),
            arena_capacity,
            next_id: 1,
            pinned_from: None,
        }
    }

    pub fn set_monitor(&mut self, monitor: Option<Arc<dyn PoolMonitor>>) {
        self.pool.set_monitor(monitor);
    }

    pub fn arena_capacity(&self) -> usize {
        self.arena_capacity
    }

    /// Carves `payload` from the open arena, checking out a new one when it is full.
    pub fn write(&mut self, payload: &[u8]) -> Result<PayloadWrite, Error> {
        if payload.len() > self.arena_capacity {
            return Err(Error::new(ErrorKind::RecordTooLarge).with_message(format!(
                "payload of {} bytes exceeds arena capacity of {} bytes",
                payload.len(),
                self.arena_capacity
            )));
        }

        if let Some(open) = self.live.back_mut()
            && let Some(slice) = open.try_carve(payload)
        {
            self.pin(slice.arena);
            return Ok(PayloadWrite {
                slice,
                allocated: None,
            });
        }

        let mut arena = self.pool.allocate()?;
        arena.id = ArenaId(self.next_id);
        self.next_id += 1;
        let capacity = arena.capacity();
        let slice = arena.try_carve(payload).ok_or_else(|| {
            Error::new(ErrorKind::RecordTooLarge)
                .with_message("payload does not fit in an empty arena")
        })?;
        self.live.push_back(arena);
        self.pin(slice.arena);
        Ok(PayloadWrite {
            slice,
            allocated: Some((slice.arena, capacity)),
        })
    }

    fn pin(&mut self, arena: ArenaId) {
        if self.pinned_from.is_none() {
            self.pinned_from = Some(arena);
        }
    }

    /// Called once written payloads are referenced by admitted records.
    pub fn unpin(&mut self) {
        self.pinned_from = None;
    }

    pub fn pinned_from(&self) -> Option<ArenaId> {
        self.pinned_from
    }

    pub fn resolve(&self, slice: ArenaSlice) -> Result<&[u8], Error> {
        let released = || {
            Error::new(ErrorKind::OutOfRange)
                .with_message(format!("{} is not live", slice.arena))
        };
        let front = self.live.front().ok_or_else(released)?;
        let idx = slice
            .arena
            .0
            .checked_sub(front.id.0)
            .and_then(|idx| usize::try_from(idx).ok())
            .ok_or_else(released)?;
        let arena = self.live.get(idx).ok_or_else(released)?;
        arena.bytes(slice).ok_or_else(|| {
            Error::new(ErrorKind::OutOfRange)
                .with_message(format!("slice outside written range of {}", slice.arena))
        })
    }

    pub fn oldest(&self) -> Option<ArenaId> {
        self.live.front().map(Arena::id)
    }

    pub fn open(&self) -> Option<ArenaId> {
        self.live.back().map(Arena::id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Bytes held by live arenas, counted at full capacity.
    pub fn live_bytes(&self) -> usize {
        self.live.iter().map(Arena::capacity).sum()
    }

    /// Oldest arena still referenced, given the oldest arena that admitted
    /// records point into. Pending payloads count as references.
    pub fn frontier(&self, referenced: Option<ArenaId>) -> Option<ArenaId> {
        match (referenced, self.pinned_from) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Returns the oldest live arena to the pool.
    ///
    /// `referenced` is the oldest arena that admitted records point into;
    /// `None` means no record does. Returns the number of bytes released.
    pub fn release(&mut self, id: ArenaId, referenced: Option<ArenaId>) -> Result<usize, Error> {
        let Some(front) = self.live.front() else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("cannot release {id}: no live arenas")));
        };
        if front.id != id {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "cannot release {id}: oldest live arena is {}",
                front.id
            )));
        }
        if let Some(frontier) = self.frontier(referenced)
            && id >= frontier
        {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("cannot release {id}: still referenced (frontier {frontier})")));
        }
        let arena = self.live.pop_front().ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("live arena vanished")
        })?;
        let bytes = arena.capacity();
        self.pool.free(arena);
        Ok(bytes)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn report_statistics(&self) {
        self.pool.report_statistics();
    }
}

#[cfg(test)]
mod tests {
    use super::{Arena, ArenaStore};
    use crate::core::error::ErrorKind;
    use crate::core::pool::Pooled;

    #[test]
    fn carve_is_bump_allocated() {
        let mut arena = Arena::new(8);
        let a = arena.try_carve(b"abc").expect("a");
        let b = arena.try_carve(b"defgh").expect("b");
        assert_eq!((a.offset, a.len), (0, 3));
        assert_eq!((b.offset, b.len), (3, 5));
        assert!(arena.try_carve(b"i").is_none());
        assert_eq!(arena.bytes(b), Some(&b"defgh"[..]));

        arena.reset();
        assert_eq!(arena.remaining(), 8);
    }

    #[test]
    fn store_rolls_to_new_arena_when_full() {
        let mut store = ArenaStore::new(4, None);
        let first = store.write(b"abc").expect("first");
        assert!(first.allocated.is_some());
        let second = store.write(b"de").expect("second");
        let (second_arena, capacity) = second.allocated.expect("new arena");
        assert_eq!(capacity, 4);
        assert!(second_arena > first.slice.arena);
        assert_eq!(store.resolve(first.slice).expect("resolve"), b"abc");
        assert_eq!(store.resolve(second.slice).expect("resolve"), b"de");
        assert_eq!(store.live_count(), 2);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut store = ArenaStore::new(4, None);
        let err = store.write(b"too long").expect_err("too large");
        assert_eq!(err.kind(), ErrorKind::RecordTooLarge);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn release_respects_frontier_and_order() {
        let mut store = ArenaStore::new(2, None);
        let a = store.write(b"aa").expect("a").slice;
        let b = store.write(b"bb").expect("b").slice;
        store.unpin();

        let err = store.release(b.arena, None).expect_err("out of order");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = store.release(a.arena, Some(a.arena)).expect_err("still referenced");
        assert_eq!(err.kind(), ErrorKind::Usage);

        assert_eq!(store.release(a.arena, Some(b.arena)).expect("release"), 2);
        let err = store.resolve(a).expect_err("released");
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        let err = store.release(a.arena, Some(b.arena)).expect_err("double release");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn pinned_payloads_block_release() {
        let mut store = ArenaStore::new(2, None);
        let a = store.write(b"aa").expect("a").slice;
        store.write(b"bb").expect("b");
        let err = store.release(a.arena, None).expect_err("pinned");
        assert_eq!(err.kind(), ErrorKind::Usage);
        store.unpin();
        store.release(a.arena, None).expect("release after unpin");
    }

    #[test]
    fn frontier_merges_records_and_pending_payloads() {
        let mut store = ArenaStore::new(2, None);
        let a = store.write(b"aa").expect("a").slice;
        let b = store.write(b"bb").expect("b").slice;
        assert_eq!(store.frontier(None), Some(a.arena));
        assert_eq!(store.frontier(Some(b.arena)), Some(a.arena));
        store.unpin();
        assert_eq!(store.frontier(Some(b.arena)), Some(b.arena));
        assert_eq!(store.frontier(None), None);
    }

    #[test]
    fn open_arena_can_be_released_once_unreferenced() {
        let mut store = ArenaStore::new(2, Some(1));
        let a = store.write(b"aa").expect("a").slice;
        store.unpin();
        assert_eq!(store.open(), Some(a.arena));
        store.release(a.arena, None).expect("release open");
        assert_eq!(store.open(), None);
        assert_eq!(store.live_count(), 0);
        let write = store.write(b"bb").expect("b");
        assert!(write.allocated.is_some());
        assert_eq!(store.resolve(write.slice).expect("resolve"), b"bb");
    }

    #[test]
    fn recycled_arena_gets_fresh_id() {
        let mut store = ArenaStore::new(2, Some(1));
        let a = store.write(b"aa").expect("a").slice;
        store.unpin();
        let err = store.write(b"bb").expect_err("pool exhausted");
        assert_eq!(err.kind(), ErrorKind::PoolExhausted);
        store.release(a.arena, None).expect("release");
        let b = store.write(b"bb").expect("b").slice;
        assert_ne!(a.arena, b.arena);
        assert!(store.resolve(a).is_err());
        assert_eq!(store.resolve(b).expect("resolve"), b"bb");
    }
}
