//! Purpose: Define the packed, heap-free value types stored in cache blocks.
//! Exports: `StreamId`, `SequenceToken`, `Timestamp`, `ArenaId`, `ArenaSlice`, `EventRecord`.
//! Role: Shared vocabulary for blocks, cursors, eviction, and adapters.
//! Invariants: Every type here is `Copy`; records never own heap memory.
//! Invariants: Token order is (sequence_number, event_index), lexicographic.
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StreamId(u128);

impl StreamId {
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Derives a stable id from a stream namespace and key.
    pub fn from_name(namespace: &str, key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((namespace.len() as u64).to_le_bytes());
        hasher.update(namespace.as_bytes());
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&digest[..16]);
        Self(u128::from_le_bytes(raw))
    }

    pub const fn raw(self) -> u128 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SequenceToken {
    pub sequence_number: u64,
    pub event_index: u32,
}

impl SequenceToken {
    pub const fn new(sequence_number: u64, event_index: u32) -> Self {
        Self {
            sequence_number,
            event_index,
        }
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sequence_number, self.event_index)
    }
}

/// Nanoseconds since the UNIX epoch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const UNIX_EPOCH: Timestamp = Timestamp(0);

    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_nanos() as u64)
            .unwrap_or(0);
        Self(nanos)
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    pub fn to_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(self.0 as i128)
            .ok()
            .and_then(|ts| ts.format(&Rfc3339).ok())
            .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Generation number of a checked-out arena. Never reused.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ArenaId(pub(crate) u64);

impl ArenaId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arena-{}", self.0)
    }
}

/// Byte range inside exactly one arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ArenaSlice {
    pub arena: ArenaId,
    pub offset: u32,
    pub len: u32,
}

impl ArenaSlice {
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.len as usize
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EventRecord {
    pub stream_id: StreamId,
    pub sequence_number: u64,
    pub event_index: u32,
    pub enqueue_time: Timestamp,
    pub dequeue_time: Timestamp,
    pub payload: ArenaSlice,
}

impl EventRecord {
    /// Builds a record; `dequeue_time` is stamped when the cache admits it.
    pub fn new(
        stream_id: StreamId,
        token: SequenceToken,
        enqueue_time: Timestamp,
        payload: ArenaSlice,
    ) -> Self {
        Self {
            stream_id,
            sequence_number: token.sequence_number,
            event_index: token.event_index,
            enqueue_time,
            dequeue_time: enqueue_time,
            payload,
        }
    }

    pub fn token(&self) -> SequenceToken {
        SequenceToken::new(self.sequence_number, self.event_index)
    }
}

#[cfg(test)]
mod tests {
    use super::{ArenaId, ArenaSlice, EventRecord, SequenceToken, StreamId, Timestamp};
    use std::time::Duration;

    #[test]
    fn tokens_order_by_sequence_then_index() {
        let a = SequenceToken::new(5, 9);
        let b = SequenceToken::new(6, 0);
        let c = SequenceToken::new(6, 1);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(SequenceToken::new(6, 1), c);
    }

    #[test]
    fn stream_ids_from_names_are_stable_and_distinct() {
        let a = StreamId::from_name("orders", "42");
        assert_eq!(a, StreamId::from_name("orders", "42"));
        assert_ne!(a, StreamId::from_name("orders", "43"));
        assert_ne!(
            StreamId::from_name("ab", "c"),
            StreamId::from_name("a", "bc")
        );
    }

    #[test]
    fn records_stay_small() {
        assert!(std::mem::size_of::<EventRecord>() <= 64);
    }

    #[test]
    fn timestamps_saturate() {
        let early = Timestamp::from_millis(10);
        let late = early.saturating_add(Duration::from_millis(5));
        assert_eq!(late.saturating_duration_since(early), Duration::from_millis(5));
        assert_eq!(early.saturating_duration_since(late), Duration::ZERO);
        assert_eq!(Timestamp::UNIX_EPOCH.to_rfc3339(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn slice_range_covers_len() {
        let slice = ArenaSlice {
            arena: ArenaId(1),
            offset: 8,
            len: 4,
        };
        assert_eq!(slice.range(), 8..12);
    }
}
