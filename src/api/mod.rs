//! Purpose: Define the public Rust API boundary for the pooled cache.
//! Exports: Cache facade, record vocabulary, eviction, monitoring, and errors.
//! Role: Additive-only surface used by the CLI and integration tests.
//! Invariants: Internal helpers (block pool, arena store) are not re-exported here.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::adapter::{BytesAdapter, DataAdapter, Delivery};
pub use crate::core::cache::{MessageCache, PurgeMark};
pub use crate::core::cursor::{Cursor, CursorState};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::eviction::{
    ChronologicalEviction, EvictionStrategy, PurgeObservable, PurgeObserver, PurgePredicate,
    PurgeReport, TimePurgePredicate,
};
pub use crate::core::monitor::{
    CacheMonitor, CacheStats, CacheStatsSnapshot, MessageStatistics, PoolMonitor, PoolStats,
    TracingMonitor,
};
pub use crate::core::options::CacheOptions;
pub use crate::core::pool::PoolOptions;
pub use crate::core::queue_cache::QueueCache;
pub use crate::core::record::{
    ArenaId, ArenaSlice, EventRecord, SequenceToken, StreamId, Timestamp,
};
