//! Purpose: Pooled in-memory message cache shared by many replaying cursors.
//! Exports: `api` (stable surface), `core` (blocks, arenas, cache, eviction, errors).
//! Role: Buffering layer between a durable queue and lagging per-subscriber readers.
//! Invariants: One owner per cache instance; no internal locking on the data path.
//! Invariants: Pooled objects are returned explicitly, never on drop.
pub mod api;
pub mod core;
