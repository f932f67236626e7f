// Core modules implementing records, pooled storage, the cache, and eviction.
pub mod adapter;
pub mod arena;
pub mod block;
pub mod block_pool;
pub mod cache;
pub mod cursor;
pub mod error;
pub mod eviction;
pub mod monitor;
pub mod options;
pub mod periodic;
pub mod pool;
pub mod queue_cache;
pub mod record;
