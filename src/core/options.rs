// Cache sizing and bookkeeping options, loadable from JSON.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_BLOCK_CAPACITY: usize = 1024;
pub const DEFAULT_ARENA_CAPACITY: usize = 1 << 20;
pub const DEFAULT_PURGE_METADATA_RETENTION: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_STATISTICS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Records per block.
    pub block_capacity: usize,
    /// Bytes per payload arena; also the largest payload the cache accepts.
    pub arena_capacity: usize,
    /// Cap on arenas checked out at once; `None` grows without bound.
    pub max_arenas: Option<usize>,
    /// How long per-stream purge marks are kept; `None` disables the bookkeeping.
    #[serde(rename = "purge_metadata_retention_ms", with = "option_duration_ms")]
    pub purge_metadata_retention: Option<Duration>,
    #[serde(rename = "statistics_interval_ms", with = "option_duration_ms")]
    pub statistics_interval: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            max_arenas: None,
            purge_metadata_retention: Some(DEFAULT_PURGE_METADATA_RETENTION),
            statistics_interval: Some(DEFAULT_STATISTICS_INTERVAL),
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_capacity(mut self, block_capacity: usize) -> Self {
        self.block_capacity = block_capacity;
        self
    }

    pub fn with_arena_capacity(mut self, arena_capacity: usize) -> Self {
        self.arena_capacity = arena_capacity;
        self
    }

    pub fn with_max_arenas(mut self, max_arenas: Option<usize>) -> Self {
        self.max_arenas = max_arenas;
        self
    }

    pub fn with_purge_metadata_retention(mut self, retention: Option<Duration>) -> Self {
        self.purge_metadata_retention = retention;
        self
    }

    pub fn with_statistics_interval(mut self, interval: Option<Duration>) -> Self {
        self.statistics_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |message: &str| {
            Err(Error::new(ErrorKind::Usage)
                .with_message(message.to_string())
                .with_hint("Check the cache options."))
        };
        if self.block_capacity == 0 {
            return invalid("block_capacity must be greater than zero");
        }
        if self.arena_capacity == 0 {
            return invalid("arena_capacity must be greater than zero");
        }
        if u32::try_from(self.arena_capacity).is_err() {
            return invalid("arena_capacity must fit in 32 bits");
        }
        if self.max_arenas == Some(0) {
            return invalid("max_arenas must be greater than zero when set");
        }
        if self.purge_metadata_retention == Some(Duration::ZERO) {
            return invalid("purge_metadata_retention must be greater than zero when set");
        }
        if self.statistics_interval == Some(Duration::ZERO) {
            return invalid("statistics_interval must be greater than zero when set");
        }
        Ok(())
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

pub(crate) mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => super::duration_ms::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
