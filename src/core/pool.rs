// Generic object pool with optional fixed size and instance-level statistics.
use std::fmt;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::monitor::{PoolMonitor, PoolStats};

/// Objects that can be recycled through an [`ObjectPool`].
pub trait Pooled {
    /// Clears per-use state before the object goes back on the free list.
    fn reset(&mut self);
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolOptions {
    /// Upper bound on objects created by the pool; `None` means unbounded.
    pub max_objects: Option<usize>,
    /// Objects created eagerly at construction.
    pub preallocate: usize,
}

impl PoolOptions {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn fixed(max_objects: usize) -> Self {
        Self {
            max_objects: Some(max_objects),
            preallocate: 0,
        }
    }

    pub fn with_preallocate(mut self, preallocate: usize) -> Self {
        self.preallocate = preallocate;
        self
    }
}

pub struct ObjectPool<T> {
    name: &'static str,
    free: Vec<T>,
    factory: Box<dyn Fn() -> T + Send>,
    options: PoolOptions,
    created: usize,
    claimed: usize,
    monitor: Option<Arc<dyn PoolMonitor>>,
}

impl<T: Pooled> ObjectPool<T> {
    pub fn new(
        name: &'static str,
        options: PoolOptions,
        factory: impl Fn() -> T + Send + 'static,
    ) -> Self {
        let mut pool = Self {
            name,
            free: Vec::new(),
            factory: Box::new(factory),
            options,
            created: 0,
            claimed: 0,
            monitor: None,
        };
        let eager = match options.max_objects {
            Some(max) => options.preallocate.min(max),
            None => options.preallocate,
        };
        for _ in 0..eager {
            let object = (pool.factory)();
            pool.created += 1;
            pool.free.push(object);
        }
        pool
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn PoolMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn set_monitor(&mut self, monitor: Option<Arc<dyn PoolMonitor>>) {
        self.monitor = monitor;
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Takes an object from the free list, or builds one while under the cap.
    pub fn allocate(&mut self) -> Result<T, Error> {
        let object = match self.free.pop() {
            Some(object) => object,
            None => {
                if let Some(max) = self.options.max_objects
                    && self.created >= max
                {
                    return Err(Error::new(ErrorKind::PoolExhausted)
                        .with_message(format!("{} pool exhausted ({max} objects in use)", self.name)));
                }
                self.created += 1;
                (self.factory)()
            }
        };
        self.claimed += 1;
        if let Some(monitor) = &self.monitor {
            monitor.track_object_allocated(self.name);
        }
        Ok(object)
    }

    /// Resets and returns an object to the free list.
    pub fn free(&mut self, mut object: T) {
        object.reset();
        self.claimed = self.claimed.saturating_sub(1);
        self.free.push(object);
        if let Some(monitor) = &self.monitor {
            monitor.track_object_released(self.name);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.created,
            available: self.free.len(),
            claimed: self.claimed,
        }
    }

    pub fn report_statistics(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.report(self.name, self.stats());
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("created", &self.created)
            .field("available", &self.free.len())
            .field("claimed", &self.claimed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ObjectPool, PoolOptions, Pooled};
    use crate::core::error::ErrorKind;
    use crate::core::monitor::{CacheStats, PoolMonitor};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Scratch {
        uses: usize,
        dirty: bool,
    }

    impl Pooled for Scratch {
        fn reset(&mut self) {
            self.dirty = false;
        }
    }

    #[test]
    fn freed_objects_are_reset_and_reused() {
        let mut pool = ObjectPool::new("scratch", PoolOptions::unbounded(), Scratch::default);
        let mut first = pool.allocate().expect("allocate");
        first.uses += 1;
        first.dirty = true;
        pool.free(first);

        let again = pool.allocate().expect("allocate");
        assert_eq!(again.uses, 1);
        assert!(!again.dirty);
        assert_eq!(pool.stats().total, 1);
        assert_eq!(pool.stats().claimed, 1);
    }

    #[test]
    fn fixed_pool_reports_exhaustion() {
        let mut pool = ObjectPool::new("scratch", PoolOptions::fixed(2), Scratch::default);
        let a = pool.allocate().expect("a");
        let _b = pool.allocate().expect("b");
        let err = pool.allocate().expect_err("exhausted");
        assert_eq!(err.kind(), ErrorKind::PoolExhausted);

        pool.free(a);
        pool.allocate().expect("reuse after free");
        assert_eq!(pool.stats().total, 2);
    }

    #[test]
    fn preallocation_respects_cap() {
        let pool = ObjectPool::new(
            "scratch",
            PoolOptions::fixed(3).with_preallocate(8),
            Scratch::default,
        );
        let stats = pool.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.available, 3);
        assert_eq!(stats.claimed, 0);
    }

    #[test]
    fn monitor_sees_claims() {
        let stats = Arc::new(CacheStats::new());
        let monitor: Arc<dyn PoolMonitor> = stats.clone();
        let mut pool =
            ObjectPool::new("scratch", PoolOptions::unbounded(), Scratch::default).with_monitor(monitor);
        let a = pool.allocate().expect("a");
        let _b = pool.allocate().expect("b");
        pool.free(a);
        assert_eq!(stats.snapshot().pool_objects_claimed, 1);
    }
}
