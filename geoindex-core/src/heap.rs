//! Heap accounting around the index build.
//!
//! A [`HeapProfileScope`] samples the allocator before and after the work it
//! brackets. Process-wide profilers allow a single open scope at a time so
//! samples never overlap.

use std::fmt::Debug;
use std::mem;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};

use crate::ConfigError;

/// Name of the scope holding the process-wide profiler, if any.
static ACTIVE_SCOPE: Mutex<Option<String>> = Mutex::new(None);

/// Source of allocated-bytes samples.
pub trait HeapProfiler: Send + Sync + Debug {
    /// Bytes currently allocated by the process, when known.
    fn allocated_bytes(&self) -> Option<u64>;

    /// Whether samples describe the whole process.
    ///
    /// Scopes over process-wide profilers are exclusive.
    fn is_process_wide(&self) -> bool {
        true
    }
}

/// Profiler that never produces samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledProfiler;

impl HeapProfiler for DisabledProfiler {
    fn allocated_bytes(&self) -> Option<u64> {
        None
    }

    fn is_process_wide(&self) -> bool {
        false
    }
}

/// Reads `stats.allocated` from jemalloc after refreshing its statistics.
///
/// Samples are only meaningful when jemalloc is the global allocator. A
/// reading of zero means jemalloc is linked but serves no allocations, and is
/// reported as no sample.
#[cfg(feature = "jemalloc")]
#[cfg_attr(docsrs, doc(cfg(feature = "jemalloc")))]
#[derive(Debug, Default, Clone, Copy)]
pub struct JemallocProfiler;

#[cfg(feature = "jemalloc")]
impl HeapProfiler for JemallocProfiler {
    fn allocated_bytes(&self) -> Option<u64> {
        use tikv_jemalloc_ctl::{epoch, stats};

        if let Err(err) = epoch::advance() {
            debug!("jemalloc epoch refresh failed: {err}");
            return None;
        }
        match stats::allocated::read() {
            Ok(0) => {
                debug!("jemalloc is not the global allocator");
                None
            }
            Ok(bytes) => u64::try_from(bytes).ok(),
            Err(err) => {
                debug!("jemalloc stats unavailable: {err}");
                None
            }
        }
    }
}

/// Allocator samples taken around one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapSample {
    /// Scope name.
    pub name: String,
    /// Bytes allocated when the scope opened.
    pub before: Option<u64>,
    /// Bytes allocated when the scope closed.
    pub after: Option<u64>,
}

impl HeapSample {
    /// Bytes retained across the scope, clamped at zero.
    #[must_use]
    pub fn retained_bytes(&self) -> Option<u64> {
        Some(self.after?.saturating_sub(self.before?))
    }
}

/// Open heap profile scope.
///
/// The scope is released when [`finish`](Self::finish) is called or when the
/// guard is dropped, whichever comes first.
#[derive(Debug)]
pub struct HeapProfileScope<'p> {
    profiler: &'p dyn HeapProfiler,
    name: String,
    before: Option<u64>,
    exclusive: bool,
}

impl<'p> HeapProfileScope<'p> {
    /// Open a scope called `name` and take the first sample.
    ///
    /// # Errors
    /// Returns [`ConfigError::ProfilerBusy`] when `profiler` is process-wide
    /// and another scope is still open.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoindex_core::{DisabledProfiler, HeapProfileScope};
    ///
    /// let scope = HeapProfileScope::start(&DisabledProfiler, "build").expect("scope");
    /// let sample = scope.finish();
    /// assert_eq!(sample.name, "build");
    /// assert_eq!(sample.retained_bytes(), None);
    /// ```
    pub fn start(profiler: &'p dyn HeapProfiler, name: &str) -> Result<Self, ConfigError> {
        let exclusive = profiler.is_process_wide();
        if exclusive {
            let mut active = ACTIVE_SCOPE.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(current) = active.as_ref() {
                return Err(ConfigError::ProfilerBusy {
                    active: current.clone(),
                    requested: name.to_owned(),
                });
            }
            *active = Some(name.to_owned());
        }
        debug!("heap profile {name} started");
        Ok(Self {
            profiler,
            name: name.to_owned(),
            before: profiler.allocated_bytes(),
            exclusive,
        })
    }

    /// Take the closing sample and release the scope.
    #[must_use]
    pub fn finish(mut self) -> HeapSample {
        let after = self.profiler.allocated_bytes();
        let sample = HeapSample {
            name: mem::take(&mut self.name),
            before: self.before,
            after,
        };
        self.release();
        debug!("heap profile {} stopped", sample.name);
        sample
    }

    fn release(&mut self) {
        if !mem::take(&mut self.exclusive) {
            return;
        }
        let mut active = ACTIVE_SCOPE.lock().unwrap_or_else(PoisonError::into_inner);
        *active = None;
    }
}

impl Drop for HeapProfileScope<'_> {
    fn drop(&mut self) {
        if self.exclusive {
            warn!("heap profile {} released without a sample", self.name);
            self.release();
        }
    }
}
