use crate::limits::SpawnSnapshot;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how a resolver has been answering lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Lookups answered from a cached table
    pub hits: u64,

    /// Valid lookups that found no usable cached record
    pub misses: u64,

    /// Annotate subprocesses started
    pub spawns: u64,

    /// Annotate runs that failed (exit status, stderr, spawn, timeout)
    pub failures: u64,

    /// Lookups answered `Unavailable` because the file was already refreshing
    pub busy_dropped: u64,

    /// Lookups that waited on another caller's refresh
    pub queued: u64,

    /// Refresh results thrown away because the file was invalidated meanwhile
    pub stale_discarded: u64,

    /// `invalidate` / `invalidate_all` calls
    pub invalidations: u64,

    /// Files with a cached table right now
    pub cached_files: usize,

    /// Files with a refresh in flight right now
    pub refreshing_files: usize,

    pub spawn_limit: SpawnSnapshot,
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub spawns: AtomicU64,
    pub failures: AtomicU64,
    pub busy_dropped: AtomicU64,
    pub queued: AtomicU64,
    pub stale_discarded: AtomicU64,
    pub invalidations: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        cached_files: usize,
        refreshing_files: usize,
        spawn_limit: SpawnSnapshot,
    ) -> ResolverStats {
        ResolverStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            spawns: self.spawns.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            busy_dropped: self.busy_dropped.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            cached_files,
            refreshing_files,
            spawn_limit,
        }
    }
}
