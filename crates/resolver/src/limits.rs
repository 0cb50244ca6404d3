use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Upper bound for any configured annotate concurrency.
pub const MAX_ANNOTATE_CONCURRENCY: usize = 16;

pub const ANNOTATE_CONCURRENCY_ENV: &str = "INLINE_BLAME_MAX_ANNOTATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpawnSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

fn default_cpu_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if cpus <= 2 {
        1
    } else if cpus <= 8 {
        2
    } else {
        4
    }
}

fn parse_annotate_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_ANNOTATE_CONCURRENCY)
}

/// Cap on concurrently running annotate processes, from the environment or
/// the CPU count.
pub fn default_annotate_concurrency() -> usize {
    let raw = std::env::var(ANNOTATE_CONCURRENCY_ENV).ok();
    parse_annotate_concurrency(raw.as_deref(), default_cpu_concurrency())
}

/// Bounds how many annotate subprocesses one resolver runs at once.
pub(crate) struct SpawnLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
    in_flight: Arc<AtomicUsize>,
    waiters: AtomicUsize,
}

impl SpawnLimiter {
    pub(crate) fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_ANNOTATE_CONCURRENCY);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            in_flight: Arc::new(AtomicUsize::new(0)),
            waiters: AtomicUsize::new(0),
        }
    }

    pub(crate) fn snapshot(&self) -> SpawnSnapshot {
        SpawnSnapshot {
            limit: self.limit,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            waiters: self.waiters.load(Ordering::Relaxed),
        }
    }

    pub(crate) async fn acquire(&self) -> SpawnPermit {
        // The semaphore is never closed; acquire failures are not expected.
        let waiter = WaiterGuard::new(&self.waiters);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("annotate spawn semaphore closed"));
        drop(waiter);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        SpawnPermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        }
    }
}

/// Counts a pending `acquire`, including one whose future is dropped early.
struct WaiterGuard<'a>(&'a AtomicUsize);

impl<'a> WaiterGuard<'a> {
    fn new(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::Relaxed);
        Self(waiters)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

pub(crate) struct SpawnPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for SpawnPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
