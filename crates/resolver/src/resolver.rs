use crate::cache::{AttributionCache, FileAttributionTable, Lookup};
use crate::limits::{default_annotate_concurrency, SpawnLimiter};
use crate::stats::{ResolverStats, StatsCounters};
use blame_annotate::{parse, AnnotateRunner};
use blame_protocol::{Attribution, FileId};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// What a lookup does when its file is already being re-annotated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Wait for the running refresh and answer from its result.
    #[default]
    Queue,
    /// Answer `Unavailable` right away.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    pub busy_policy: BusyPolicy,
    pub max_concurrent_annotations: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            busy_policy: BusyPolicy::default(),
            max_concurrent_annotations: default_annotate_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    Stored,
    Failed,
    Stale,
}

type OutcomeRx = watch::Receiver<Option<RefreshOutcome>>;

struct InFlight {
    id: u64,
    done: OutcomeRx,
}

#[derive(Default)]
struct ResolverState {
    cache: AttributionCache,
    in_flight: HashMap<FileId, InFlight>,
    next_refresh_id: u64,
}

impl ResolverState {
    fn owns_refresh(&self, file: &FileId, id: u64) -> bool {
        self.in_flight.get(file).is_some_and(|entry| entry.id == id)
    }
}

enum Plan {
    Answer(Attribution),
    Wait(OutcomeRx),
    Lead(RefreshTicket),
}

struct RefreshTicket {
    id: u64,
    done: watch::Sender<Option<RefreshOutcome>>,
}

/// Answers "who last touched line N of file F", annotating whole files on
/// demand and caching the parsed tables until they're invalidated.
///
/// Clones share the same cache. At most one annotate process runs per file;
/// invalidating a file while its refresh is running detaches that refresh, and
/// its result is discarded when it lands.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    runner: Arc<dyn AnnotateRunner>,
    config: ResolverConfig,
    state: Mutex<ResolverState>,
    limiter: SpawnLimiter,
    stats: StatsCounters,
}

impl ResolverInner {
    fn lock_state(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight marker if the leading lookup goes away early.
struct InFlightGuard<'a> {
    inner: &'a ResolverInner,
    file: &'a FileId,
    id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        if state.owns_refresh(self.file, self.id) {
            state.in_flight.remove(self.file);
        }
    }
}

impl Resolver {
    pub fn new(runner: Arc<dyn AnnotateRunner>, config: ResolverConfig) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                runner,
                config,
                state: Mutex::new(ResolverState::default()),
                limiter: SpawnLimiter::new(config.max_concurrent_annotations),
                stats: StatsCounters::default(),
            }),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Attribution for a 1-based line. Lines below 1 never reach the
    /// annotate tool; failures are logged and come back as `Unavailable`.
    pub async fn resolve(&self, file: &FileId, line: i64) -> Attribution {
        self.resolve_fresh(file, line)
            .await
            .unwrap_or(Attribution::Unavailable)
    }

    /// Same as [`resolve`](Self::resolve), except that `None` means the file
    /// was invalidated while this lookup waited on its refresh. The answer
    /// would describe content that no longer exists, so callers showing it
    /// should keep their current display and wait for a newer lookup.
    pub async fn resolve_fresh(&self, file: &FileId, line: i64) -> Option<Attribution> {
        let Some(line) = usize::try_from(line).ok().filter(|line| *line >= 1) else {
            debug!("ignoring lookup for line {line} of {file}");
            return Some(Attribution::Unavailable);
        };

        match self.plan(file, line) {
            Plan::Answer(attribution) => Some(attribution),
            Plan::Wait(done) => self.wait_for_refresh(file, line, done).await,
            Plan::Lead(ticket) => self.lead_refresh(file, line, ticket).await,
        }
    }

    /// Drop the cached table for one file and detach its running refresh.
    pub fn invalidate(&self, file: &FileId) {
        let (had_table, detached) = {
            let mut state = self.inner.lock_state();
            (
                state.cache.remove(file).is_some(),
                state.in_flight.remove(file).is_some(),
            )
        };
        StatsCounters::bump(&self.inner.stats.invalidations);
        debug!("invalidated {file} (cached: {had_table}, refresh detached: {detached})");
    }

    /// Drop every cached table and detach every running refresh.
    pub fn invalidate_all(&self) {
        let (tables, detached) = {
            let mut state = self.inner.lock_state();
            let detached = state.in_flight.len();
            state.in_flight.clear();
            (state.cache.clear(), detached)
        };
        StatsCounters::bump(&self.inner.stats.invalidations);
        debug!("invalidated all files ({tables} cached, {detached} refreshes detached)");
    }

    pub fn cached_table_len(&self, file: &FileId) -> Option<usize> {
        self.inner.lock_state().cache.table_len(file)
    }

    pub fn is_refreshing(&self, file: &FileId) -> bool {
        self.inner.lock_state().in_flight.contains_key(file)
    }

    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        let (cached_files, refreshing_files) = {
            let state = self.inner.lock_state();
            (state.cache.len(), state.in_flight.len())
        };
        self.inner
            .stats
            .snapshot(cached_files, refreshing_files, self.inner.limiter.snapshot())
    }

    fn plan(&self, file: &FileId, line: usize) -> Plan {
        let stats = &self.inner.stats;
        let mut state = self.inner.lock_state();

        match state.cache.lookup(file, line) {
            Lookup::Hit(record) => {
                StatsCounters::bump(&stats.hits);
                return Plan::Answer(Attribution::Record(record));
            }
            Lookup::OutOfRange { len } => {
                debug!("line {line} is past the {len} cached records for {file}");
            }
            Lookup::Missing => debug!("no cached table for {file}"),
        }
        StatsCounters::bump(&stats.misses);

        if let Some(running) = state.in_flight.get(file) {
            return match self.inner.config.busy_policy {
                BusyPolicy::Queue => {
                    StatsCounters::bump(&stats.queued);
                    Plan::Wait(running.done.clone())
                }
                BusyPolicy::Drop => {
                    StatsCounters::bump(&stats.busy_dropped);
                    Plan::Answer(Attribution::Unavailable)
                }
            };
        }

        let id = state.next_refresh_id;
        state.next_refresh_id = state.next_refresh_id.wrapping_add(1);
        let (done, rx) = watch::channel(None);
        state.in_flight.insert(file.clone(), InFlight { id, done: rx });
        Plan::Lead(RefreshTicket { id, done })
    }

    async fn lead_refresh(
        &self,
        file: &FileId,
        line: usize,
        ticket: RefreshTicket,
    ) -> Option<Attribution> {
        let inner = &*self.inner;
        let guard = InFlightGuard {
            inner,
            file,
            id: ticket.id,
        };

        let result = {
            let _permit = inner.limiter.acquire().await;
            StatsCounters::bump(&inner.stats.spawns);
            inner.runner.annotate(file.as_path()).await
        };

        let (outcome, attribution) = match result {
            Err(err) => {
                StatsCounters::bump(&inner.stats.failures);
                warn!("annotate failed for {file} ({}): {err}", err.kind());
                (RefreshOutcome::Failed, Some(Attribution::Unavailable))
            }
            Ok(raw) => {
                let table = FileAttributionTable::from(parse(&raw));
                let mut state = inner.lock_state();
                if state.owns_refresh(file, ticket.id) {
                    state.in_flight.remove(file);
                    let attribution = Attribution::from(table.get(line).cloned());
                    info!("annotated {file}: {} lines", table.len());
                    state.cache.store(file.clone(), table);
                    (RefreshOutcome::Stored, Some(attribution))
                } else {
                    StatsCounters::bump(&inner.stats.stale_discarded);
                    debug!("discarding annotate result for {file}: invalidated while running");
                    (RefreshOutcome::Stale, None)
                }
            }
        };

        drop(guard);
        let _ = ticket.done.send(Some(outcome));
        attribution
    }

    async fn wait_for_refresh(
        &self,
        file: &FileId,
        line: usize,
        mut done: OutcomeRx,
    ) -> Option<Attribution> {
        let outcome = match done.wait_for(Option::is_some).await {
            Ok(outcome) => *outcome,
            // Leader dropped before finishing.
            Err(_) => None,
        };

        match outcome {
            Some(RefreshOutcome::Stored) => {}
            Some(RefreshOutcome::Stale) => return None,
            Some(RefreshOutcome::Failed) | None => return Some(Attribution::Unavailable),
        }

        match self.inner.lock_state().cache.lookup(file, line) {
            Lookup::Hit(record) => Some(Attribution::Record(record)),
            Lookup::OutOfRange { .. } => Some(Attribution::Unavailable),
            // Invalidated between the store and this lookup.
            Lookup::Missing => None,
        }
    }
}
