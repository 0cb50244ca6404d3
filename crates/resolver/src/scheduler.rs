use crate::{Resolver, ResolverError, Result};
use blame_protocol::{Attribution, FileId};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Quiet period after the last event before a refresh fires.
    pub debounce: Duration,
    /// Upper bound on how long a stream of events can postpone a refresh.
    pub max_wait: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            max_wait: Duration::from_secs(1),
        }
    }
}

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RefreshTrigger {
    /// Cursor moved: look the line up, cache permitting.
    Cursor,
    /// Document changed; the caller already invalidated the file.
    Edit,
    /// Explicit refresh: invalidate when the task fires, then look up.
    Refresh,
}

impl RefreshTrigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cursor => "cursor",
            Self::Edit => "edit",
            Self::Refresh => "refresh",
        }
    }

    const fn invalidates_on_fire(self) -> bool {
        matches!(self, Self::Refresh)
    }
}

/// Result of one fired refresh.
#[derive(Debug, Clone)]
pub struct AttributionUpdate {
    pub file: FileId,
    pub line: i64,
    pub trigger: RefreshTrigger,
    pub attribution: Attribution,
    pub completed_at: SystemTime,
}

/// Debounced, per-file delayed lookups on top of a [`Resolver`].
///
/// Each file has at most one pending task. Scheduling again for the same file
/// cancels the pending one and re-arms the delay with the new line; the
/// strongest trigger seen during the burst wins. Results are broadcast to
/// subscribers; a lookup whose file was invalidated while it ran broadcasts
/// nothing.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    command_tx: mpsc::Sender<SchedulerCommand>,
    update_tx: broadcast::Sender<AttributionUpdate>,
}

enum SchedulerCommand {
    Schedule {
        file: FileId,
        line: i64,
        trigger: RefreshTrigger,
        immediate: bool,
    },
    Cancel {
        file: FileId,
    },
    Flush,
    Shutdown,
}

impl RefreshScheduler {
    /// Spawn the scheduling loop. Must be called inside a tokio runtime.
    pub fn start(resolver: Resolver, config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (update_tx, _) = broadcast::channel(64);

        spawn_refresh_loop(resolver, config, command_rx, update_tx.clone());

        Self {
            inner: Arc::new(SchedulerInner {
                command_tx,
                update_tx,
            }),
        }
    }

    /// Arm (or re-arm) the delayed refresh for `file`.
    pub async fn schedule(&self, file: FileId, line: i64, trigger: RefreshTrigger) -> Result<()> {
        self.send(SchedulerCommand::Schedule {
            file,
            line,
            trigger,
            immediate: false,
        })
        .await
    }

    /// Fire the refresh for `file` without waiting for quiescence.
    pub async fn schedule_now(
        &self,
        file: FileId,
        line: i64,
        trigger: RefreshTrigger,
    ) -> Result<()> {
        self.send(SchedulerCommand::Schedule {
            file,
            line,
            trigger,
            immediate: true,
        })
        .await
    }

    /// Drop the pending refresh for `file`, if any. A refresh that already
    /// fired still delivers its update.
    pub async fn cancel(&self, file: FileId) -> Result<()> {
        self.send(SchedulerCommand::Cancel { file }).await
    }

    /// Fire every pending refresh now instead of waiting out its delay.
    pub async fn flush(&self) -> Result<()> {
        self.send(SchedulerCommand::Flush).await
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AttributionUpdate> {
        self.inner.update_tx.subscribe()
    }

    async fn send(&self, command: SchedulerCommand) -> Result<()> {
        self.inner
            .command_tx
            .send(command)
            .await
            .map_err(|_| ResolverError::SchedulerClosed)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(SchedulerCommand::Shutdown);
        }
    }
}

/// Debounce bookkeeping for one file's pending refresh.
#[derive(Debug)]
struct PendingRefresh {
    debounce: Duration,
    max_wait: Duration,
    line: i64,
    trigger: RefreshTrigger,
    first_event: Instant,
    last_event: Instant,
    immediate: bool,
}

impl PendingRefresh {
    fn new(config: SchedulerConfig, line: i64, trigger: RefreshTrigger, immediate: bool) -> Self {
        let now = Instant::now();
        Self {
            debounce: config.debounce,
            max_wait: config.max_wait,
            line,
            trigger,
            first_event: now,
            last_event: now,
            immediate,
        }
    }

    fn rearm(&mut self, line: i64, trigger: RefreshTrigger, immediate: bool) {
        self.line = line;
        self.trigger = self.trigger.max(trigger);
        self.last_event = Instant::now();
        self.immediate |= immediate;
    }

    fn deadline(&self) -> Instant {
        if self.immediate {
            return self.last_event;
        }
        let quiet = self.last_event + self.debounce;
        let forced = self.first_event + self.max_wait;
        quiet.min(forced)
    }
}

fn spawn_refresh_loop(
    resolver: Resolver,
    config: SchedulerConfig,
    mut command_rx: mpsc::Receiver<SchedulerCommand>,
    update_tx: broadcast::Sender<AttributionUpdate>,
) {
    tokio::spawn(async move {
        let mut pending: HashMap<FileId, PendingRefresh> = HashMap::new();

        loop {
            let next = pending
                .iter()
                .min_by_key(|(_, task)| task.deadline())
                .map(|(file, task)| (file.clone(), task.deadline()));
            let next_deadline = next.as_ref().map(|(_, deadline)| *deadline);

            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::Schedule { file, line, trigger, immediate }) => {
                            pending
                                .entry(file)
                                .and_modify(|task| task.rearm(line, trigger, immediate))
                                .or_insert_with(|| PendingRefresh::new(config, line, trigger, immediate));
                        }
                        Some(SchedulerCommand::Cancel { file }) => {
                            if pending.remove(&file).is_some() {
                                debug!("cancelled pending refresh for {file}");
                            }
                        }
                        Some(SchedulerCommand::Flush) => {
                            for (file, task) in pending.drain() {
                                fire_refresh(resolver.clone(), file, task, update_tx.clone());
                            }
                        }
                        Some(SchedulerCommand::Shutdown) | None => break,
                    }
                }
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => {
                    let Some((file, _)) = next else {
                        continue;
                    };
                    if let Some(task) = pending.remove(&file) {
                        fire_refresh(resolver.clone(), file, task, update_tx.clone());
                    }
                }
            }
        }
        debug!("refresh scheduler stopped ({} pending dropped)", pending.len());
    });
}

fn fire_refresh(
    resolver: Resolver,
    file: FileId,
    task: PendingRefresh,
    update_tx: broadcast::Sender<AttributionUpdate>,
) {
    // Own task per refresh so a slow annotate never delays other deadlines.
    tokio::spawn(async move {
        if task.trigger.invalidates_on_fire() {
            resolver.invalidate(&file);
        }
        debug!(
            "refreshing {file}:{} ({})",
            task.line,
            task.trigger.as_str()
        );
        let Some(attribution) = resolver.resolve_fresh(&file, task.line).await else {
            debug!("dropping stale result for {file}:{}", task.line);
            return;
        };
        let _ = update_tx.send(AttributionUpdate {
            file,
            line: task.line,
            trigger: task.trigger,
            attribution,
            completed_at: SystemTime::now(),
        });
    });
}
