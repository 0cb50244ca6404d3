//! JSON-lines editor session: events in on one stream, replies out on another.

use crate::display::{attribution_reply, stats_reply};
use anyhow::{Context, Result};
use blame_protocol::{serialize_json, FileId, SessionEvent, SessionReply};
use blame_resolver::{AttributionUpdate, RefreshScheduler, RefreshTrigger, Resolver, SchedulerConfig};
use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;

pub const REFRESHED_NOTICE: &str = "blame refreshed";
pub const CLEARED_NOTICE: &str = "blame cache cleared";
pub const NO_ACTIVE_LINE_NOTICE: &str = "no active line";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveLine {
    file: FileId,
    line: i64,
}

struct Session {
    resolver: Resolver,
    scheduler: RefreshScheduler,
    active: Option<ActiveLine>,
}

/// Serve one editor session until `input` reaches EOF. Refreshes still
/// pending at EOF are fired and their results written before returning.
pub async fn run<R, W>(
    resolver: Resolver,
    config: SchedulerConfig,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(
        "session started (debounce {:?}, max wait {:?}, busy policy {:?})",
        config.debounce,
        config.max_wait,
        resolver.config().busy_policy
    );
    let mut session = Session {
        scheduler: RefreshScheduler::start(resolver.clone(), config),
        resolver,
        active: None,
    };
    let mut updates = session.scheduler.subscribe();
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read session input")? else {
                    break;
                };
                if let Some(reply) = session.handle_line(&line).await? {
                    write_reply(&mut output, &reply).await?;
                }
            }
            update = updates.recv() => match update {
                Ok(update) => {
                    if let Some(reply) = reply_for_update(session.active.as_ref(), &update) {
                        write_reply(&mut output, &reply).await?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("session fell behind, {skipped} updates skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    let Session {
        scheduler, active, ..
    } = session;
    scheduler.flush().await?;
    drop(scheduler);

    loop {
        match updates.recv().await {
            Ok(update) => {
                if let Some(reply) = reply_for_update(active.as_ref(), &update) {
                    write_reply(&mut output, &reply).await?;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    debug!("session input closed");
    Ok(())
}

impl Session {
    async fn handle_line(&mut self, raw: &str) -> Result<Option<SessionReply>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<SessionEvent>(raw) {
            Ok(event) => self.handle_event(event).await,
            Err(err) => {
                warn!("ignoring malformed session event: {err}");
                Ok(Some(SessionReply::Error {
                    message: format!("invalid event: {err}"),
                }))
            }
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Result<Option<SessionReply>> {
        match event {
            SessionEvent::Cursor { file, line } => {
                let file = FileId::new(file);
                self.active = Some(ActiveLine {
                    file: file.clone(),
                    line,
                });
                self.scheduler
                    .schedule(file, line, RefreshTrigger::Cursor)
                    .await?;
            }
            SessionEvent::Edit { file, line } => {
                let file = FileId::new(file);
                self.resolver.invalidate(&file);
                if let Some(active) = self.follow_active(&file, line) {
                    self.scheduler
                        .schedule(active.file, active.line, RefreshTrigger::Edit)
                        .await?;
                }
            }
            SessionEvent::Save { file, line } => {
                let file = FileId::new(file);
                self.resolver.invalidate(&file);
                if let Some(active) = self.follow_active(&file, line) {
                    self.scheduler
                        .schedule_now(active.file, active.line, RefreshTrigger::Edit)
                        .await?;
                }
            }
            SessionEvent::Close { file } => {
                let file = FileId::new(file);
                self.resolver.invalidate(&file);
                self.scheduler.cancel(file.clone()).await?;
                if self.active.as_ref().is_some_and(|active| active.file == file) {
                    self.active = None;
                }
            }
            SessionEvent::Show => {
                let Some(active) = self.active.clone() else {
                    return Ok(Some(notice(NO_ACTIVE_LINE_NOTICE)));
                };
                self.scheduler
                    .schedule_now(active.file, active.line, RefreshTrigger::Cursor)
                    .await?;
            }
            SessionEvent::Refresh => {
                if let Some(active) = self.active.clone() {
                    self.scheduler
                        .schedule_now(active.file, active.line, RefreshTrigger::Refresh)
                        .await?;
                }
                return Ok(Some(notice(REFRESHED_NOTICE)));
            }
            SessionEvent::Clear => {
                self.resolver.invalidate_all();
                return Ok(Some(notice(CLEARED_NOTICE)));
            }
            SessionEvent::Stats => return Ok(Some(stats_reply(&self.resolver.stats()))),
        }
        Ok(None)
    }

    /// The active line, if `file` is the active file; an event that carries
    /// a line moves the active line with it.
    fn follow_active(&mut self, file: &FileId, line: Option<i64>) -> Option<ActiveLine> {
        let active = self.active.as_mut().filter(|active| active.file == *file)?;
        if let Some(line) = line {
            active.line = line;
        }
        Some(active.clone())
    }
}

fn reply_for_update(active: Option<&ActiveLine>, update: &AttributionUpdate) -> Option<SessionReply> {
    let active = active?;
    if active.file != update.file || active.line != update.line {
        debug!(
            "dropping {} result for {}:{} (no longer active)",
            update.trigger.as_str(),
            update.file,
            update.line
        );
        return None;
    }
    Some(attribution_reply(
        &update.file,
        update.line,
        &update.attribution,
    ))
}

fn notice(message: &str) -> SessionReply {
    SessionReply::Notice {
        message: message.to_string(),
    }
}

async fn write_reply<W: AsyncWrite + Unpin>(output: &mut W, reply: &SessionReply) -> Result<()> {
    let mut line = serialize_json(reply)?;
    line.push('\n');
    output
        .write_all(line.as_bytes())
        .await
        .context("Failed to write session reply")?;
    output.flush().await.context("Failed to flush session output")
}
