mod support;

use blame_protocol::{Attribution, FileId};
use blame_resolver::{BusyPolicy, RefreshScheduler, RefreshTrigger, SchedulerConfig};
use pretty_assertions::assert_eq;
use std::time::Duration;
use support::{resolver, FakeRunner, THREE_LINES};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::{self, Instant};

fn config() -> SchedulerConfig {
    SchedulerConfig {
        debounce: Duration::from_millis(200),
        max_wait: Duration::from_secs(1),
    }
}

#[tokio::test(start_paused = true)]
async fn cursor_burst_coalesces_into_one_lookup() {
    let runner = FakeRunner::new(THREE_LINES);
    let scheduler = RefreshScheduler::start(resolver(&runner, BusyPolicy::Queue), config());
    let mut updates = scheduler.subscribe();
    let file = FileId::from("/w/main.rs");

    for line in 1..=3 {
        scheduler
            .schedule(file.clone(), line, RefreshTrigger::Cursor)
            .await
            .expect("schedule");
        time::sleep(Duration::from_millis(50)).await;
    }

    let update = updates.recv().await.expect("update");
    assert_eq!(update.file, file);
    assert_eq!(update.line, 3);
    assert_eq!(update.trigger, RefreshTrigger::Cursor);
    assert_eq!(
        update.attribution.record().map(|record| record.author().to_string()),
        Some("carol".to_string())
    );
    assert_eq!(runner.calls(), 1);
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn steady_stream_is_forced_out_by_max_wait() {
    let runner = FakeRunner::new(THREE_LINES);
    let scheduler = RefreshScheduler::start(resolver(&runner, BusyPolicy::Queue), config());
    let mut updates = scheduler.subscribe();
    let file = FileId::from("/w/typing.rs");

    let started = Instant::now();
    let producer = {
        let scheduler = scheduler.clone();
        let file = file.clone();
        tokio::spawn(async move {
            for line in 1..=12 {
                if scheduler
                    .schedule(file.clone(), line, RefreshTrigger::Edit)
                    .await
                    .is_err()
                {
                    break;
                }
                time::sleep(Duration::from_millis(150)).await;
            }
        })
    };

    let update = updates.recv().await.expect("update");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1150), "fired late: {elapsed:?}");
    assert_eq!(update.trigger, RefreshTrigger::Edit);

    producer.abort();
}

#[tokio::test(start_paused = true)]
async fn cancel_suppresses_pending_lookup() {
    let runner = FakeRunner::new(THREE_LINES);
    let scheduler = RefreshScheduler::start(resolver(&runner, BusyPolicy::Queue), config());
    let mut updates = scheduler.subscribe();
    let closed = FileId::from("/w/closed.rs");
    let open = FileId::from("/w/open.rs");

    scheduler
        .schedule(closed.clone(), 4, RefreshTrigger::Cursor)
        .await
        .expect("schedule");
    scheduler.cancel(closed).await.expect("cancel");

    time::sleep(Duration::from_secs(2)).await;
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(runner.calls(), 0);

    scheduler
        .schedule(open.clone(), 1, RefreshTrigger::Cursor)
        .await
        .expect("schedule");
    let update = updates.recv().await.expect("update");
    assert_eq!(update.file, open);
    assert_eq!(runner.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_trigger_re_annotates_cached_file() {
    let runner = FakeRunner::new(THREE_LINES);
    runner.push(Ok("old cs:1\n".to_string()));
    let resolver = resolver(&runner, BusyPolicy::Queue);
    let scheduler = RefreshScheduler::start(resolver.clone(), config());
    let mut updates = scheduler.subscribe();
    let file = FileId::from("/w/main.rs");

    resolver.resolve(&file, 1).await;
    assert_eq!(runner.calls(), 1);

    scheduler
        .schedule_now(file.clone(), 1, RefreshTrigger::Cursor)
        .await
        .expect("schedule");
    let cached = updates.recv().await.expect("update");
    assert_eq!(
        cached.attribution.record().map(|record| record.author().to_string()),
        Some("old".to_string())
    );
    assert_eq!(runner.calls(), 1);

    scheduler
        .schedule_now(file.clone(), 1, RefreshTrigger::Refresh)
        .await
        .expect("schedule");
    let refreshed = updates.recv().await.expect("update");
    assert_eq!(refreshed.trigger, RefreshTrigger::Refresh);
    assert_eq!(
        refreshed.attribution.record().map(|record| record.author().to_string()),
        Some("alice".to_string())
    );
    assert_eq!(runner.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn invalid_line_still_reports_an_update() {
    let runner = FakeRunner::new(THREE_LINES);
    let scheduler = RefreshScheduler::start(resolver(&runner, BusyPolicy::Queue), config());
    let mut updates = scheduler.subscribe();

    scheduler
        .schedule(FileId::from("/w/main.rs"), 0, RefreshTrigger::Cursor)
        .await
        .expect("schedule");
    let update = updates.recv().await.expect("update");
    assert_eq!(update.attribution, Attribution::Unavailable);
    assert_eq!(runner.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn flush_fires_pending_lookups_and_shutdown_closes_updates() {
    let runner = FakeRunner::new(THREE_LINES);
    let scheduler = RefreshScheduler::start(resolver(&runner, BusyPolicy::Queue), config());
    let mut updates = scheduler.subscribe();
    let started = Instant::now();

    for name in ["/w/a.rs", "/w/b.rs"] {
        scheduler
            .schedule(FileId::from(name), 2, RefreshTrigger::Cursor)
            .await
            .expect("schedule");
    }
    scheduler.flush().await.expect("flush");
    drop(scheduler);

    let mut files = Vec::new();
    while let Ok(update) = updates.recv().await {
        files.push(update.file.to_string());
    }
    files.sort();
    assert_eq!(files, vec!["/w/a.rs".to_string(), "/w/b.rs".to_string()]);
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(runner.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_invalidated_mid_flight_broadcasts_nothing() {
    let runner = FakeRunner::new(THREE_LINES);
    runner.push(Ok("old cs:9\n".to_string()));
    runner.gate("/w/main.rs");
    let resolver = resolver(&runner, BusyPolicy::Queue);
    let scheduler = RefreshScheduler::start(resolver.clone(), config());
    let mut updates = scheduler.subscribe();
    let file = FileId::from("/w/main.rs");

    scheduler
        .schedule_now(file.clone(), 1, RefreshTrigger::Cursor)
        .await
        .expect("schedule");
    runner.entered().await;

    // The document changes while the first annotate is still running.
    resolver.invalidate(&file);
    runner.release(2);
    while resolver.stats().stale_discarded == 0 {
        tokio::task::yield_now().await;
    }
    assert!(matches!(updates.try_recv(), Err(TryRecvError::Empty)));

    scheduler
        .schedule_now(file.clone(), 1, RefreshTrigger::Edit)
        .await
        .expect("schedule");
    let update = updates.recv().await.expect("update");
    assert_eq!(
        update.attribution.record().map(|record| record.author().to_string()),
        Some("alice".to_string())
    );
    assert_eq!(runner.calls(), 2);
}
