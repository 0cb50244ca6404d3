use blame_protocol::{Attribution, AttributionRecord, FileId, SessionReply};
use blame_resolver::ResolverStats;

pub const UNAVAILABLE_TEXT: &str = "unavailable";

/// Inline decoration text for one line.
pub fn decoration(record: &AttributionRecord) -> String {
    format!("{} • {}", record.author(), record.revision_id())
}

pub fn attribution_text(attribution: &Attribution) -> String {
    attribution
        .record()
        .map_or_else(|| UNAVAILABLE_TEXT.to_string(), decoration)
}

pub fn attribution_reply(file: &FileId, line: i64, attribution: &Attribution) -> SessionReply {
    match attribution {
        Attribution::Record(record) => SessionReply::Attribution {
            file: file.to_string(),
            line: record.line_number(),
            author: record.author().to_string(),
            revision: record.revision_id().to_string(),
            date: record.date().map(str::to_string),
            text: decoration(record),
        },
        Attribution::Unavailable => SessionReply::Unavailable {
            file: file.to_string(),
            line,
        },
    }
}

pub fn stats_reply(stats: &ResolverStats) -> SessionReply {
    SessionReply::Stats {
        hits: stats.hits,
        misses: stats.misses,
        spawns: stats.spawns,
        failures: stats.failures,
        busy_dropped: stats.busy_dropped,
        queued: stats.queued,
        stale_discarded: stats.stale_discarded,
        invalidations: stats.invalidations,
        cached_files: stats.cached_files,
        refreshing_files: stats.refreshing_files,
        spawn_limit: stats.spawn_limit.limit,
        spawns_in_flight: stats.spawn_limit.in_flight,
        spawn_waiters: stats.spawn_limit.waiters,
    }
}
