//! # Blame Resolver
//!
//! Line attribution for editors: a per-file cache of annotate results, a
//! resolver that fills it on demand, and a debounced scheduler for
//! cursor/edit/save driven refreshes.
//!
//! ## Flow
//!
//! ```text
//! resolve(file, line)
//!     │
//!     ├──> cache hit ───────────────────────────> record
//!     │
//!     ├──> refresh already running for file ────> wait (Queue) / Unavailable (Drop)
//!     │
//!     └──> annotate whole file (spawn-limited)
//!            ├─> parse → table, stored unless invalidated meanwhile
//!            └─> record | Unavailable
//!
//! invalidate(file) / invalidate_all()   ← edit, save, close
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use blame_annotate::{AnnotateCommand, CommandRunner};
//! use blame_protocol::FileId;
//! use blame_resolver::{Resolver, ResolverConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = Arc::new(CommandRunner::new(AnnotateCommand::default()));
//!     let resolver = Resolver::new(runner, ResolverConfig::default());
//!
//!     let file = FileId::from("/work/src/main.rs");
//!     if let Some(record) = resolver.resolve(&file, 12).await.record() {
//!         println!("{} • {}", record.author(), record.revision_id());
//!     }
//!     resolver.invalidate(&file);
//! }
//! ```

mod cache;
mod error;
mod limits;
mod resolver;
mod scheduler;
mod stats;

pub use cache::FileAttributionTable;
pub use error::{ResolverError, Result};
pub use limits::{
    default_annotate_concurrency, SpawnSnapshot, ANNOTATE_CONCURRENCY_ENV, MAX_ANNOTATE_CONCURRENCY,
};
pub use resolver::{BusyPolicy, Resolver, ResolverConfig};
pub use scheduler::{AttributionUpdate, RefreshScheduler, RefreshTrigger, SchedulerConfig};
pub use stats::ResolverStats;
