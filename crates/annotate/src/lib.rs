//! # Blame Annotate
//!
//! The subprocess side of inline-blame: run an external annotate command for a
//! file and turn its loosely formatted text output into per-line records.
//!
//! ## Pipeline
//!
//! ```text
//! File path
//!     │
//!     ├──> AnnotateRunner (CommandRunner: `cm annotate <file>`)
//!     │      └─> stdout text, or AnnotateError on exit/stderr/timeout
//!     │
//!     └──> parse()
//!            └─> Vec<AttributionRecord>, one per output line
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use blame_annotate::{parse, AnnotateCommand, AnnotateRunner, CommandRunner};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), blame_annotate::AnnotateError> {
//!     let runner = CommandRunner::new(AnnotateCommand::default());
//!     let raw = runner.annotate(Path::new("/work/src/main.rs")).await?;
//!     for record in parse(&raw) {
//!         println!("{}: {} {}", record.line_number(), record.author(), record.revision_id());
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod parser;
mod runner;

pub use error::{AnnotateError, Result};
pub use parser::parse;
pub use runner::{
    AnnotateCommand, AnnotateRunner, CommandRunner, DEFAULT_PROGRAM, DEFAULT_TIMEOUT,
    FILE_PLACEHOLDER,
};
