use std::time::Duration;
use thiserror::Error;

/// Result type for annotate operations
pub type Result<T> = std::result::Result<T, AnnotateError>;

/// Ways an annotate invocation can fail
#[derive(Error, Debug)]
pub enum AnnotateError {
    /// The program could not be started
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited unsuccessfully
    #[error("annotate exited with {}: {stderr}", exit_label(.code))]
    Exit { code: Option<i32>, stderr: String },

    /// The program succeeded but wrote to stderr
    #[error("annotate reported an error: {0}")]
    Stderr(String),

    /// The program did not finish in time
    #[error("annotate timed out after {0:?}")]
    Timeout(Duration),
}

impl AnnotateError {
    /// Short machine-friendly label used in logs and counters
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Exit { .. } => "exit",
            Self::Stderr(_) => "stderr",
            Self::Timeout(_) => "timeout",
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| format!("status {c}"))
}
