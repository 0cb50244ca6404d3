#![allow(dead_code)]

use async_trait::async_trait;
use blame_annotate::{AnnotateError, AnnotateRunner};
use blame_resolver::{BusyPolicy, Resolver, ResolverConfig};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

pub type Response = Result<String, AnnotateError>;

/// Scripted stand-in for the annotate subprocess.
///
/// Responses are consumed in call order; once the script runs out every call
/// gets `fallback`. When `gated` matches the path, the call parks until the
/// test releases it.
pub struct FakeRunner {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Response>>,
    fallback: String,
    gated: Mutex<Option<PathBuf>>,
    gate: Semaphore,
    entered: Notify,
}

impl FakeRunner {
    pub fn new(fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            gated: Mutex::new(None),
            gate: Semaphore::new(0),
            entered: Notify::new(),
        })
    }

    pub fn push(&self, response: Response) {
        self.script.lock().expect("script lock").push_back(response);
    }

    pub fn gate(&self, path: &str) {
        *self.gated.lock().expect("gate lock") = Some(PathBuf::from(path));
    }

    pub fn release(&self, runs: usize) {
        self.gate.add_permits(runs);
    }

    /// Wait until a gated call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnnotateRunner for FakeRunner {
    async fn annotate(&self, file: &Path) -> Result<String, AnnotateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));

        let gated = self
            .gated
            .lock()
            .expect("gate lock")
            .as_deref()
            .is_some_and(|gated| gated == file);
        if gated {
            self.entered.notify_one();
            self.gate.acquire().await.expect("gate open").forget();
        }
        response
    }
}

pub fn resolver(runner: &Arc<FakeRunner>, busy_policy: BusyPolicy) -> Resolver {
    Resolver::new(
        runner.clone(),
        ResolverConfig {
            busy_policy,
            max_concurrent_annotations: 4,
        },
    )
}

pub fn exit_failure(stderr: &str) -> Response {
    Err(AnnotateError::Exit {
        code: Some(1),
        stderr: stderr.to_string(),
    })
}

pub const THREE_LINES: &str = "alice cs:1 fn main() {\nbob cs:2     run();\ncarol cs:3 }\n";
