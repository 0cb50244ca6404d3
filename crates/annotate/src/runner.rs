use crate::{AnnotateError, Result};
use async_trait::async_trait;
use log::debug;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

/// Argument placeholder replaced by the annotated file's path.
pub const FILE_PLACEHOLDER: &str = "{file}";

pub const DEFAULT_PROGRAM: &str = "cm";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The one async capability the resolver needs: annotate a whole file.
#[async_trait]
pub trait AnnotateRunner: Send + Sync {
    async fn annotate(&self, file: &Path) -> Result<String>;
}

/// How to invoke the external annotate tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotateCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

impl Default for AnnotateCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: vec!["annotate".to_string()],
            timeout: DEFAULT_TIMEOUT,
            working_dir: None,
        }
    }
}

impl AnnotateCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Arguments for one file: `{file}` is substituted in place, otherwise the
    /// path goes last.
    pub fn argv_for(&self, file: &Path) -> Vec<OsString> {
        let mut substituted = false;
        let mut argv: Vec<OsString> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(FILE_PLACEHOLDER) {
                    substituted = true;
                    OsString::from(arg.replace(FILE_PLACEHOLDER, &file.to_string_lossy()))
                } else {
                    OsString::from(arg)
                }
            })
            .collect();
        if !substituted {
            argv.push(file.as_os_str().to_os_string());
        }
        argv
    }
}

/// Runs the configured annotate program as a child process.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    command: AnnotateCommand,
}

impl CommandRunner {
    pub const fn new(command: AnnotateCommand) -> Self {
        Self { command }
    }

    pub const fn command(&self) -> &AnnotateCommand {
        &self.command
    }
}

#[async_trait]
impl AnnotateRunner for CommandRunner {
    async fn annotate(&self, file: &Path) -> Result<String> {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(self.command.argv_for(file))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.command.working_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let output = match timeout(self.command.timeout, cmd.output()).await {
            Err(_) => return Err(AnnotateError::Timeout(self.command.timeout)),
            Ok(Err(source)) => {
                return Err(AnnotateError::Spawn {
                    program: self.command.program.clone(),
                    source,
                })
            }
            Ok(Ok(output)) => output,
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(AnnotateError::Exit {
                code: output.status.code(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            return Err(AnnotateError::Stderr(stderr));
        }

        debug!(
            "annotate {} finished in {}ms ({} bytes)",
            file.display(),
            started.elapsed().as_millis(),
            output.stdout.len()
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
