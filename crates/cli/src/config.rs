use anyhow::{Context, Result};
use blame_annotate::AnnotateCommand;
use blame_resolver::{
    BusyPolicy, ResolverConfig, SchedulerConfig, ANNOTATE_CONCURRENCY_ENV,
    MAX_ANNOTATE_CONCURRENCY,
};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = ".inline-blame.toml";
pub const ANNOTATE_PROGRAM_ENV: &str = "INLINE_BLAME_ANNOTATE_PROGRAM";
pub const DEBOUNCE_ENV: &str = "INLINE_BLAME_DEBOUNCE_MS";

/// On-disk layout of `.inline-blame.toml`. Every key is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub annotate: AnnotateSection,
    #[serde(default)]
    pub resolver: ResolverSection,
    #[serde(default)]
    pub session: SessionSection,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotateSection {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub timeout_ms: Option<u64>,
    pub working_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverSection {
    pub busy_policy: Option<BusyPolicy>,
    pub max_concurrent_annotations: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    pub debounce_ms: Option<u64>,
    pub max_wait_ms: Option<u64>,
}

/// Values taken from command-line flags; `None` leaves the lower layers alone.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub annotate_program: Option<String>,
    pub annotate_args: Vec<String>,
    pub timeout_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
    pub busy_policy: Option<BusyPolicy>,
}

/// Fully layered settings: defaults, then the config file, then the
/// environment, then flags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    pub annotate: AnnotateCommand,
    pub resolver: ResolverConfig,
    pub scheduler: SchedulerConfig,
}

impl Settings {
    /// Load settings for this process. An explicit `--config` path must
    /// exist; the implicit `.inline-blame.toml` is optional.
    pub fn load(explicit: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let file = match explicit {
            Some(path) => Some(read_config(path)?),
            None => {
                let implicit = Path::new(CONFIG_FILE_NAME);
                if implicit.is_file() {
                    Some(read_config(implicit)?)
                } else {
                    None
                }
            }
        };

        let mut settings = Self::default();
        if let Some(file) = file {
            settings.apply_file(file);
        }
        settings.apply_env(|var| env::var(var).ok())?;
        settings.apply_overrides(overrides);
        Ok(settings)
    }

    fn apply_file(&mut self, file: FileConfig) {
        let FileConfig {
            annotate,
            resolver,
            session,
        } = file;

        if let Some(program) = annotate.program {
            self.annotate.program = program;
        }
        if let Some(args) = annotate.args {
            self.annotate.args = args;
        }
        if let Some(ms) = annotate.timeout_ms {
            self.annotate.timeout = Duration::from_millis(ms);
        }
        if annotate.working_dir.is_some() {
            self.annotate.working_dir = annotate.working_dir;
        }

        if let Some(policy) = resolver.busy_policy {
            self.resolver.busy_policy = policy;
        }
        if let Some(limit) = resolver.max_concurrent_annotations {
            self.resolver.max_concurrent_annotations = limit;
        }

        if let Some(ms) = session.debounce_ms {
            self.scheduler.debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = session.max_wait_ms {
            self.scheduler.max_wait = Duration::from_millis(ms);
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(program) = var(ANNOTATE_PROGRAM_ENV).filter(|v| !v.trim().is_empty()) {
            self.annotate.program = program;
        }
        if let Some(raw) = var(DEBOUNCE_ENV).filter(|v| !v.trim().is_empty()) {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{DEBOUNCE_ENV} must be milliseconds, got {raw:?}"))?;
            self.scheduler.debounce = Duration::from_millis(ms);
        }
        if let Some(raw) = var(ANNOTATE_CONCURRENCY_ENV).filter(|v| !v.trim().is_empty()) {
            let limit: usize = raw.trim().parse().with_context(|| {
                format!("{ANNOTATE_CONCURRENCY_ENV} must be a process count, got {raw:?}")
            })?;
            self.resolver.max_concurrent_annotations = limit.clamp(1, MAX_ANNOTATE_CONCURRENCY);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(program) = &overrides.annotate_program {
            self.annotate.program = program.clone();
        }
        if !overrides.annotate_args.is_empty() {
            self.annotate.args = overrides.annotate_args.clone();
        }
        if let Some(ms) = overrides.timeout_ms {
            self.annotate.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.debounce_ms {
            self.scheduler.debounce = Duration::from_millis(ms);
        }
        if let Some(policy) = overrides.busy_policy {
            self.resolver.busy_policy = policy;
        }
        // A debounce longer than the cap would never be honored.
        if self.scheduler.max_wait < self.scheduler.debounce {
            self.scheduler.max_wait = self.scheduler.debounce;
        }
    }
}

fn read_config(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}
