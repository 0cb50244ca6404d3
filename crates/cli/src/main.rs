use anyhow::{Context, Result};
use blame_annotate::{parse, AnnotateRunner, CommandRunner};
use blame_protocol::{serialize_json, FileId};
use blame_resolver::{BusyPolicy, Resolver};
use clap::{Args, Parser, Subcommand, ValueEnum};
use config::{Overrides, Settings};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{self, BufReader};

mod config;
mod display;
mod session;

#[derive(Parser)]
#[command(name = "inline-blame")]
#[command(about = "Per-line author and revision annotations for editors", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./.inline-blame.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Annotate program to run (default: cm)
    #[arg(long, global = true)]
    annotate_program: Option<String>,

    /// Annotate argument; repeat for several. `{file}` is replaced by the path,
    /// otherwise the path is appended
    #[arg(long = "annotate-arg", global = true, allow_hyphen_values = true)]
    annotate_args: Vec<String>,

    /// Annotate timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Quiet period before a session lookup fires, in milliseconds
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,

    /// What lookups do while their file is being re-annotated
    #[arg(long, global = true, value_enum)]
    busy: Option<BusyArg>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show who last changed one line
    Line(LineArgs),

    /// Annotate a whole file and print every line's attribution
    Table(TableArgs),

    /// Serve JSON-lines editor events on stdin, replies on stdout
    Session,
}

#[derive(Args)]
struct LineArgs {
    /// File to annotate
    file: PathBuf,

    /// 1-based line number
    #[arg(allow_hyphen_values = true)]
    line: i64,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct TableArgs {
    /// File to annotate
    file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum BusyArg {
    Queue,
    Drop,
}

impl From<BusyArg> for BusyPolicy {
    fn from(value: BusyArg) -> Self {
        match value {
            BusyArg::Queue => Self::Queue,
            BusyArg::Drop => Self::Drop,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let overrides = Overrides {
        annotate_program: cli.annotate_program.clone(),
        annotate_args: cli.annotate_args.clone(),
        timeout_ms: cli.timeout_ms,
        debounce_ms: cli.debounce_ms,
        busy_policy: cli.busy.map(BusyPolicy::from),
    };
    let settings = Settings::load(cli.config.as_deref(), &overrides)?;
    log::debug!(
        "annotate via {} {:?} (timeout {:?})",
        settings.annotate.program,
        settings.annotate.args,
        settings.annotate.timeout
    );
    let runner = Arc::new(CommandRunner::new(settings.annotate.clone()));

    match cli.command {
        Commands::Line(args) => run_line(runner, &settings, args).await,
        Commands::Table(args) => run_table(runner.as_ref(), args).await,
        Commands::Session => {
            let resolver = Resolver::new(runner, settings.resolver);
            session::run(
                resolver,
                settings.scheduler,
                BufReader::new(io::stdin()),
                io::stdout(),
            )
            .await
        }
    }
}

async fn run_line(runner: Arc<CommandRunner>, settings: &Settings, args: LineArgs) -> Result<()> {
    let file = FileId::from_path(&absolute(&args.file)?);
    let resolver = Resolver::new(runner, settings.resolver);
    let attribution = resolver.resolve(&file, args.line).await;

    if args.json {
        let reply = display::attribution_reply(&file, args.line, &attribution);
        println!("{}", serialize_json(&reply)?);
    } else {
        println!("{}", display::attribution_text(&attribution));
    }
    Ok(())
}

async fn run_table(runner: &CommandRunner, args: TableArgs) -> Result<()> {
    let path = absolute(&args.file)?;
    let raw = runner
        .annotate(&path)
        .await
        .with_context(|| format!("Failed to annotate {}", path.display()))?;
    let records = parse(&raw);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    let width = records.len().to_string().len();
    for record in &records {
        println!(
            "{:>width$}  {}",
            record.line_number(),
            display::decoration(record)
        );
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("Cannot determine current directory")?;
    Ok(cwd.join(path))
}
