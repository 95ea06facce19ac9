mod interactive;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pushsync::progress::{format_bytes, ProgressSnapshot};
use pushsync::{
    CommitOptions, CommitOutcome, CommitResult, IgnoreTemplate, ProgressChannel, ProgressEvent,
    ProjectConfig, RepoPath, Selector,
};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::interactive::{marker, status_filter, InteractiveSelector};

#[derive(Parser)]
#[command(name = "pushsync")]
#[command(about = "Push a local project tree to a shared remote directory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory
    #[arg(short = 'C', long, global = true, default_value = ".")]
    directory: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the project descriptor and bind it to a remote directory
    Init {
        /// Remote directory
        #[arg(long)]
        remote: PathBuf,
        /// Starting ignore rules (default, godot, unreal, bevy)
        #[arg(long, default_value = "default")]
        template: IgnoreTemplate,
        /// Overwrite an existing descriptor and accept a non-empty remote
        #[arg(long)]
        force: bool,
    },
    /// Push local changes to the remote
    ///
    /// Changes are applied in the order selected. When a file was replaced by
    /// a directory of the same name, the new files cannot be pushed while the
    /// old file is still on the remote: push the delete alone first, then
    /// push the rest.
    #[command(alias = "commit")]
    Push {
        /// Push every change without prompting
        #[arg(long)]
        all: bool,
        /// Leave remote-only files in place
        #[arg(long)]
        skip_deletes: bool,
        /// Keep applying changes after one fails
        #[arg(long)]
        keep_going: bool,
    },
    /// Show what a push would do
    Status,
    /// Write the remote content of a file to stdout
    Cat {
        /// Project-relative path
        path: String,
    },
}

/// How the selection for a push is made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionMode {
    Prompt { skip_deletes: bool },
    Filter { skip_deletes: bool },
}

impl SelectionMode {
    fn from_flags(all: bool, skip_deletes: bool) -> Self {
        if all {
            SelectionMode::Filter { skip_deletes }
        } else {
            SelectionMode::Prompt { skip_deletes }
        }
    }

    fn selector(self) -> Box<dyn Selector> {
        match self {
            SelectionMode::Prompt { skip_deletes } => {
                Box::new(InteractiveSelector::new(status_filter(skip_deletes)))
            }
            SelectionMode::Filter { skip_deletes } => Box::new(status_filter(skip_deletes)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli)?;

    match cli.command {
        Commands::Init {
            remote,
            template,
            force,
        } => init_project(&cli.directory, remote, template, force),
        Commands::Push {
            all,
            skip_deletes,
            keep_going,
        } => {
            push(
                &cli.directory,
                SelectionMode::from_flags(all, skip_deletes),
                keep_going,
            )
            .await
        }
        Commands::Status => show_status(&cli.directory).await,
        Commands::Cat { path } => cat(&cli.directory, &path),
    }
}

fn filter_directive(log_level: &str, verbose: bool) -> String {
    let level = if verbose {
        "debug".to_string()
    } else {
        match log_level.to_lowercase().as_str() {
            level @ ("trace" | "debug" | "info" | "warn" | "error") => level.to_string(),
            _ => "info".to_string(),
        }
    };
    format!("pushsync={level},pushsync_cli={level}")
}

fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let directive = filter_directive(&cli.log_level, cli.verbose);
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let console_layer = fmt::layer().with_writer(io::stderr).with_filter(env_filter());

    let (file_layer, guard) = match &cli.log_file {
        Some(log_path) => {
            let directory = log_path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = log_path
                .file_name()
                .context("log file path has no file name")?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install the log subscriber")?;

    Ok(guard)
}

fn editor_name(config: &ProjectConfig) -> String {
    config.editor.clone().unwrap_or_else(whoami::username)
}

fn init_project(root: &Path, remote: PathBuf, template: IgnoreTemplate, force: bool) -> Result<()> {
    if ProjectConfig::exists(root)? && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            ProjectConfig::path_in(root).display()
        );
    }

    let config = ProjectConfig::new(&remote, template.rules());
    let records = pushsync::connect(&config)
        .with_context(|| format!("cannot open remote {}", remote.display()))?;
    if !records.is_empty()? && !force {
        bail!(
            "remote {} is not empty; pass --force to bind to it anyway",
            remote.display()
        );
    }

    config.save(root)?;
    info!(remote = %remote.display(), template = template.name(), "Project initialized");
    println!(
        "✅ Initialized {} with the {} template",
        ProjectConfig::path_in(root).display(),
        template.name()
    );
    Ok(())
}

async fn push(root: &Path, mode: SelectionMode, keep_going: bool) -> Result<()> {
    let config = ProjectConfig::load(root)?;
    let mut options = CommitOptions::new(editor_name(&config));
    options.continue_on_error = keep_going;
    debug!(editor = %options.editor, ?mode, keep_going, "Starting push");

    let (reporter, mut channel) = ProgressChannel::new();
    let engine = pushsync::open_engine(root, &config, options)?.with_progress(reporter.clone());

    let printer = tokio::spawn(async move {
        while let Some(event) = channel.recv().await {
            print_event(&event);
        }
    });

    // The printer loop ends once the engine and `reporter` are both dropped
    let result = tokio::task::spawn_blocking(move || {
        let mut selector = mode.selector();
        engine.commit(selector.as_mut())
    })
    .await
    .context("commit task panicked")?;
    let snapshot = reporter.snapshot();
    drop(reporter);
    printer.await.context("progress task panicked")?;

    report(result?)?;
    if snapshot.bytes > 0 {
        println!("{}", transfer_line(&snapshot));
    }
    Ok(())
}

fn transfer_line(snapshot: &ProgressSnapshot) -> String {
    format!(
        "Read {} in {:.2}s ({})",
        format_bytes(snapshot.bytes),
        snapshot.elapsed_time.as_secs_f64(),
        snapshot.transfer_rate_human()
    )
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::CommitStarted { full_push: true, .. } => {
            println!("Remote is empty, pushing every file");
        }
        ProgressEvent::Uploaded {
            path,
            status,
            bytes,
            ..
        } => println!("  {} {} ({})", marker(*status), path, format_bytes(*bytes)),
        ProgressEvent::Removed { path } => println!("  - {}", path),
        ProgressEvent::EntryFailed { path, error } => println!("❌ {}: {}", path, error),
        _ => {}
    }
}

fn report(result: CommitResult) -> Result<()> {
    match &result.outcome {
        CommitOutcome::Initial { pushed } => {
            println!("✅ Pushed {} files", pushed.len());
        }
        CommitOutcome::Incremental { delta, report } => {
            if delta.is_empty() {
                println!("Nothing to commit");
                return Ok(());
            }
            if !report.failed.is_empty() {
                println!("{}", result.metrics.summary());
                bail!("{} of the selected changes failed", report.failed.len());
            }
            println!("✅ {}", result.metrics.summary());
        }
    }
    Ok(())
}

async fn show_status(root: &Path) -> Result<()> {
    let config = ProjectConfig::load(root)?;
    let engine = pushsync::open_engine(root, &config, CommitOptions::new(editor_name(&config)))?;
    let delta = tokio::task::spawn_blocking(move || engine.status())
        .await
        .context("status task panicked")??;

    if delta.is_empty() {
        println!("Nothing to commit");
        return Ok(());
    }
    for entry in delta.iter() {
        println!("{}", entry);
    }
    let summary = delta.summary();
    println!(
        "\n{} to create, {} to change, {} to delete",
        summary.creates, summary.changes, summary.deletes
    );
    Ok(())
}

fn cat(root: &Path, path: &str) -> Result<()> {
    let config = ProjectConfig::load(root)?;
    let records = pushsync::connect(&config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let record = records
        .download(&RepoPath::new(path), &mut out)
        .with_context(|| format!("cannot read {} from the remote", path))?;
    out.flush()?;
    debug!(path, editor = %record.last_editor, "Downloaded");
    Ok(())
}
