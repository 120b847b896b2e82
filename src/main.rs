//! codepulse - Live, incremental code-structure metrics.
//!
//! Usage:
//!   codepulse analyze [PATH]     Analyze once, reusing the last snapshot
//!   codepulse diff [PATH]        Show files changed since the last snapshot
//!   codepulse watch [PATH]...    Keep metrics current while files change
//!   codepulse --help             Show help

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use itertools::Itertools;
use tracing_subscriber::EnvFilter;

use codepulse_analyze::{
    ChangeKind, EngineConfig, HeuristicAnalyzer, IncrementalEngine, detect_changes_detailed,
    index_records,
};
use codepulse_core::{AppConfig, DirectorySnapshot, PersistedState, ScanFilters, SnapshotStore};
use codepulse_scan::DirectoryScanner;
use codepulse_watch::{
    AnalysisContext, AnalysisKind, ConfigHandle, PresentationHandle, SnapshotUpdate, TargetEvent,
};

#[derive(Parser)]
#[command(
    name = "codepulse",
    version,
    about = "Live, incremental code-structure metrics",
    long_about = "codepulse keeps line, function and complexity metrics for a source tree \
                  up to date, re-analyzing only the files whose content changed."
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a directory or file and print a summary
    Analyze {
        /// Path to analyze
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        filters: FilterArgs,

        /// Snapshot document to seed from and update
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Persist only the file list
        #[arg(long)]
        flat: bool,

        /// Analyze changed files in parallel
        #[arg(short, long)]
        parallel: bool,

        /// Number of most complex functions to list
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show files changed since the last persisted snapshot
    Diff {
        /// Path to compare
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        filters: FilterArgs,

        /// Snapshot document to compare against
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Also list unchanged files
        #[arg(short, long)]
        all: bool,
    },

    /// Watch paths and re-analyze them as they change
    Watch {
        /// Paths to watch
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        filters: FilterArgs,

        /// Debounce window in milliseconds (100-10000)
        #[arg(short, long)]
        debounce: Option<u64>,

        /// Directory for persisted snapshots
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Presentation kind of the terminal sessions
        #[arg(short, long, default_value = "static")]
        kind: AnalysisKind,
    },
}

/// Scan filter overrides shared by every command.
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Maximum traversal depth (1 = immediate children, 0 = unlimited)
    #[arg(long)]
    depth: Option<u32>,

    /// Recursive scan with the extended exclude list
    #[arg(long, conflicts_with = "depth")]
    deep: bool,

    /// Additional exclude glob (repeatable)
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Skip files larger than this (e.g., "512KB", "2MB")
    #[arg(long)]
    max_size: Option<String>,

    /// Descend into hidden directories
    #[arg(long)]
    hidden: bool,
}

impl FilterArgs {
    fn resolve(&self, base: &ScanFilters) -> Result<ScanFilters> {
        let mut filters = if self.deep {
            ScanFilters::deep()
        } else {
            base.clone()
        };
        if let Some(depth) = self.depth {
            filters.max_depth = Some(depth);
        }
        filters.exclude_patterns.extend(self.exclude.iter().cloned());
        if let Some(size) = &self.max_size {
            filters.max_file_size = parse_size(size)?;
        }
        if self.hidden {
            filters.skip_hidden_dirs = false;
        }
        Ok(filters)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let app = AppConfig::load(&config_path)
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    match cli.command {
        Command::Analyze {
            path,
            filters,
            state,
            flat,
            parallel,
            top,
            format,
        } => {
            let filters = filters.resolve(&app.watch.filters)?;
            run_analyze(&app, &path, &filters, state, flat, parallel, top, format)?;
        }
        Command::Diff {
            path,
            filters,
            state,
            all,
        } => {
            let filters = filters.resolve(&app.watch.filters)?;
            run_diff(&app, &path, &filters, state, all)?;
        }
        Command::Watch {
            paths,
            filters,
            debounce,
            state_dir,
            kind,
        } => {
            let mut watch = app.watch.clone();
            watch.filters = filters.resolve(&app.watch.filters)?;
            if let Some(ms) = debounce {
                watch = watch.with_debounce_ms(ms);
            }
            let store = SnapshotStore::new(state_dir.unwrap_or_else(|| app.state_dir()));

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(run_watch(paths, watch, store, kind))?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "codepulse=info",
        1 => "codepulse=debug",
        _ => "codepulse=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Directory a snapshot of `path` is rooted at.
fn snapshot_root(path: &Path) -> PathBuf {
    if path.is_file() {
        path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf())
    } else {
        path.to_path_buf()
    }
}

fn load_previous(state_path: &Path, root: &Path) -> Result<Option<DirectorySnapshot>> {
    let state = codepulse_core::load_state(state_path)
        .with_context(|| format!("Cannot read snapshot {}", state_path.display()))?;
    Ok(state.map(|s| s.into_snapshot(root)))
}

/// Run one incremental analysis and print the result.
#[allow(clippy::too_many_arguments)]
fn run_analyze(
    app: &AppConfig,
    path: &Path,
    filters: &ScanFilters,
    state: Option<PathBuf>,
    flat: bool,
    parallel: bool,
    top: usize,
    format: OutputFormat,
) -> Result<()> {
    let path = path.canonicalize().context("Invalid path")?;
    let state_path = state.unwrap_or_else(|| SnapshotStore::new(app.state_dir()).path_for(&path));
    let previous = load_previous(&state_path, &snapshot_root(&path))?;

    eprintln!("Analyzing {}...", path.display());

    let config = if parallel {
        EngineConfig::parallel()
    } else {
        EngineConfig::default()
    };
    let engine = IncrementalEngine::new(HeuristicAnalyzer::new()).with_config(config);
    let outcome = engine
        .run(&path, filters, previous.as_ref())
        .context("Analysis failed")?;

    codepulse_core::save_state(&state_path, &PersistedState::from_snapshot(&outcome.snapshot, flat))
        .with_context(|| format!("Cannot write snapshot {}", state_path.display()))?;

    match format {
        OutputFormat::Text => {
            print_summary(&outcome.snapshot, top);
            let changes = &outcome.changes;
            println!(
                " Changes: {} added, {} modified, {} deleted, {} unchanged",
                changes.added.len(),
                changes.modified.len(),
                changes.deleted.len(),
                changes.unchanged.len()
            );
            if !outcome.warnings.is_empty() {
                println!();
                println!("{} warning(s) during scan", outcome.warnings.len());
            }
            eprintln!("Snapshot saved to {}", state_path.display());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&outcome.snapshot)?);
        }
    }

    Ok(())
}

/// Compare the current tree against the persisted snapshot.
fn run_diff(
    app: &AppConfig,
    path: &Path,
    filters: &ScanFilters,
    state: Option<PathBuf>,
    all: bool,
) -> Result<()> {
    let path = path.canonicalize().context("Invalid path")?;
    let state_path = state.unwrap_or_else(|| SnapshotStore::new(app.state_dir()).path_for(&path));
    let Some(previous) = load_previous(&state_path, &snapshot_root(&path))? else {
        bail!(
            "No snapshot at {}; run `codepulse analyze` first",
            state_path.display()
        );
    };

    let scan = DirectoryScanner::new()
        .scan(&path, filters)
        .context("Scan failed")?;
    let changes = detect_changes_detailed(&index_records(&scan.records), &previous.hashes());

    let counts = changes.iter().counts_by(|c| c.change);
    println!(
        " {} added, {} modified, {} deleted, {} unchanged (snapshot from {})",
        counts.get(&ChangeKind::Added).unwrap_or(&0),
        counts.get(&ChangeKind::Modified).unwrap_or(&0),
        counts.get(&ChangeKind::Deleted).unwrap_or(&0),
        counts.get(&ChangeKind::Unchanged).unwrap_or(&0),
        previous.metadata.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    println!("{}", "─".repeat(70));

    for change in changes
        .iter()
        .filter(|c| all || c.change != ChangeKind::Unchanged)
    {
        let hashes = match (&change.previous_hash, &change.current_hash) {
            (Some(old), Some(new)) if old != new => format!("{} → {}", old.short(), new.short()),
            (Some(old), None) => old.short(),
            (_, Some(new)) => new.short(),
            (None, None) => String::new(),
        };
        println!(" {:<10} {:<50} {}", change.change.to_string(), truncate(&change.relative_path, 50), hashes);
    }

    Ok(())
}

/// Terminal presentation of a watched target.
struct TerminalSurface {
    target: PathBuf,
    store: SnapshotStore,
}

impl PresentationHandle for TerminalSurface {
    fn dispose(&self) {
        eprintln!("Stopped watching {}", self.target.display());
    }

    fn reveal(&self) -> bool {
        true
    }

    fn push_update(&self, update: &SnapshotUpdate) {
        let snapshot = &update.snapshot;
        let changes = &update.changes;
        println!(
            "[{}] {}: {} files, {} functions, avg complexity {:.2} (+{} ~{} -{}, {} analyzed in {} ms)",
            snapshot.metadata.timestamp.format("%H:%M:%S"),
            self.target.display(),
            snapshot.summary.total_files,
            snapshot.summary.total_functions,
            snapshot.summary.average_complexity,
            changes.added.len(),
            changes.modified.len(),
            changes.deleted.len(),
            snapshot.metadata.files_analyzed_this_session,
            snapshot.metadata.duration_ms
        );

        if let Err(e) = self
            .store
            .save(&self.target, &PersistedState::from_snapshot(snapshot, false))
        {
            tracing::warn!(path = %self.target.display(), error = %e, "failed to persist snapshot");
        }
    }
}

/// Watch every path until Ctrl-C.
async fn run_watch(
    paths: Vec<PathBuf>,
    config: codepulse_watch::WatchConfig,
    store: SnapshotStore,
    kind: AnalysisKind,
) -> Result<()> {
    let debounce = config.debounce();
    let context = AnalysisContext::new(
        IncrementalEngine::new(HeuristicAnalyzer::new()),
        ConfigHandle::new(config),
    );

    let mut failures = context.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = failures.recv().await {
            if let TargetEvent::Failed { target, message, .. } = event {
                eprintln!("Analysis of {} failed: {}", target.display(), message);
            }
        }
    });

    for path in paths.iter().unique() {
        let path = path.canonicalize().with_context(|| format!("Invalid path {}", path.display()))?;
        let seed = match store.load(&path) {
            Ok(state) => state.map(|s| s.into_snapshot(&snapshot_root(&path))),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable snapshot");
                None
            }
        };

        let surface = Arc::new(TerminalSurface {
            target: path.clone(),
            store: store.clone(),
        });
        let metadata = BTreeMap::from([("surface".to_string(), "terminal".to_string())]);
        context
            .open_session(&path, kind, surface, metadata, seed)
            .await
            .with_context(|| format!("Cannot watch {}", path.display()))?;

        // Catch up with edits made while nothing was watching
        context.analyze_now(&path).await?;
    }

    eprintln!(
        "Watching {} target(s), debounce {} ms. Press Ctrl-C to stop.",
        context.watched_targets().len(),
        debounce.as_millis()
    );

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    eprintln!();
    context.shutdown().await;

    Ok(())
}

/// Print a snapshot summary.
fn print_summary(snapshot: &DirectorySnapshot, top_n: usize) {
    let summary = &snapshot.summary;
    let total_bytes: u64 = snapshot.files.iter().map(|f| f.record.size_bytes).sum();

    println!();
    println!("{}", "─".repeat(70));
    println!(" {} - {}", snapshot.directory_path.display(), format_size(total_bytes));
    println!(
        " {} files analyzed ({} seen, {} not analyzed)",
        summary.total_files_analyzed, summary.files_seen, summary.total_files_not_analyzed
    );
    println!(
        " {} lines, {} comment lines, {} functions, {} classes",
        summary.total_lines, summary.total_comment_lines, summary.total_functions, summary.total_classes
    );
    println!(
        " Average complexity {:.2}, density {:.3}, parameters {:.2}",
        summary.average_complexity, summary.average_density, summary.average_parameters
    );
    println!(
        " {} in {} ms ({} file(s) analyzed this run)",
        if snapshot.metadata.is_incremental { "Incremental" } else { "Full analysis" },
        snapshot.metadata.duration_ms,
        snapshot.metadata.files_analyzed_this_session
    );
    println!("{}", "─".repeat(70));
    println!();

    if !summary.language_distribution.is_empty() {
        println!(" Languages:");
        let max = summary.language_distribution.values().copied().max().unwrap_or(1);
        for (language, count) in summary
            .language_distribution
            .iter()
            .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
        {
            println!(
                "   {:<14} {:>6} {}",
                language,
                count,
                make_bar(*count as f64 / max as f64, 20)
            );
        }
        println!();
    }

    let buckets = &summary.complexity_distribution;
    println!(
        " Complexity: {} low, {} medium, {} high, {} critical",
        buckets.low, buckets.medium, buckets.high, buckets.critical
    );
    let sizes = &summary.size_distribution;
    println!(
        " File sizes: {} small, {} medium, {} large, {} huge",
        sizes.small, sizes.medium, sizes.large, sizes.huge
    );

    if top_n > 0 && !snapshot.functions.is_empty() {
        println!();
        println!(" Most complex functions:");
        for function in snapshot
            .functions
            .iter()
            .sorted_by(|a, b| {
                b.complexity
                    .cmp(&a.complexity)
                    .then_with(|| a.owner_relative_path.cmp(&b.owner_relative_path))
                    .then_with(|| a.start_line.cmp(&b.start_line))
            })
            .take(top_n)
        {
            println!(
                "   {:>4}  {:<30} {}:{}",
                function.complexity,
                truncate(&function.name, 30),
                function.owner_relative_path,
                function.start_line
            );
        }
    }
    println!();
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

/// Parse a size string (e.g., "512KB", "2MB", "1GB").
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let digits = s.trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.');
    let unit = &s[digits.len()..];

    let multiplier: u64 = match unit {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        other => bail!("Unknown size unit: {other}"),
    };
    let num: f64 = digits
        .parse()
        .with_context(|| format!("Invalid size: {s}"))?;
    if num <= 0.0 {
        bail!("Size must be greater than zero");
    }

    Ok((num * multiplier as f64) as u64)
}
