//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::{ColoredString, Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use recycle_keeper::core::config::Config;
use recycle_keeper::core::errors::RkError;
use recycle_keeper::index::batches::{Batch, ListOptions, list_batches};
use recycle_keeper::index::entry::now_millis;
use recycle_keeper::recycle::maintain::{
    MaintainOptions, MaintenanceOutcome, MaintenanceStatus, maintain_recycle_bin,
};
use recycle_keeper::recycle::quarantine::{QuarantineOptions, QuarantineOutcome, quarantine_paths};
use recycle_keeper::recycle::restore::{
    ConflictPolicy, RestoreOptions, RestoreOutcome, RestoreStatus, restore_batch,
};
use recycle_keeper::recycle::schedule::{read_state, write_state};
use recycle_keeper::recycle::stats::{RecycleStats, StatsOptions, collect_recycle_stats};

/// Recycle Keeper: quarantine, restore, and evict recycled files.
#[derive(Debug, Parser)]
#[command(
    name = "rk",
    author,
    version,
    about = "Recycle Keeper - quarantine bin with retention",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Summarize the recycle root (read-only).
    Stats,
    /// List live batches, newest first.
    Batches(BatchesArgs),
    /// Apply the retention policy.
    Maintain(MaintainArgs),
    /// Move a batch back to its original locations.
    Restore(RestoreArgs),
    /// Move paths into a new batch.
    Quarantine(QuarantineArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct BatchesArgs {
    /// Show at most this many batches.
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, Clone, Args, Default)]
struct MaintainArgs {
    /// Report what would be evicted without touching the filesystem.
    #[arg(long)]
    dry_run: bool,
    /// Only run when the schedule interval has elapsed since the last run.
    #[arg(long)]
    if_due: bool,
}

#[derive(Debug, Clone, Args)]
struct RestoreArgs {
    /// Batch to restore.
    batch_id: String,
    /// What to do when the original path is occupied (rename|overwrite|skip).
    #[arg(long)]
    conflict: Option<ConflictPolicy>,
    /// Report what would be restored without moving anything.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Args)]
struct QuarantineArgs {
    /// Files or directories to quarantine.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Tag recorded on every entry of the batch.
    #[arg(long, default_value = "manual")]
    scope: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) | Self::Json(_) => 2,
            Self::Partial(_) => 4,
        }
    }
}

impl From<RkError> for CliError {
    fn from(error: RkError) -> Self {
        match error {
            RkError::InvalidConfig { .. }
            | RkError::MissingConfig { .. }
            | RkError::ConfigParse { .. } => Self::User(error.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Stats => run_stats(cli, &config),
        Command::Batches(args) => run_batches(cli, &config, args),
        Command::Maintain(args) => run_maintain(cli, &config, args),
        Command::Restore(args) => run_restore(cli, &config, args),
        Command::Quarantine(args) => run_quarantine(cli, &config, args),
    }
}

fn run_stats(cli: &Cli, config: &Config) -> Result<(), CliError> {
    let mut options = StatsOptions::new(&config.paths.index_path, &config.paths.recycle_root);
    options.size_concurrency = config.stats.size_concurrency;
    let stats = collect_recycle_stats(&options)?;

    match output_mode(cli) {
        OutputMode::Human => print_stats_human(config, &stats),
        OutputMode::Json => {
            let payload = json!({
                "command": "stats",
                "recycleRoot": config.paths.recycle_root,
                "totalBatches": stats.total_batches,
                "totalBytes": stats.total_bytes,
                "indexedBytes": stats.indexed_bytes,
                "oldestTime": stats.oldest_time,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_stats_human(config: &Config, stats: &RecycleStats) {
    println!("Recycle root: {}", config.paths.recycle_root.display());
    println!("  Batches:       {}", stats.total_batches);
    println!("  On disk:       {}", format_bytes(stats.total_bytes));
    println!("  Indexed:       {}", format_bytes(stats.indexed_bytes));
    match stats.oldest_time {
        Some(t) => println!("  Oldest batch:  {}", format_time(t)),
        None => println!("  Oldest batch:  -"),
    }
    let policy = config.retention_policy();
    let threshold = policy.threshold_bytes();
    if stats.total_bytes > threshold {
        println!(
            "  {}",
            format!("over size threshold ({})", format_bytes(threshold)).yellow()
        );
    }
}

fn run_batches(cli: &Cli, config: &Config, args: &BatchesArgs) -> Result<(), CliError> {
    let mut batches = list_batches(
        &config.paths.index_path,
        ListOptions {
            recycle_root: Some(&config.paths.recycle_root),
        },
    )?;
    if let Some(limit) = args.limit {
        batches.truncate(limit);
    }

    match output_mode(cli) {
        OutputMode::Human => {
            if batches.is_empty() {
                println!("No batches.");
                return Ok(());
            }
            println!(
                "  {:<24}  {:<19}  {:>7}  {:>10}  {:<12}",
                "Batch", "First seen", "Entries", "Size", "Scope"
            );
            println!("  {}", "-".repeat(80));
            for batch in &batches {
                print_batch_row(batch);
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "batches",
                "batches": batches,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_batch_row(batch: &Batch) {
    println!(
        "  {:<24}  {:<19}  {:>7}  {:>10}  {:<12}",
        batch.batch_id,
        format_time(batch.first_time),
        batch.entries.len(),
        format_bytes(batch.total_bytes),
        batch.scope().unwrap_or("-"),
    );
}

fn run_maintain(cli: &Cli, config: &Config, args: &MaintainArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    let mut state = read_state(&config.paths.state_file);
    let policy = state.apply_to(&config.retention_policy());
    let now = now_millis();

    if args.if_due && !policy.is_due(now, config.schedule.interval_ms()) {
        match mode {
            OutputMode::Human => println!(
                "Maintenance not due (last run {}).",
                format_time(policy.last_run_at)
            ),
            OutputMode::Json => write_json_line(&json!({
                "command": "maintain",
                "status": "not_due",
                "lastRunAt": policy.last_run_at,
            }))?,
        }
        return Ok(());
    }

    let mut options = MaintainOptions::new(
        &config.paths.index_path,
        &config.paths.recycle_root,
        &policy,
    )
    .dry_run(args.dry_run)
    .at(now);
    options.size_concurrency = config.stats.size_concurrency;
    options.fsync_on_append = config.index.fsync_on_append;
    options.config_hash = Some(config.stable_hash()?);

    let mut report_progress = |index: usize, total: usize| {
        if mode == OutputMode::Human {
            eprintln!("[RK-MAINTAIN] evicting batch {index}/{total}");
        }
    };
    let outcome = maintain_recycle_bin(&options, Some(&mut report_progress))?;

    if !args.dry_run {
        state.record(&outcome);
        write_state(&config.paths.state_file, &state)?;
    }

    match mode {
        OutputMode::Human => print_maintain_human(&outcome),
        OutputMode::Json => {
            let mut payload = serde_json::to_value(&outcome)?;
            if let Value::Object(map) = &mut payload {
                map.insert("command".to_string(), json!("maintain"));
            }
            write_json_line(&payload)?;
        }
    }

    if outcome.status == MaintenanceStatus::PartialFailed {
        return Err(CliError::Partial(format!(
            "{} of {} batches could not be removed",
            outcome.fail_batches,
            outcome.candidates.len()
        )));
    }
    Ok(())
}

fn print_maintain_human(outcome: &MaintenanceOutcome) {
    println!("Maintenance: {}", status_label(outcome.status.as_str()));
    println!(
        "  Policy: max age {}d, keep {} newest, threshold {}",
        outcome.policy.max_age_days,
        outcome.policy.min_keep_batches,
        format_bytes(outcome.threshold_bytes)
    );
    println!(
        "  Candidates: {} (age {}, size {})",
        outcome.candidates.len(),
        outcome.selected_by_age,
        outcome.selected_by_size
    );
    let verb = if outcome.dry_run {
        "Would delete"
    } else {
        "Deleted"
    };
    println!(
        "  {verb}: {} batches, {}",
        outcome.deleted_batches,
        format_bytes(outcome.deleted_bytes)
    );
    println!(
        "  Usage: {} -> {} (estimated {})",
        format_bytes(outcome.before.total_bytes),
        format_bytes(outcome.after.total_bytes),
        format_bytes(outcome.estimated_after_bytes)
    );
    for failure in &outcome.errors {
        println!(
            "  {} {} [{}] {}",
            "failed".red(),
            failure.batch_id,
            failure.error_type,
            failure.message
        );
    }
}

fn run_restore(cli: &Cli, config: &Config, args: &RestoreArgs) -> Result<(), CliError> {
    let outcome = restore_batch(&RestoreOptions {
        index_path: &config.paths.index_path,
        recycle_root: &config.paths.recycle_root,
        batch_id: &args.batch_id,
        conflict: args.conflict.unwrap_or(config.restore.conflict),
        dry_run: args.dry_run,
        fsync_on_append: config.index.fsync_on_append,
    })?;

    match output_mode(cli) {
        OutputMode::Human => print_restore_human(&outcome),
        OutputMode::Json => {
            let mut payload = serde_json::to_value(&outcome)?;
            if let Value::Object(map) = &mut payload {
                map.insert("command".to_string(), json!("restore"));
            }
            write_json_line(&payload)?;
        }
    }

    match outcome.status {
        RestoreStatus::NotFound => Err(CliError::User(format!(
            "no live batch with id {}",
            args.batch_id
        ))),
        RestoreStatus::Rejected => Err(CliError::Runtime(format!(
            "batch {} failed path validation: {}",
            args.batch_id,
            outcome.rejection.as_deref().unwrap_or("unknown")
        ))),
        RestoreStatus::PartialFailed => Err(CliError::Partial(format!(
            "{} of {} entries could not be restored",
            outcome.failed,
            outcome.entries.len()
        ))),
        RestoreStatus::Success | RestoreStatus::Skipped | RestoreStatus::DryRun => Ok(()),
    }
}

fn print_restore_human(outcome: &RestoreOutcome) {
    let status = serde_json::to_value(outcome.status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    println!("Restore {}: {}", outcome.batch_id, status_label(&status));
    for entry in &outcome.entries {
        let target = entry
            .restored_path
            .as_ref()
            .unwrap_or(&entry.source_path)
            .display();
        match &entry.error {
            Some(error) => println!("  {} {target}: {error}", status_label(&entry.status)),
            None => println!("  {} {target}", status_label(&entry.status)),
        }
    }
}

fn run_quarantine(cli: &Cli, config: &Config, args: &QuarantineArgs) -> Result<(), CliError> {
    let outcome = quarantine_paths(&QuarantineOptions {
        index_path: &config.paths.index_path,
        recycle_root: &config.paths.recycle_root,
        scope: &args.scope,
        sources: &args.paths,
        fsync_on_append: config.index.fsync_on_append,
        now: None,
    })?;

    match output_mode(cli) {
        OutputMode::Human => print_quarantine_human(&outcome),
        OutputMode::Json => {
            let mut payload = serde_json::to_value(&outcome)?;
            if let Value::Object(map) = &mut payload {
                map.insert("command".to_string(), json!("quarantine"));
            }
            write_json_line(&payload)?;
        }
    }

    if outcome.failures.is_empty() {
        Ok(())
    } else if outcome.moved == 0 {
        Err(CliError::Runtime("nothing was quarantined".to_string()))
    } else {
        Err(CliError::Partial(format!(
            "{} of {} paths could not be quarantined",
            outcome.failures.len(),
            args.paths.len()
        )))
    }
}

fn print_quarantine_human(outcome: &QuarantineOutcome) {
    if outcome.moved > 0 {
        println!(
            "Quarantined {} paths ({}) into batch {}",
            outcome.moved,
            format_bytes(outcome.moved_bytes),
            outcome.batch_id.bold()
        );
    }
    for failure in &outcome.failures {
        println!(
            "  {} {} [{}] {}",
            "failed".red(),
            failure.source_path.display(),
            failure.error_type,
            failure.message
        );
    }
}

fn status_label(status: &str) -> ColoredString {
    match status {
        "success" => status.green(),
        "partial_failed" | "failed" => status.red(),
        "dry_run" => status.cyan(),
        _ => status.yellow(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    const TIB: u64 = 1024 * GIB;

    if bytes >= TIB {
        format!("{:.1} TB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn format_time(epoch_ms: i64) -> String {
    if epoch_ms <= 0 {
        return "never".to_string();
    }
    chrono::DateTime::from_timestamp_millis(epoch_ms).map_or_else(
        || epoch_ms.to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("RK_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
