//! tally - resumable inventory of large paginated storage trees.
//!
//! Usage:
//!   tally run --source local:DIR       Enumerate a tree, resuming if possible
//!   tally run --source replay:FILE     Enumerate a recorded listing session
//!   tally verify --source SOURCE       Reconcile the inventory with the source
//!   tally summary                      Show totals of an existing inventory
//!   tally --help                       Show help

mod settings;

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::thread;

use clap::{Parser, Subcommand};
use color_eyre::Section;
use color_eyre::eyre::{Context, Result, bail};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use tallyfile_core::{EnumerateConfig, RunStatus, Summary, VerifyConfig};
use tallyfile_remote::{LocalTreeRemote, RemoteListing, ReplayRemote};
use tallyfile_scan::{EnumerateError, EnumerateProgress, Enumerator, RunOutcome, RunReport};
use tallyfile_store::{CheckpointManager, CheckpointOrigin, INVENTORY_CSV, INVENTORY_JSON};
use tallyfile_verify::{CheckStatus, DepthBreakdown, VerificationReport, Verifier, root_folder_totals};

use crate::settings::Settings;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Resumable, crash-safe inventory of large storage trees",
    long_about = "tally lists every file and folder of a paginated storage tree into \
                  inventory.json and inventory.csv.\n\n\
                  Progress is checkpointed while listing, so an interrupted run picks \
                  up where it stopped. Use `tally verify` afterwards to reconcile the \
                  inventory with the live source."
)]
struct Cli {
    /// Settings file (defaults to <config dir>/tallyfile/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enumerate the whole tree, resuming from a checkpoint if one exists
    Run {
        /// Listing source: local:DIR or replay:FILE
        #[arg(short, long)]
        source: Source,

        /// Output directory for the checkpoint and inventory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory of an older release whose checkpoint should be migrated
        #[arg(long)]
        legacy_dir: Option<PathBuf>,

        /// Discard any checkpoint and start from the root
        #[arg(long)]
        fresh: bool,

        /// Resume without asking
        #[arg(short, long)]
        yes: bool,

        /// Records requested per listing page (1-2000)
        #[arg(long)]
        page_limit: Option<u32>,

        /// Seconds between checkpoint saves
        #[arg(long)]
        save_interval: Option<u64>,
    },

    /// Reconcile an inventory with the live source
    Verify {
        /// Listing source: local:DIR or replay:FILE
        #[arg(short, long)]
        source: Source,

        /// Directory holding inventory.json
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Accepted relative usage difference (e.g. 0.05)
        #[arg(short, long)]
        tolerance: Option<f64>,

        /// Number of folders to spot check
        #[arg(long)]
        spot_checks: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Exit with an error when any check does not pass
        #[arg(long)]
        strict: bool,
    },

    /// Show totals of an existing inventory without contacting the source
    Summary {
        /// Directory holding inventory.json
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Where listings come from.
#[derive(Debug, Clone)]
enum Source {
    /// A local directory served through the paginated contract.
    Local(PathBuf),
    /// A recorded session.
    Replay(PathBuf),
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("local", path)) if !path.is_empty() => Ok(Self::Local(PathBuf::from(path))),
            Some(("replay", path)) if !path.is_empty() => Ok(Self::Replay(PathBuf::from(path))),
            _ => Err(format!("expected local:DIR or replay:FILE, got '{s}'")),
        }
    }
}

impl Source {
    fn open(&self) -> Result<Box<dyn RemoteListing>> {
        match self {
            Self::Local(dir) => {
                if !dir.is_dir() {
                    bail!("{} is not a directory", dir.display());
                }
                Ok(Box::new(LocalTreeRemote::new(dir)))
            }
            Self::Replay(file) => {
                let remote = ReplayRemote::from_file(file)
                    .wrap_err_with(|| format!("Failed to load replay script {}", file.display()))?;
                Ok(Box::new(remote))
            }
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            source,
            output,
            legacy_dir,
            fresh,
            yes,
            page_limit,
            save_interval,
        } => {
            let base = settings.run.clone();
            let config = EnumerateConfig::builder()
                .output_dir(output.unwrap_or(base.output_dir))
                .legacy_dir(legacy_dir.or(base.legacy_dir))
                .page_limit(page_limit.unwrap_or(base.page_limit))
                .save_interval_secs(save_interval.unwrap_or(base.save_interval_secs))
                .save_every_entries(base.save_every_entries)
                .retry(base.retry)
                .build()
                .wrap_err("Invalid run options")?;

            init_logging(cli.verbose, settings.log_file.then_some(&config.output_dir))?;
            run_enumerate(&source, config, fresh, yes)?;
        }
        Command::Verify {
            source,
            output,
            tolerance,
            spot_checks,
            json,
            strict,
        } => {
            let base = settings.verify.clone();
            let config = VerifyConfig::builder()
                .usage_tolerance(tolerance.unwrap_or(base.usage_tolerance))
                .spot_check_count(spot_checks.unwrap_or(base.spot_check_count))
                .spot_check_depth(base.spot_check_depth)
                .case_insensitive(base.case_insensitive)
                .retry(base.retry)
                .build()
                .wrap_err("Invalid verify options")?;
            let output_dir = output.unwrap_or(settings.run.output_dir);

            init_logging(cli.verbose, settings.log_file.then_some(&output_dir))?;
            run_verify(&source, &output_dir, config, json, strict)?;
        }
        Command::Summary { output, json } => {
            init_logging(cli.verbose, None)?;
            run_summary(&output.unwrap_or(settings.run.output_dir), json)?;
        }
    }

    Ok(())
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

/// Install the stderr logger and, when an output directory is given, a plain
/// text log at `<output_dir>/inventory.log`.
fn init_logging(verbose: bool, log_dir: Option<&PathBuf>) -> Result<()> {
    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .wrap_err_with(|| format!("Failed to create {}", dir.display()))?;
            let path = dir.join("inventory.log");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .wrap_err_with(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(env_filter(verbose)),
            )
        }
        None => None,
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(env_filter(verbose));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()?;
    Ok(())
}

/// Enumerate, resuming when a checkpoint exists.
fn run_enumerate(source: &Source, config: EnumerateConfig, fresh: bool, yes: bool) -> Result<()> {
    let manager = CheckpointManager::from_config(&config);

    if fresh {
        info!("Starting fresh, discarding any checkpoint");
        manager.reset()?;
    } else if manager.exists() && !yes && io::stdin().is_terminal() && !confirm_resume()? {
        info!("Not resuming, discarding checkpoint");
        manager.reset()?;
    }

    let remote = source.open()?;
    let mut enumerator = Enumerator::new(remote, config.clone());

    let cancel = enumerator.cancel_flag();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, saving after the current page");
        cancel.cancel();
    })
    .wrap_err("Failed to install Ctrl+C handler")?;

    let mut progress = enumerator.subscribe();
    let reporter = thread::spawn(move || {
        let mut resumed = None;
        loop {
            match progress.blocking_recv() {
                Ok(update) => {
                    let resumed =
                        *resumed.get_or_insert(update.entries_total - update.new_entries);
                    log_progress(&update, resumed);
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = enumerator.run();
    drop(enumerator);
    let _ = reporter.join();

    match result {
        Ok(RunOutcome::Completed(report)) => {
            print_run_report(&report, &config.output_dir);
            Ok(())
        }
        Ok(RunOutcome::Interrupted(report)) => {
            print_run_report(&report, &config.output_dir);
            eprintln!("Interrupted. Run the same command again to resume.");
            Ok(())
        }
        Err(EnumerateError::Checkpoint(err)) if err.is_corruption() => {
            error!(error = %err, "Saved state is unusable");
            Err(err)
                .wrap_err("Cannot resume from the saved checkpoint")
                .suggestion("Pass --fresh to discard it and start from the root")
        }
        Err(EnumerateError::Remote {
            source,
            checkpoint_saved,
        }) => {
            error!(error = %source, "Enumeration failed");
            let result: Result<()> = Err(source).wrap_err("Enumeration failed");
            if checkpoint_saved {
                result.note("Progress was saved; rerun to resume")
            } else {
                result
            }
        }
        Err(err) => Err(err).wrap_err("Enumeration failed"),
    }
}

fn confirm_resume() -> Result<bool> {
    eprint!("A checkpoint exists. Resume? (y/n) ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(!answer.trim().eq_ignore_ascii_case("n"))
}

fn log_progress(update: &EnumerateProgress, resumed_entries: u64) {
    info!(
        pages = update.pages,
        entries = update.entries_total,
        new = update.new_entries,
        files = update.files,
        folders = update.folders,
        size = %format_size(update.bytes),
        api_calls = update.api_calls,
        rate = %format!("{:.0}/s", update.entries_per_second(resumed_entries)),
        "Page processed"
    );
}

fn print_run_report(report: &RunReport, output_dir: &Path) {
    let summary = &report.summary;

    println!();
    println!("{}", "─".repeat(60));
    println!(" Inventory {}", summary.status);
    println!("{}", "─".repeat(60));
    if let Some(origin) = &report.resumed_from {
        match origin {
            CheckpointOrigin::Current => println!(" Resumed from checkpoint"),
            CheckpointOrigin::MigratedLegacy { from } => {
                println!(" Resumed from legacy checkpoint {}", from.display())
            }
        }
    }
    print_summary_lines(summary);
    println!(
        " {} pages in {:.1}s",
        report.pages,
        report.elapsed.as_secs_f64()
    );
    if report.duplicates > 0 || report.collisions > 0 {
        println!(
            " {} duplicates dropped, {} path collisions",
            report.duplicates, report.collisions
        );
    }
    if !report.warnings.is_empty() {
        println!(" {} record(s) skipped", report.warnings.len());
    }
    println!();
    println!(" {}", output_dir.join(INVENTORY_JSON).display());
    println!(" {}", output_dir.join(INVENTORY_CSV).display());
    println!();
}

fn print_summary_lines(summary: &Summary) {
    println!(
        " {} entries: {} files, {} folders",
        summary.total_entries, summary.total_files, summary.total_folders
    );
    println!(" Total size: {}", format_size(summary.total_size_bytes));
    println!(" API calls: {}", summary.api_calls_made);
}

/// Reconcile the saved inventory with the source.
fn run_verify(
    source: &Source,
    output_dir: &Path,
    config: VerifyConfig,
    json: bool,
    strict: bool,
) -> Result<()> {
    let manager = CheckpointManager::new(output_dir);
    let artifact = manager
        .read_inventory()
        .wrap_err("No readable inventory to verify")
        .suggestion("Run `tally run` first")?;
    if artifact.summary.status != RunStatus::Complete {
        warn!("Inventory is still in progress; differences are expected");
    }

    let remote = source.open()?;
    let report = Verifier::new(remote, config).verify(&artifact.entries);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_verification(&report);
    }

    if strict && !report.passed() {
        bail!("Verification did not pass");
    }
    Ok(())
}

fn status_label(status: &CheckStatus) -> &'static str {
    match status {
        CheckStatus::Passed => "ok",
        CheckStatus::Failed => "FAILED",
        CheckStatus::Error(_) => "ERROR",
    }
}

fn print_verification(report: &VerificationReport) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" Verification Report");
    println!("{}", "─".repeat(70));
    println!();

    let root = &report.root_set;
    println!(
        " Root folders     [{}] {} live, {} in inventory",
        status_label(&root.status),
        root.live_folders,
        root.inventory_folders
    );
    for path in &root.possibly_deleted {
        println!("   possibly deleted: {path}");
    }

    let usage = &report.usage;
    match (usage.used_bytes, usage.relative_difference) {
        (Some(used), Some(relative)) => println!(
            " Usage            [{}] {} used, {} inventoried ({:.2}%)",
            status_label(&usage.status),
            format_size(used),
            format_size(usage.inventory_bytes),
            relative * 100.0
        ),
        _ => println!(
            " Usage            [{}] {} inventoried",
            status_label(&usage.status),
            format_size(usage.inventory_bytes)
        ),
    }

    for check in &report.spot_checks {
        println!(
            " Spot check       [{}] {} ({} in inventory)",
            status_label(&check.status),
            check.path,
            check.inventory_count
        );
    }
    println!();

    let issues = report.issues();
    if issues.is_empty() {
        println!(" All checks passed ({} API calls)", report.api_calls);
    } else {
        println!(" {} issue(s):", issues.len());
        for issue in issues {
            println!("   {issue}");
        }
    }
    println!();
}

/// Print totals of an existing inventory.
fn run_summary(output_dir: &Path, json: bool) -> Result<()> {
    let artifact = CheckpointManager::new(output_dir)
        .read_inventory()
        .wrap_err("No readable inventory")?;
    let depth = DepthBreakdown::from_entries(&artifact.entries);
    let roots = root_folder_totals(&artifact.entries);

    if json {
        let value = serde_json::json!({
            "summary": artifact.summary,
            "depth_breakdown": depth,
            "root_folders": roots,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {}", output_dir.display(), artifact.summary.status);
    println!("{}", "─".repeat(60));
    print_summary_lines(&artifact.summary);
    println!();

    println!(" By depth:");
    for level in &depth.levels {
        println!(
            "   {:>3}  {:>8} folders {:>10} files  {:>10}",
            level.depth,
            level.folders,
            level.files,
            format_size(level.bytes)
        );
    }
    println!();

    if !roots.is_empty() {
        println!(" Root folders:");
        for root in &roots {
            println!(
                "   {:<40} {:>10} files  {:>10}",
                truncate(&root.path, 40),
                root.file_count,
                format_size(root.size_bytes)
            );
        }
        println!();
    }

    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert!(matches!(
            "local:/srv/share".parse::<Source>(),
            Ok(Source::Local(p)) if p == Path::new("/srv/share")
        ));
        assert!(matches!(
            "replay:session.json".parse::<Source>(),
            Ok(Source::Replay(p)) if p == Path::new("session.json")
        ));
        assert!("local:".parse::<Source>().is_err());
        assert!("s3://bucket".parse::<Source>().is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("/Photos/2024", 8), "/Photos…");
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "tally",
            "-v",
            "run",
            "--source",
            "local:/tmp",
            "--fresh",
            "--page-limit",
            "500",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Run {
                fresh, page_limit, ..
            } => {
                assert!(fresh);
                assert_eq!(page_limit, Some(500));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_source() {
        assert!(Cli::try_parse_from(["tally", "verify", "--source", "ftp:x"]).is_err());
    }
}
