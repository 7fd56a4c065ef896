//! romhold - ROM ingestion CLI
//!
//! `romhold upload` validates, dedups, detects platforms and uploads a set
//! of ROM files. `romhold detect` shows platform detection only.

use std::collections::HashSet;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use romhold_common::events::{
    CandidateId, EventBus, OutcomeClass, PendingSelection, PipelineEvent,
};
use romhold_ingest::clients::{HttpPlatformRegistry, PlatformRegistry, StaticPlatformRegistry};
use romhold_ingest::config::{self, CliOverrides, IngestConfig};
use romhold_ingest::models::{PlatformExtensionIndex, RomFile};
use romhold_ingest::services::{FileScanner, PlatformDetector};
use romhold_ingest::{decision_channel, PipelineRunResult, RunControls};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_BUFFER: usize = 16 * 1024;

/// Command-line arguments for romhold
#[derive(Parser, Debug)]
#[command(name = "romhold")]
#[command(about = "Upload ROM files to a romhold store")]
#[command(version)]
struct Cli {
    /// Config file (default: $ROMHOLD_CONFIG, then the per-user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store base URL (overrides $ROMHOLD_SERVER_URL and the config file)
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate, dedup and upload ROM files
    Upload(UploadArgs),
    /// Show which platform each file would be uploaded as
    Detect(DetectArgs),
    /// Save the store URL to the config file
    SetServer {
        /// Store base URL, e.g. http://localhost:8080
        url: String,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Read platforms from a JSON file instead of the store
    #[arg(long)]
    registry_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct UploadArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Platform for a file name, as NAME=PLATFORM_ID (repeatable)
    #[arg(long = "platform", value_name = "NAME=ID")]
    platforms: Vec<String>,

    /// Upload this file even if the store already has its content (repeatable)
    #[arg(long = "force-duplicate", value_name = "NAME")]
    force_duplicates: Vec<String>,

    /// Use the weak fingerprint instead of SHA-256
    #[arg(long)]
    weak_hash: bool,

    /// Never prompt; files without a platform are left out
    #[arg(long)]
    no_prompt: bool,
}

#[derive(Args, Debug)]
struct DetectArgs {
    #[command(flatten)]
    input: InputArgs,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let weak_hash = matches!(&cli.command, Command::Upload(args) if args.weak_hash);
    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        server_url: cli.server_url.clone(),
        weak_hash,
        log_level: cli.log_level.clone(),
    };

    let ingest_config = IngestConfig::resolve(&overrides);
    init_tracing(&ingest_config.log_level);

    info!(
        server_url = %ingest_config.server_url,
        config_file = ?ingest_config.config_path,
        strong_digest = ingest_config.strong_digest,
        "Configuration resolved"
    );

    match cli.command {
        Command::Upload(args) => upload(&ingest_config, args).await,
        Command::Detect(args) => detect(&ingest_config, args).await,
        Command::SetServer { url } => set_server(&overrides, &url),
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("romhold={level},romhold_ingest={level},romhold_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn upload(config: &IngestConfig, args: UploadArgs) -> Result<ExitCode> {
    let files = load_files(&args.input).await?;
    if files.is_empty() {
        println!("No files to upload.");
        return Ok(ExitCode::SUCCESS);
    }

    // Room for every per-file event of a large run while a prompt is open
    let event_bus = EventBus::new(EVENT_BUFFER);
    let orchestrator = romhold_ingest::build_orchestrator(
        config,
        args.input.registry_file.as_deref(),
        event_bus.clone(),
    )
    .context("Failed to set up the upload pipeline")?;

    let (controls, decisions) = decision_channel();
    let forced = queue_cli_decisions(&controls, &files, &args.platforms, &args.force_duplicates)?;

    let interactive = !args.no_prompt && std::io::stdin().is_terminal();
    let reporter = tokio::spawn(report_events(
        event_bus.subscribe(),
        interactive.then(|| controls.clone()),
        forced,
    ));
    drop(controls);

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling: batches not yet started will be skipped...");
            ctrl_c_token.cancel();
        }
    });

    let result = orchestrator.run(files, decisions, cancel_token).await;
    reporter.abort();

    print_result(&result);
    Ok(exit_code(&result))
}

/// Turn `--platform` and `--force-duplicate` into decisions for the run
///
/// Returns the candidates already forced through, so they are not prompted.
fn queue_cli_decisions(
    controls: &RunControls,
    files: &[RomFile],
    platforms: &[String],
    force_duplicates: &[String],
) -> Result<HashSet<CandidateId>> {
    let mut forced = HashSet::new();
    for pair in platforms {
        let (name, id) = pair
            .rsplit_once('=')
            .with_context(|| format!("--platform expects NAME=ID, got '{}'", pair))?;
        let platform_id: i64 = id
            .trim()
            .parse()
            .with_context(|| format!("Invalid platform id in '{}'", pair))?;

        let matched = matching_candidates(files, name.trim());
        if matched.is_empty() {
            bail!("--platform names '{}', which is not among the input files", name);
        }
        for candidate in matched {
            controls.assign_platform(candidate, platform_id);
        }
    }

    for name in force_duplicates {
        let matched = matching_candidates(files, name.trim());
        if matched.is_empty() {
            bail!("--force-duplicate names '{}', which is not among the input files", name);
        }
        for candidate in matched {
            controls.force_duplicate(candidate);
            forced.insert(candidate);
        }
    }

    Ok(forced)
}

fn matching_candidates(files: &[RomFile], name: &str) -> Vec<CandidateId> {
    files
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name == name)
        .map(|(i, _)| CandidateId(i))
        .collect()
}

/// Print pipeline events; answer selection prompts when interactive
async fn report_events(
    mut rx: tokio::sync::broadcast::Receiver<PipelineEvent>,
    controls: Option<RunControls>,
    mut confirmed: HashSet<CandidateId>,
) {
    let mut asked: HashSet<CandidateId> = HashSet::new();

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event reporter lagged");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };

        match event {
            PipelineEvent::DuplicateDetected { candidate, file_name, existing_record_ref, .. } => {
                match &existing_record_ref {
                    Some(record) => eprintln!("  duplicate: {} (already stored as #{})", file_name, record),
                    None => eprintln!("  duplicate: {}", file_name),
                }
                let Some(controls) = &controls else {
                    continue;
                };
                if !confirmed.insert(candidate) {
                    continue;
                }
                match prompt_upload_anyway(file_name).await {
                    Some(true) => controls.force_duplicate(candidate),
                    Some(false) => controls.discard(candidate),
                    // stdin closed: stop answering so the run can continue
                    None => return,
                };
            }
            PipelineEvent::AwaitingPlatformSelection { pending, .. } => {
                let Some(controls) = &controls else {
                    continue;
                };
                for selection in pending {
                    if !asked.insert(selection.candidate) {
                        continue;
                    }
                    let answer = match prompt_platform(selection.clone()).await {
                        Some(answer) => answer,
                        None => {
                            // stdin closed: stop answering so the run can continue
                            return;
                        }
                    };
                    match answer {
                        Some(platform_id) => controls.assign_platform(selection.candidate, platform_id),
                        None => controls.discard(selection.candidate),
                    };
                }
            }
            PipelineEvent::BatchSubmitted { platform_id, file_count, total_bytes, .. } => {
                eprintln!("  uploading {} file(s), {} bytes, platform {}", file_count, total_bytes, platform_id);
            }
            PipelineEvent::UploadProgress { percentage, .. } => {
                eprint!("\r  progress: {:5.1}%", percentage);
                let _ = std::io::stderr().flush();
                if percentage >= 100.0 {
                    eprintln!();
                }
            }
            PipelineEvent::BatchCompleted { platform_id, succeeded, failed, error, .. } => {
                match error {
                    Some(error) => eprintln!("\n  batch for platform {} failed: {}", platform_id, error),
                    None => eprintln!("\n  batch for platform {}: {} ok, {} failed", platform_id, succeeded, failed),
                }
            }
            _ => {}
        }
    }
}

/// Ask whether a held duplicate should be uploaded anyway
///
/// `None`: stdin closed.
async fn prompt_upload_anyway(file_name: String) -> Option<bool> {
    let outcome = tokio::task::spawn_blocking(move || -> Option<bool> {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "Upload {} anyway? [y/N] ", file_name);
        let _ = stderr.flush();

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")),
        }
    })
    .await;

    outcome.ok().flatten()
}

/// Ask for one file's platform on the terminal
///
/// Outer `None`: stdin closed. Inner `None`: user chose to skip the file.
async fn prompt_platform(selection: PendingSelection) -> Option<Option<i64>> {
    let outcome = tokio::task::spawn_blocking(move || -> Option<Option<i64>> {
        let stdin = std::io::stdin();
        let mut stderr = std::io::stderr();

        let _ = writeln!(stderr, "\nPlatform needed for {}:", selection.file_name);
        for (i, option) in selection.possible_platforms.iter().enumerate() {
            let _ = writeln!(stderr, "  [{}] {} (id {})", i + 1, option.name, option.id);
        }

        loop {
            let _ = write!(stderr, "Choose a number, or press Enter to skip: ");
            let _ = stderr.flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }

            let answer = line.trim();
            if answer.is_empty() {
                return Some(None);
            }
            if let Some(option) = answer
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| selection.possible_platforms.get(i))
            {
                return Some(Some(option.id));
            }
            let _ = writeln!(stderr, "Not a valid choice.");
        }
    })
    .await;

    outcome.ok().flatten()
}

async fn detect(config: &IngestConfig, args: DetectArgs) -> Result<ExitCode> {
    let files = load_files(&args.input).await?;

    let registry: Arc<dyn PlatformRegistry> = match &args.input.registry_file {
        Some(path) => Arc::new(
            StaticPlatformRegistry::from_file(path)
                .with_context(|| format!("Failed to load registry file {}", path.display()))?,
        ),
        None => Arc::new(HttpPlatformRegistry::new(config.server_url.clone(), config.request_timeout)?),
    };

    let platforms = registry
        .list_active()
        .await
        .context("Failed to fetch the platform registry")?;
    let detector = PlatformDetector::new(Arc::new(PlatformExtensionIndex::build(&platforms)));

    for file in &files {
        let detection = detector.detect(&file.name);
        let options: Vec<String> = detection
            .possible_platforms
            .iter()
            .map(|p| format!("{} ({})", p.name, p.id))
            .collect();

        let verdict = match detection.recommended_platform {
            Some(id) => format!("-> {}", id),
            None if detection.is_unknown() => "-> unknown".to_string(),
            None => "-> ambiguous".to_string(),
        };
        println!("{}\t.{}\t{}\t{}", file.name, detection.extension, options.join(", "), verdict);
    }

    Ok(ExitCode::SUCCESS)
}

fn set_server(overrides: &CliOverrides, url: &str) -> Result<ExitCode> {
    let path = overrides
        .config_path
        .clone()
        .or_else(|| romhold_common::config::resolve_config_path(None))
        .or_else(romhold_common::config::default_config_path)
        .context("Could not determine a config file location")?;

    config::save_server_url(url, &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Saved server URL to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

async fn load_files(input: &InputArgs) -> Result<Vec<RomFile>> {
    let scan = FileScanner::new(input.recursive)
        .scan(&input.paths)
        .context("Failed to read input paths")?;

    for error in &scan.errors {
        tracing::warn!(error = %error, "Skipped unreadable entry");
    }

    let mut files = Vec::with_capacity(scan.files.len());
    for path in &scan.files {
        files.push(open_file(path).await?);
    }
    Ok(files)
}

async fn open_file(path: &Path) -> Result<RomFile> {
    RomFile::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn print_result(result: &PipelineRunResult) {
    println!();
    for candidate in &result.per_file_results {
        match &candidate.error {
            Some(error) => println!("{:<24} {}  ({})", candidate.status.as_str(), candidate.name(), error),
            None => println!("{:<24} {}", candidate.status.as_str(), candidate.name()),
        }
    }

    println!();
    println!("{}", result.summary().message());
    if result.cancelled {
        println!("Run was cancelled.");
    }
}

fn exit_code(result: &PipelineRunResult) -> ExitCode {
    match result.outcome() {
        OutcomeClass::AllSucceeded | OutcomeClass::NothingUploaded => ExitCode::SUCCESS,
        OutcomeClass::Mixed => ExitCode::from(2),
        OutcomeClass::TotalFailure => ExitCode::FAILURE,
    }
}
