//! vericp - verified file copy
//!
//! Copies files so that every destination either holds a verified copy of
//! its source or is left exactly as it was.

mod display;
mod json_output;
mod progress;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use display::{print_class, print_decision, print_result, print_summary};
use json_output::{print_json, CopyReportJson, PlanReportJson};
use progress::ProgressDisplay;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use vericp_config::{Config, ConfigLoader, VerificationConfig};
use vericp_device::{available_space, VolumeClassifier};
use vericp_engine::{
    CopyEngine, EngineSettings, FanoutStatusSink, JsonLinesStatusSink, ProgressSender,
    TracingStatusSink,
};
use vericp_types::{
    BufferSize, Cancellable, CancellationToken, CopyOperationResult, CopyOutcome, CopyRequest,
    LocationClassifier, ProgressReporter, StatusSink, VerifyPolicy, WindowSize,
};

/// Exit code when any file failed
const EXIT_FAILED: u8 = 1;
/// Exit code for usage and configuration errors
const EXIT_USAGE: u8 = 2;
/// Exit code when the run was interrupted
const EXIT_CANCELLED: u8 = 130;

/// vericp - verified file copy with atomic finalize and rollback
#[derive(Parser)]
#[command(
    name = "vericp",
    version = env!("CARGO_PKG_VERSION"),
    about = "Verified file copy with atomic finalize and rollback",
    long_about = "vericp copies files through a temp file next to the destination,\n\
                  verifies the copy against its source and only then renames it into\n\
                  place. A failed or cancelled copy leaves the destination untouched."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Append status records (decisions and summaries) to this file as JSON lines
    #[arg(long, global = true)]
    status_log: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy one file to a file, or many files into a directory
    Copy {
        /// Source files followed by the destination
        #[arg(required = true, num_args = 2..)]
        paths: Vec<PathBuf>,
        /// Verification policy: skip, all or below:<bytes>
        #[arg(long, value_parser = parse_verify)]
        verify: Option<VerifyPolicy>,
        /// Never use the windowed memory-mapped strategy
        #[arg(long)]
        no_direct_large: bool,
        /// Minimum size for the windowed memory-mapped strategy
        #[arg(long, value_parser = parse_size)]
        direct_large_threshold: Option<u64>,
        /// Window size for mapped copy and compare (multiple of 64K)
        #[arg(long, value_parser = parse_size)]
        window_size: Option<u64>,
        /// Chunk size for buffered copy (power of two)
        #[arg(long, value_parser = parse_size)]
        chunk_size: Option<u64>,
        /// Number of files copied concurrently
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Explain which strategy a copy would use, without copying
    Plan {
        /// Source file
        source: PathBuf,
        /// Destination file
        destination: PathBuf,
        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the storage class of a path
    Classify {
        /// Path to classify
        path: PathBuf,
    },
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    fn file_name(self) -> &'static str {
        match self {
            Self::Yaml => "vericp.yaml",
            Self::Toml => "vericp.toml",
            Self::Json => "vericp.json",
        }
    }
}

/// Overrides from `vericp copy` flags
struct CopyOverrides {
    verify: Option<VerifyPolicy>,
    no_direct_large: bool,
    direct_large_threshold: Option<u64>,
    window_size: Option<u64>,
    chunk_size: Option<u64>,
    jobs: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if let Err(e) = init_logging(&cli, &config) {
        eprintln!("{} {:#}", style("error:").red().bold(), e);
        return ExitCode::from(EXIT_USAGE);
    }

    info!("vericp v{} starting", env!("CARGO_PKG_VERSION"));

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<ExitCode> {
    match cli.command {
        Commands::Copy {
            paths,
            verify,
            no_direct_large,
            direct_large_threshold,
            window_size,
            chunk_size,
            jobs,
            json,
        } => {
            let overrides = CopyOverrides {
                verify,
                no_direct_large,
                direct_large_threshold,
                window_size,
                chunk_size,
                jobs,
            };
            let config = apply_overrides(config, &overrides)?;
            let status = status_sink(cli.status_log.as_deref(), &config)?;
            copy_command(&paths, &config, status, cli.quiet || json, json).await
        }
        Commands::Plan {
            source,
            destination,
            json,
        } => plan_command(source, destination, &config, json),
        Commands::Classify { path } => {
            classify_command(&path);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { default, format } => {
            let shown = if default { Config::default() } else { config };
            print!(
                "{}",
                ConfigLoader::render(&shown, Path::new(format.file_name()))?
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("cannot load configuration from {}", path.display()))?,
        None => ConfigLoader::load_default().context("cannot load configuration")?,
    };
    Ok(config)
}

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let result = if cli.json_logs || config.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("cannot initialise logging: {}", e))
}

fn apply_overrides(mut config: Config, overrides: &CopyOverrides) -> Result<Config> {
    if let Some(policy) = overrides.verify {
        config.verification = VerificationConfig::from_policy(policy, config.verification.algorithm);
    }
    if overrides.no_direct_large {
        config.thresholds.direct_large_enabled = false;
    }
    if let Some(threshold) = overrides.direct_large_threshold {
        config.thresholds.direct_large_threshold = threshold;
    }
    if let Some(size) = overrides.window_size {
        config.io.window_size = WindowSize::new(size).map_err(anyhow::Error::msg)?;
    }
    if let Some(size) = overrides.chunk_size {
        let size = usize::try_from(size).context("chunk size too large")?;
        config.io.chunk_size = BufferSize::new(size).map_err(anyhow::Error::msg)?;
    }
    if let Some(jobs) = overrides.jobs {
        if jobs == 0 {
            bail!("--jobs must be at least 1");
        }
        config.batch.max_concurrent_files = jobs;
    }
    Ok(config)
}

fn status_sink(cli_path: Option<&Path>, config: &Config) -> Result<Arc<dyn StatusSink>> {
    let mut sink = FanoutStatusSink::new().with(Arc::new(TracingStatusSink));
    if let Some(path) = cli_path.or(config.logging.status_log.as_deref()) {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open status log {}", path.display()))?;
        sink = sink.with(Arc::new(JsonLinesStatusSink::new(file)));
    }
    Ok(Arc::new(sink))
}

/// Pair each source with its destination. The last path is a file for a
/// single source, or an existing directory.
fn copy_targets(paths: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>> {
    let Some((destination, sources)) = paths.split_last() else {
        bail!("need at least one source and a destination");
    };
    if sources.is_empty() {
        bail!("need at least one source and a destination");
    }

    if sources.len() == 1 && !destination.is_dir() {
        return Ok(vec![(sources[0].clone(), destination.clone())]);
    }
    if !destination.is_dir() {
        bail!(
            "{} must be an existing directory when copying several files",
            destination.display()
        );
    }

    sources
        .iter()
        .map(|source| {
            let name = source
                .file_name()
                .with_context(|| format!("{} has no file name", source.display()))?;
            Ok((source.clone(), destination.join(name)))
        })
        .collect()
}

async fn copy_command(
    paths: &[PathBuf],
    config: &Config,
    status: Arc<dyn StatusSink>,
    quiet: bool,
    json: bool,
) -> Result<ExitCode> {
    let targets = copy_targets(paths)?;
    let settings = EngineSettings::from_config(config)?;
    let engine = CopyEngine::builder()
        .with_settings(settings.clone())
        .with_status_sink(status)
        .build();

    let requests: Vec<CopyRequest> = targets
        .into_iter()
        .map(|(source, destination)| CopyRequest::new(source, destination))
        .collect();
    let total_bytes = requests
        .iter()
        .filter_map(|r| std::fs::metadata(&r.source).ok())
        .map(|m| m.len())
        .sum();
    debug!("{} files, {} bytes", requests.len(), total_bytes);

    let sender = ProgressSender::new(settings.progress_capacity);
    let mut display = ProgressDisplay::new(total_bytes, requests.len(), quiet);
    let bar = display.bar();
    let monitor = sender
        .monitor(settings.progress_poll_interval)
        .run(move |update| display.update(update));
    let monitor = tokio::spawn(monitor);

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; cancelling and restoring destinations");
                cancel.cancel();
            }
        })
    };

    let started = Instant::now();
    let progress: Arc<dyn ProgressReporter> = Arc::new(sender);
    let results = engine.execute_batch(requests, progress, cancel).await;
    let elapsed = started.elapsed();

    interrupt.abort();
    if let Err(e) = monitor.await {
        debug!("Progress monitor ended abnormally: {}", e);
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if json {
        print_json(&CopyReportJson::new(&results))?;
    } else {
        for result in &results {
            print_result(result);
        }
        if !quiet && results.len() > 1 {
            print_summary(&results, elapsed);
        }
    }

    Ok(ExitCode::from(exit_status(&results)))
}

fn exit_status(results: &[CopyOperationResult]) -> u8 {
    if results.iter().any(|r| r.outcome == CopyOutcome::Cancelled) {
        EXIT_CANCELLED
    } else if results.iter().any(|r| r.outcome == CopyOutcome::Error) {
        EXIT_FAILED
    } else {
        0
    }
}

fn plan_command(
    source: PathBuf,
    destination: PathBuf,
    config: &Config,
    json: bool,
) -> Result<ExitCode> {
    let engine = CopyEngine::from_config(config)?;
    match engine.plan(&CopyRequest::new(source, destination)) {
        Ok(decision) if json => {
            print_json(&PlanReportJson::new(&decision))?;
            Ok(ExitCode::SUCCESS)
        }
        Ok(decision) => {
            print_decision(&decision);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprintln!("{} {}", style("✗").red().bold(), failure);
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}

fn classify_command(path: &Path) {
    let class = VolumeClassifier::new().classify(path);
    let free = match available_space(path) {
        Ok(free) => Some(free),
        Err(e) => {
            debug!("Free space unavailable for {}: {}", path.display(), e);
            None
        }
    };
    print_class(path, class, free);
}

/// Parse `skip`, `all` or `below:<size>`
fn parse_verify(value: &str) -> std::result::Result<VerifyPolicy, String> {
    match value {
        "skip" | "none" => Ok(VerifyPolicy::SkipAll),
        "all" => Ok(VerifyPolicy::VerifyAll),
        other => match other.strip_prefix("below:") {
            Some(size) => parse_size(size).map(VerifyPolicy::VerifyBelowThreshold),
            None => Err(format!(
                "unknown verification policy '{}' (expected skip, all or below:<size>)",
                other
            )),
        },
    }
}

/// Parse a byte size with an optional K/M/G/T suffix (binary units)
fn parse_size(value: &str) -> std::result::Result<u64, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, suffix) = value.split_at(split);
    let number: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{}'", value))?;
    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        _ => return Err(format!("unknown size suffix in '{}'", value)),
    };
    number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' is too large", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("4096", 4096)]
    #[case("64K", 64 * 1024)]
    #[case("64KiB", 64 * 1024)]
    #[case("1g", 1 << 30)]
    #[case(" 2M ", 2 << 20)]
    fn test_parse_size(#[case] input: &str, #[case] expected: u64) {
        assert_eq!(parse_size(input), Ok(expected));
    }

    #[rstest]
    #[case("")]
    #[case("12Q")]
    #[case("K")]
    #[case("99999999999999999999T")]
    fn test_parse_size_rejects(#[case] input: &str) {
        assert!(parse_size(input).is_err());
    }

    #[rstest]
    #[case("skip", VerifyPolicy::SkipAll)]
    #[case("all", VerifyPolicy::VerifyAll)]
    #[case("below:1M", VerifyPolicy::VerifyBelowThreshold(1 << 20))]
    fn test_parse_verify(#[case] input: &str, #[case] expected: VerifyPolicy) {
        assert_eq!(parse_verify(input), Ok(expected));
    }

    #[test]
    fn test_cli_parses_copy() {
        let cli = Cli::try_parse_from([
            "vericp", "copy", "a.bin", "b.bin", "--verify", "below:1G", "--jobs", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Copy {
                paths, verify, jobs, ..
            } => {
                assert_eq!(paths.len(), 2);
                assert_eq!(verify, Some(VerifyPolicy::VerifyBelowThreshold(1 << 30)));
                assert_eq!(jobs, Some(2));
            }
            _ => panic!("expected copy"),
        }
        assert!(Cli::try_parse_from(["vericp", "copy", "only-one"]).is_err());
    }

    #[test]
    fn test_overrides_are_validated() {
        let overrides = CopyOverrides {
            verify: Some(VerifyPolicy::SkipAll),
            no_direct_large: true,
            direct_large_threshold: Some(1 << 20),
            window_size: Some(128 * 1024),
            chunk_size: Some(8192),
            jobs: Some(3),
        };
        let config = apply_overrides(Config::default(), &overrides).unwrap();
        assert!(!config.thresholds.direct_large_enabled);
        assert_eq!(config.io.window_size.get(), 128 * 1024);
        assert_eq!(config.batch.max_concurrent_files, 3);
        assert_eq!(
            config.verification.verify_policy().unwrap(),
            VerifyPolicy::SkipAll
        );

        let bad_window = CopyOverrides {
            window_size: Some(1000),
            ..overrides
        };
        assert!(apply_overrides(Config::default(), &bad_window).is_err());
    }

    #[test]
    fn test_copy_targets() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        let a = dir.join("a.txt");
        let b = dir.join("b.txt");

        let single = copy_targets(&[a.clone(), dir.join("c.txt")]).unwrap();
        assert_eq!(single, vec![(a.clone(), dir.join("c.txt"))]);

        let out = dir.join("out");
        std::fs::create_dir(&out).unwrap();
        let many = copy_targets(&[a.clone(), b.clone(), out.clone()]).unwrap();
        assert_eq!(many, vec![(a.clone(), out.join("a.txt")), (b, out.join("b.txt"))]);

        assert!(copy_targets(&[a.clone(), a, dir.join("missing")]).is_err());
    }

    #[test]
    fn test_exit_status() {
        let result = |outcome| CopyOperationResult {
            operation_id: vericp_types::OperationId::nil(),
            source: PathBuf::from("a"),
            destination: PathBuf::from("b"),
            outcome,
            strategy: None,
            verification_mode: vericp_types::VerificationMode::None,
            verification_passed: None,
            bytes_total: 0,
            bytes_transferred: 0,
            elapsed: std::time::Duration::ZERO,
            failure: None,
        };

        assert_eq!(exit_status(&[]), 0);
        assert_eq!(exit_status(&[result(CopyOutcome::Ok)]), 0);
        assert_eq!(
            exit_status(&[result(CopyOutcome::Ok), result(CopyOutcome::Error)]),
            EXIT_FAILED
        );
        assert_eq!(
            exit_status(&[result(CopyOutcome::Error), result(CopyOutcome::Cancelled)]),
            EXIT_CANCELLED
        );
    }
}
