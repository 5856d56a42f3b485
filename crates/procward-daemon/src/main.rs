use anyhow::Result;
use clap::{Parser, Subcommand};
use procward_core::{
    Engine, ExclusionPolicy, ExclusionSet, FanoutSink, JsonlHistory, ProcessExecutor,
    ProcessScanner, TracingSink, VERSION,
};
use procward_daemon::config::LogConfig;
use procward_daemon::{Config, EnforcementLoop, Reloader, TickWorker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// procward - process supervisor daemon
///
/// Keeps launcher targets running and terminates killer targets
#[derive(Parser, Debug)]
#[command(name = "procward-daemon")]
#[command(version = VERSION)]
#[command(about = "procward Daemon - keeps wanted processes up and unwanted ones down", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PROCWARD_CONFIG", default_value = "procward.toml")]
    config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Continuous enforcement with hot reload (default)
    Watch,

    /// Run a single tick and exit
    Once,

    /// Check configuration, entries and exclusions, then exit
    Validate,

    /// Generate default configuration file
    GenerateConfig {
        /// Output path for config file
        #[arg(short, long, default_value = "procward.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::GenerateConfig { output }) = &cli.command {
        return generate_config(output);
    }

    let config = Config::load_layered(&cli.config)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration {:?}: {}", cli.config, e))?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _guard = init_logging(&config.logging)?;

    info!("procward Daemon v{} starting...", VERSION);
    if !cli.config.exists() {
        warn!(
            "Configuration file not found: {:?}, using defaults",
            cli.config
        );
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    info!("Configuration loaded and validated successfully");

    match cli.command {
        Some(Commands::Watch) | None => run_watch_loop(config, &cli.config).await?,
        Some(Commands::Once) => run_once(config, &cli.config).await?,
        Some(Commands::Validate) => validate(&config)?,
        Some(Commands::GenerateConfig { .. }) => {}
    }

    Ok(())
}

/// Run continuous enforcement until Ctrl+C
async fn run_watch_loop(config: Config, config_path: &Path) -> Result<()> {
    info!(
        "Polling every {}s, relaunch delay {}s, kill delay {}s",
        config.engine.polling_interval_secs,
        config.engine.relaunch_delay_secs,
        config.engine.kill_delay_secs
    );

    ensure_directories(&config)?;
    let (runner, reloader) = build_loop(&config, config_path);

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(reloader.run(cancel.clone()));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let result = runner.run(cancel.clone()).await;
    cancel.cancel();
    if let Err(e) = watcher.await {
        warn!("Reload watcher ended abnormally: {}", e);
    }

    let stats = result?;
    info!(
        "procward Daemon stopped: {} ticks, {} launches, {} terminations, {} failures",
        stats.total_ticks, stats.total_launches, stats.total_terminations, stats.total_failures
    );
    Ok(())
}

/// Run a single enforcement tick and display the outcome
async fn run_once(config: Config, config_path: &Path) -> Result<()> {
    info!("Running single enforcement tick...");

    ensure_directories(&config)?;
    let (mut runner, _reloader) = build_loop(&config, config_path);

    match runner.tick().await? {
        Some(summary) => {
            info!("=== Tick Result ===");
            info!("Processes scanned: {}", summary.process_count);
            info!("Protected names: {}", summary.protected_names);
            info!("Launches: {}", summary.report.launches);
            info!("Terminations: {}", summary.report.terminations);
            info!("Failures: {}", summary.report.failures);
            info!("Skipped (protected): {}", summary.report.skipped_protected);
            for target in &summary.targets {
                info!(
                    "  {} {} [{}] failures={}",
                    target.key.kind, target.target, target.phase, target.consecutive_failures
                );
            }
        }
        None => warn!("Process snapshot failed, nothing was done"),
    }

    Ok(())
}

/// Report what the daemon would run with
fn validate(config: &Config) -> Result<()> {
    let entries = procward_core::store::read_save_data(&config.paths.entries)
        .map_err(|e| anyhow::anyhow!("Entries file {:?}: {}", config.paths.entries, e))?;
    let exclusions = ExclusionPolicy::from_file(&config.paths.exclusions).snapshot();

    info!(
        "Entries: {} launchers ({} enabled), {} killers ({} enabled)",
        entries.launchers.len(),
        entries.enabled_launchers().count(),
        entries.killers.len(),
        entries.enabled_killers().count()
    );
    info!("Protected names: {}", exclusions.len());

    for killer in entries.enabled_killers() {
        let target = killer.primary.target_name();
        if exclusions.contains(&target) {
            warn!(
                "Killer entry {} targets protected process '{}' and will never act",
                killer.id, target
            );
        }
    }

    info!("Validation completed");
    Ok(())
}

/// Generate default configuration file
fn generate_config(output: &Path) -> Result<()> {
    let config = Config::default();
    config
        .save_to_file(output)
        .map_err(|e| anyhow::anyhow!("Failed to save configuration file: {}", e))?;

    println!("Configuration file generated: {:?}", output);
    Ok(())
}

/// Wire the engine, history sinks, scanner and reload watcher together
fn build_loop(config: &Config, config_path: &Path) -> (EnforcementLoop, Reloader) {
    let exclusions = Arc::new(ExclusionPolicy::new(ExclusionSet::baseline()));
    let (reloader, handles) =
        Reloader::new(Some(config_path), config.clone(), Arc::clone(&exclusions));

    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(Arc::new(JsonlHistory::new(&config.paths.history)));

    let executor = ProcessExecutor::new().with_grace(config.engine.terminate_grace());
    let engine = Engine::new(Box::new(executor), Arc::new(sink));
    let worker = TickWorker::new(engine, Box::new(ProcessScanner::new()));

    let runner = EnforcementLoop::new(worker, handles, exclusions)
        .with_status_path(config.paths.status.clone());

    (runner, reloader)
}

/// Ensure directories for data files exist
fn ensure_directories(config: &Config) -> Result<()> {
    for path in [&config.paths.history, &config.paths.status] {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow::anyhow!("Failed to create directory {:?}: {}", parent, e)
                })?;
            }
        }
    }
    Ok(())
}

/// Initialize logging with file and stdout output
fn init_logging(logging: &LogConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&logging.log_dir)?;

    // Daily-rotated file appender for daemon logs
    let file_appender = tracing_appender::rolling::daily(&logging.log_dir, &logging.file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| logging.level.as_str().into()),
        )
        .init();

    info!("Logging initialized");

    Ok(guard)
}
