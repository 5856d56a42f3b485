use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::*;
use procward_core::{ExclusionPolicy, Phase, ProcessScanner, VERSION};
use procward_daemon::config::PathsConfig;
use procward_daemon::{EngineStatus, TargetRecord};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "procward")]
#[command(author = "procward Team")]
#[command(version = VERSION)]
#[command(about = "Process supervisor - inspection CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the daemon's last status export
    Status {
        /// Status file written by the daemon
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Refresh every 2 seconds until Ctrl+C
        #[arg(short, long)]
        watch: bool,
    },

    /// List running processes
    Processes {
        /// Only show processes whose name contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Exclusion file used to mark protected processes
        #[arg(short, long)]
        exclusions: Option<PathBuf>,
    },

    /// Check whether a name or path is protected from termination
    Excluded {
        /// Process name or executable path
        name: String,

        /// Exclusion file with additional protected names
        #[arg(short, long)]
        exclusions: Option<PathBuf>,
    },

    /// Generate shell completion script
    Completions {
        shell: Shell,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let defaults = PathsConfig::default();

    match cli.command {
        Some(Commands::Status { file, watch }) => {
            let path = file.unwrap_or(defaults.status);
            if watch {
                watch_status(&path);
            } else {
                println!("{}", "=== procward Status ===".green().bold());
                show_status(&path)?;
            }
        }
        Some(Commands::Processes { filter, exclusions }) => {
            let path = exclusions.unwrap_or(defaults.exclusions);
            show_processes(filter.as_deref(), &path)?;
        }
        Some(Commands::Excluded { name, exclusions }) => {
            let path = exclusions.unwrap_or(defaults.exclusions);
            check_excluded(&name, &path);
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "procward", &mut std::io::stdout());
        }
        Some(Commands::Version) => {
            println!("procward v{}", VERSION);
            println!("Keeps wanted processes up and unwanted ones down");
        }
        None => {
            // Default: show status
            println!("{}", "=== procward Status ===".green().bold());
            show_status(&defaults.status)?;
        }
    }

    Ok(())
}

fn show_status(path: &Path) -> Result<()> {
    let status = EngineStatus::read_from(path).map_err(|e| {
        anyhow::anyhow!(
            "Cannot read status file {:?} (is procward-daemon running?): {}",
            path,
            e
        )
    })?;

    let age = EngineStatus::current_timestamp().saturating_sub(status.timestamp);
    println!(
        "\nDaemon PID {}, up {}, last update {} ago",
        status.daemon_pid,
        humantime::format_duration(Duration::from_secs(status.runtime_secs)),
        humantime::format_duration(Duration::from_secs(age))
    );
    println!(
        "Processes: {}, protected names: {}",
        status.process_count, status.protected_names
    );

    let stats = &status.stats;
    println!(
        "Ticks: {}, detections: {}, launches: {}, terminations: {}, failures: {}, exhausted: {}",
        stats.total_ticks,
        stats.total_detections,
        stats.total_launches,
        stats.total_terminations,
        stats.total_failures,
        stats.total_exhausted
    );

    if status.targets.is_empty() {
        println!("\n{}", "No tracked targets".yellow());
    } else {
        println!("\n{} {}", "Targets:".cyan(), status.targets.len());
        for target in &status.targets {
            print_target(target);
        }
    }

    let exhausted = status.exhausted().count();
    if exhausted > 0 {
        println!(
            "\n{}",
            format!(
                "{} target(s) gave up retrying; edit or re-save the entries to reset",
                exhausted
            )
            .red()
        );
    }

    println!();
    Ok(())
}

fn print_target(target: &TargetRecord) {
    let phase = match target.phase {
        Phase::Idle => target.phase.to_string().green(),
        Phase::AwaitingAction | Phase::ActionPending => target.phase.to_string().yellow(),
        Phase::CoolingDown => target.phase.to_string().magenta(),
        Phase::RetryExhausted => target.phase.to_string().red().bold(),
    };

    let slot = match target.auxiliary {
        Some(index) => format!(" (companion #{})", index + 1),
        None => String::new(),
    };

    let mut line = format!(
        "  {:<8} {:<24} {}{}",
        target.kind.to_string(),
        target.target,
        phase,
        slot
    );
    if target.consecutive_failures > 0 {
        line.push_str(&format!(", failures: {}", target.consecutive_failures));
    }
    if let Some(secs) = target.next_eligible_in_secs {
        line.push_str(&format!(
            ", next try in {}",
            humantime::format_duration(Duration::from_millis((secs * 1000.0) as u64))
        ));
    }
    if let Some(pid) = target.last_known_pid {
        line.push_str(&format!(", pid {}", pid));
    }
    println!("{}", line);
}

fn watch_status(path: &Path) {
    loop {
        // Clear screen
        print!("\x1B[2J\x1B[1;1H");

        println!("{}", "=== procward Watch Mode ===".green().bold());
        println!("Press Ctrl+C to exit...");
        if let Err(e) = show_status(path) {
            println!("\n{}", e.to_string().red());
        }

        std::thread::sleep(Duration::from_secs(2));
    }
}

fn show_processes(filter: Option<&str>, exclusions: &Path) -> Result<()> {
    let mut scanner = ProcessScanner::new();
    let processes = scanner.scan_filtered(filter.unwrap_or(""))?;
    let policy = ExclusionPolicy::from_file(exclusions);

    if processes.is_empty() {
        println!("{}", "No matching processes".yellow());
        return Ok(());
    }

    println!("{} {}", "Processes:".cyan(), processes.len());
    for process in &processes {
        let marker = if policy.is_excluded(&process.name) {
            "protected".blue()
        } else {
            "".normal()
        };
        let path = process
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!(
            "  {:>7}  {:<32} {:<10} {}",
            process.pid,
            process.name,
            marker,
            path.dimmed()
        );
    }

    Ok(())
}

fn check_excluded(name: &str, exclusions: &Path) {
    let policy = ExclusionPolicy::from_file(exclusions);
    if policy.is_excluded(name) {
        println!(
            "{}",
            format!("'{}' is protected and will never be terminated", name).green()
        );
    } else {
        println!("{}", format!("'{}' is not protected", name).yellow());
    }
}
