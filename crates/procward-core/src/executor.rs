use crate::matching::is_full_path;
use crate::types::EntryDescriptor;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;
use sysinfo::{Pid, Signal, System};
use tracing::{debug, warn};

/// OS-level actions requested by the engine
///
/// Both calls may be slow and may fail; the engine never treats a returned
/// `Ok` as proof of the final process state.
pub trait ActionExecutor: Send {
    /// Start the descriptor's executable, returning the spawned pid
    fn launch(&self, descriptor: &EntryDescriptor) -> Result<u32>;

    /// Stop a running process
    fn terminate(&self, pid: u32) -> Result<()>;
}

/// Process action executor
pub struct ProcessExecutor {
    grace: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self {
            grace: Duration::from_secs(2),
        }
    }

    /// How long a polite terminate request gets before the forced kill
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Kill a process (polite terminate, then forced kill if needed)
    ///
    /// A process that is already gone counts as terminated.
    ///
    /// Algorithm:
    /// 1. Check if process exists
    /// 2. Send a terminate signal where the platform has one
    /// 3. Wait for the grace period
    /// 4. If process still alive, kill it outright
    pub fn kill_process(&self, pid: u32) -> Result<()> {
        let mut system = System::new();
        let process_pid = Pid::from_u32(pid);

        if !system.refresh_process(process_pid) {
            debug!("Process {} already exited", pid);
            return Ok(());
        }

        let polite = system
            .process(process_pid)
            .and_then(|p| p.kill_with(Signal::Term))
            .unwrap_or(false);

        if polite {
            thread::sleep(self.grace);
            if !system.refresh_process(process_pid) {
                return Ok(());
            }
        }

        let killed = system
            .process(process_pid)
            .map(|p| p.kill())
            .unwrap_or(true);
        if !killed {
            return Err(Error::Terminate(format!(
                "Failed to kill process {}",
                pid
            )));
        }

        // Final check
        thread::sleep(Duration::from_millis(500));

        if system.refresh_process(process_pid) {
            return Err(Error::Terminate(format!(
                "Process {} still running after forced kill",
                pid
            )));
        }

        Ok(())
    }

    /// Check if process exists
    pub fn process_exists(pid: u32) -> bool {
        let mut system = System::new();
        system.refresh_process(Pid::from_u32(pid))
    }

    fn start(&self, descriptor: &EntryDescriptor) -> Result<u32> {
        let target = descriptor.launch_target();
        if target.is_empty() {
            return Err(Error::Launch(format!(
                "Entry '{}' has no executable",
                descriptor.label()
            )));
        }

        if descriptor.run_as_admin {
            return start_elevated(descriptor, target);
        }

        let mut command = Command::new(target);
        apply_arguments(&mut command, &descriptor.arguments)?;
        if let Some(dir) = working_dir(descriptor) {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = command
            .spawn()
            .map_err(|e| Error::Launch(format!("Failed to start {}: {}", target, e)))?;
        let pid = child.id();
        reap(child);

        debug!("Started {} as PID {}", target, pid);
        Ok(pid)
    }
}

impl ActionExecutor for ProcessExecutor {
    fn launch(&self, descriptor: &EntryDescriptor) -> Result<u32> {
        self.start(descriptor)
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        self.kill_process(pid)
    }
}

// Detached children are waited on from a helper thread so none linger
fn reap(mut child: Child) {
    thread::spawn(move || {
        let _ = child.wait();
    });
}

fn working_dir(descriptor: &EntryDescriptor) -> Option<PathBuf> {
    if let Some(dir) = &descriptor.working_dir {
        return Some(dir.clone());
    }

    let target = descriptor.launch_target();
    if !is_full_path(target) {
        return None;
    }
    Path::new(target)
        .parent()
        .filter(|p| p.is_dir())
        .map(Path::to_path_buf)
}

#[cfg(windows)]
fn apply_arguments(command: &mut Command, arguments: &str) -> Result<()> {
    use std::os::windows::process::CommandExt;

    let arguments = arguments.trim();
    if !arguments.is_empty() {
        command.raw_arg(arguments);
    }
    Ok(())
}

#[cfg(not(windows))]
fn apply_arguments(command: &mut Command, arguments: &str) -> Result<()> {
    command.args(split_arguments(arguments)?);
    Ok(())
}

#[cfg_attr(windows, allow(dead_code))]
fn split_arguments(arguments: &str) -> Result<Vec<String>> {
    let arguments = arguments.trim();
    if arguments.is_empty() {
        return Ok(Vec::new());
    }
    shlex::split(arguments)
        .ok_or_else(|| Error::Launch(format!("Cannot parse arguments: {}", arguments)))
}

#[cfg_attr(not(windows), allow(dead_code))]
fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(windows)]
fn start_elevated(descriptor: &EntryDescriptor, target: &str) -> Result<u32> {
    let mut script = format!("Start-Process -FilePath {}", powershell_quote(target));
    let arguments = descriptor.arguments.trim();
    if !arguments.is_empty() {
        script.push_str(&format!(" -ArgumentList {}", powershell_quote(arguments)));
    }
    if let Some(dir) = working_dir(descriptor) {
        script.push_str(&format!(
            " -WorkingDirectory {}",
            powershell_quote(&dir.to_string_lossy())
        ));
    }
    script.push_str(" -Verb RunAs");

    let child = Command::new("powershell")
        .args([
            "-NoProfile",
            "-NonInteractive",
            "-WindowStyle",
            "Hidden",
            "-Command",
            &script,
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::Launch(format!("Failed to start {} elevated: {}", target, e)))?;
    let pid = child.id();
    reap(child);

    debug!("Requested elevated start of {} (helper PID {})", target, pid);
    Ok(pid)
}

#[cfg(not(windows))]
fn start_elevated(descriptor: &EntryDescriptor, target: &str) -> Result<u32> {
    warn!(
        "run_as_admin is only honoured on Windows, starting {} normally",
        target
    );
    let plain = EntryDescriptor {
        run_as_admin: false,
        ..descriptor.clone()
    };
    ProcessExecutor::new().start(&plain)
}
