//! A single supervised capture process and the resources it owns.
use std::{
    fs::{File, OpenOptions},
    io,
    os::unix::process::{CommandExt, ExitStatusExt},
    path::{Path, PathBuf},
    process::{Child, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use strum_macros::{AsRefStr, Display};
use tracing::{debug, error, info, warn};

use crate::{
    command::{CaptureCommand, diagnostic_log_path},
    config::Settings,
    constants::WAIT_POLL_INTERVAL,
};

/// Lifecycle state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum UnitState {
    /// A capture process is being spawned.
    Starting,
    /// The capture process is alive.
    Running,
    /// The capture process terminated without being asked to.
    Exited,
    /// A graceful termination has been requested.
    Stopping,
    /// Torn down by the supervisor; terminal.
    Stopped,
}

/// Result of a non-blocking liveness check.
#[derive(Debug)]
pub enum UnitProbe {
    /// The capture process is still running.
    Running,
    /// The capture process terminated since the last check.
    Exited(ExitStatus),
    /// No capture process is attached, typically because a respawn failed.
    NoProcess,
}

/// One configured interface together with its capture process and diagnostic sink.
#[derive(Debug)]
pub struct Unit {
    name: String,
    command: CaptureCommand,
    diagnostic_path: PathBuf,
    child: Option<Child>,
    sink: Option<File>,
    state: UnitState,
    restarts: u32,
    last_exit: Option<ExitStatus>,
}

impl Unit {
    /// Builds the capture command for `name`, opens a fresh diagnostic sink and spawns
    /// the capture process.
    pub(crate) fn start(name: &str, settings: &Settings) -> io::Result<Self> {
        let mut unit = Self {
            name: name.to_string(),
            command: CaptureCommand::build(name, settings),
            diagnostic_path: diagnostic_log_path(&settings.output_dir, name),
            child: None,
            sink: None,
            state: UnitState::Starting,
            restarts: 0,
            last_exit: None,
        };
        unit.launch()?;
        Ok(unit)
    }

    /// Interface name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifecycle state.
    pub fn state(&self) -> UnitState {
        self.state
    }

    /// PID of the attached capture process, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Number of times the unit was respawned after an unexpected exit.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Most recently observed exit status.
    pub fn last_exit(&self) -> Option<ExitStatus> {
        self.last_exit
    }

    /// Whether the diagnostic sink is currently open.
    pub fn has_open_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Command the current capture process was started with.
    pub fn command(&self) -> &CaptureCommand {
        &self.command
    }

    /// Path of the diagnostic log receiving the capture tool's stderr.
    pub fn diagnostic_path(&self) -> &Path {
        &self.diagnostic_path
    }

    /// Checks whether the capture process has terminated without blocking.
    pub(crate) fn probe(&mut self) -> io::Result<UnitProbe> {
        let Some(child) = self.child.as_mut() else {
            return Ok(UnitProbe::NoProcess);
        };

        match child.try_wait()? {
            Some(status) => Ok(UnitProbe::Exited(status)),
            None => Ok(UnitProbe::Running),
        }
    }

    /// Records an unexpected exit: drops the reaped handle and closes the stale sink.
    pub(crate) fn mark_exited(&mut self, status: ExitStatus) {
        self.child = None;
        self.last_exit = Some(status);
        self.state = UnitState::Exited;
        self.close_sink();
    }

    /// Replaces the capture process with a new one built from current settings.
    pub(crate) fn respawn(&mut self, settings: &Settings) -> io::Result<u32> {
        self.command = CaptureCommand::build(&self.name, settings);
        self.diagnostic_path = diagnostic_log_path(&settings.output_dir, &self.name);
        match self.launch() {
            Ok(pid) => {
                self.restarts += 1;
                Ok(pid)
            }
            Err(err) => {
                self.state = UnitState::Exited;
                Err(err)
            }
        }
    }

    /// Requests graceful termination, escalates to SIGKILL after `terminate_timeout`
    /// and waits at most `kill_timeout` for the kill to be reaped. Errors are logged,
    /// never returned; the sink is always closed and the unit ends up `Stopped`.
    pub(crate) fn stop(&mut self, terminate_timeout: Duration, kill_timeout: Duration) {
        self.state = UnitState::Stopping;

        if let Some(mut child) = self.child.take() {
            info!("Stopping capture for '{}' (pid {})", self.name, child.id());
            match terminate_child(&self.name, &mut child, terminate_timeout, kill_timeout)
            {
                Ok(Some(status)) => {
                    debug!("Capture for '{}' ended with {}", self.name, describe_exit(&status));
                    self.last_exit = Some(status);
                }
                Ok(None) => {
                    error!(
                        "Capture for '{}' (pid {}) was not reaped after SIGKILL",
                        self.name,
                        child.id()
                    );
                }
                Err(err) => error!("Error stopping capture for '{}': {err}", self.name),
            }
        } else {
            debug!("Capture for '{}' has no live process to stop", self.name);
        }

        self.close_sink();
        self.state = UnitState::Stopped;
    }

    /// Opens the diagnostic sink and spawns the capture process with stdout discarded
    /// and stderr appended to the sink.
    fn launch(&mut self) -> io::Result<u32> {
        self.state = UnitState::Starting;
        self.close_sink();

        let sink = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.diagnostic_path)?;

        let mut cmd = self.command.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(sink.try_clone()?));
        debug!("Executing command: {}", self.command);

        unsafe {
            cmd.pre_exec(|| {
                // Own process group: a terminal Ctrl+C reaches only the supervisor,
                // which then runs the ordered shutdown.
                if libc::setpgid(0, 0) < 0 {
                    return Err(io::Error::last_os_error());
                }

                #[cfg(target_os = "linux")]
                {
                    use libc::{PR_SET_PDEATHSIG, SIGTERM, prctl};
                    if prctl(PR_SET_PDEATHSIG, SIGTERM, 0, 0, 0) < 0 {
                        return Err(io::Error::last_os_error());
                    }
                }

                Ok(())
            });
        }

        let child = cmd.spawn()?;
        let pid = child.id();
        self.child = Some(child);
        self.sink = Some(sink);
        self.state = UnitState::Running;
        Ok(pid)
    }

    fn close_sink(&mut self) {
        if self.sink.take().is_some() {
            debug!("Closed diagnostic log for '{}'", self.name);
        }
    }
}

/// Sends SIGTERM to the capture process group, waits, then escalates to SIGKILL.
fn terminate_child(
    name: &str,
    child: &mut Child,
    terminate_timeout: Duration,
    kill_timeout: Duration,
) -> io::Result<Option<ExitStatus>> {
    if let Some(status) = child.try_wait()? {
        debug!("Capture for '{name}' had already exited");
        return Ok(Some(status));
    }

    let pid = Pid::from_raw(child.id() as i32);
    signal_group(name, pid, Signal::SIGTERM)?;

    if let Some(status) = wait_with_timeout(child, terminate_timeout)? {
        return Ok(Some(status));
    }

    warn!(
        "Capture for '{name}' (pid {pid}) did not exit within {terminate_timeout:?} after SIGTERM; sending SIGKILL"
    );
    signal_group(name, pid, Signal::SIGKILL)?;
    wait_with_timeout(child, kill_timeout)
}

/// Signals the process group led by `pid`, falling back to the leader alone.
fn signal_group(name: &str, pid: Pid, sig: Signal) -> io::Result<()> {
    if let Err(err) = signal::killpg(pid, sig) {
        debug!("Sending {sig} to process group {pid} for '{name}' failed ({err}); signalling pid");
        match signal::kill(pid, sig) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Wait for a child process with a timeout, returning `Ok(None)` on timeout.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(WAIT_POLL_INTERVAL);
            }
        }
    }
}

/// Human-readable exit reason, e.g. `code 1` or `signal SIGKILL`.
pub fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("code {code}");
    }
    match status.signal() {
        Some(raw) => match Signal::try_from(raw) {
            Ok(sig) => format!("signal {}", sig.as_str()),
            Err(_) => format!("signal {raw}"),
        },
        None => "unknown status".to_string(),
    }
}
