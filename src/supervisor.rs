//! Process supervisor: owns every capture unit, restarts the ones that die and tears
//! the whole group down on shutdown.
use std::{
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use crate::{
    config::Settings,
    constants::{
        KILL_TIMEOUT, POLL_INTERVAL, RESTART_BACKOFF, SHUTDOWN_CHECK_INTERVAL,
        TERMINATE_TIMEOUT,
    },
    error::CaptureError,
    signal::ShutdownCheck,
    unit::{Unit, UnitProbe, describe_exit},
};

/// Timing knobs for the supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Delay between two monitoring passes.
    pub poll_interval: Duration,
    /// Fixed delay before respawning a unit that exited unexpectedly.
    pub restart_backoff: Duration,
    /// Grace period after SIGTERM before a unit is killed.
    pub terminate_timeout: Duration,
    /// Time allowed for a killed unit to be reaped.
    pub kill_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            restart_backoff: RESTART_BACKOFF,
            terminate_timeout: TERMINATE_TIMEOUT,
            kill_timeout: KILL_TIMEOUT,
        }
    }
}

/// Supervises one capture process per configured interface.
///
/// The registry is only touched through `&mut self`, so start, restart and stop can
/// never interleave. Signal handlers reach the supervisor exclusively through a
/// [`ShutdownCheck`] observed by [`Supervisor::run`].
#[derive(Debug)]
pub struct Supervisor {
    settings: Settings,
    timings: Timings,
    /// Units in configuration order.
    units: Vec<Unit>,
}

impl Supervisor {
    /// Creates a supervisor with the default timings.
    pub fn new(settings: Settings) -> Self {
        Self::with_timings(settings, Timings::default())
    }

    /// Creates a supervisor with explicit timings.
    pub fn with_timings(settings: Settings, timings: Timings) -> Self {
        Self {
            settings,
            timings,
            units: Vec::new(),
        }
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// Units currently in the registry, in configuration order.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Looks up a unit by interface name.
    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.units.iter().find(|unit| unit.name() == name)
    }

    /// Names of the units currently in the registry.
    pub fn interfaces(&self) -> Vec<&str> {
        self.units.iter().map(Unit::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Starts a capture process for every configured interface, in order.
    ///
    /// Fails closed: if any unit cannot be spawned, the units already started are
    /// stopped again and the spawn error is returned.
    pub fn start_all(&mut self) -> Result<(), CaptureError> {
        info!(
            "Starting capture on {} interface(s)...",
            self.settings.interfaces.len()
        );

        for index in 0..self.settings.interfaces.len() {
            let iface = &self.settings.interfaces[index];
            if self.unit(iface).is_some() {
                debug!("Capture for '{iface}' is already supervised");
                continue;
            }

            match Unit::start(iface, &self.settings) {
                Ok(unit) => {
                    info!(
                        "Started capture for '{iface}' (pid {}), writing to {}*",
                        unit.pid().unwrap_or_default(),
                        unit.command().output_path.display()
                    );
                    self.units.push(unit);
                }
                Err(source) => {
                    let unit = iface.clone();
                    error!("Failed to start capture for '{unit}': {source}");
                    if !self.units.is_empty() {
                        warn!("Stopping captures that were already started");
                        self.stop_all();
                    }
                    return Err(CaptureError::SpawnFailed { unit, source });
                }
            }
        }

        info!("All captures started.");
        Ok(())
    }

    /// One monitoring pass: every unit whose capture process has terminated is
    /// restarted after the fixed backoff. A pending shutdown ends the pass early and
    /// leaves exited units for [`Supervisor::stop_all`] to reap.
    pub fn monitor_cycle(&mut self, shutdown: &dyn ShutdownCheck) {
        for index in 0..self.units.len() {
            if shutdown.should_stop() {
                debug!("Shutdown requested; ending monitor pass early");
                return;
            }

            let unit = &mut self.units[index];
            match unit.probe() {
                Ok(UnitProbe::Running) => {
                    debug!("Capture for '{}' is still running", unit.name());
                }
                Ok(UnitProbe::Exited(status)) => {
                    warn!(
                        "Capture for '{}' exited with {}; restarting in {:?}...",
                        unit.name(),
                        describe_exit(&status),
                        self.timings.restart_backoff
                    );
                    unit.mark_exited(status);
                    self.restart_unit(index, shutdown);
                }
                Ok(UnitProbe::NoProcess) => {
                    warn!(
                        "Capture for '{}' is not running; restarting in {:?}...",
                        unit.name(),
                        self.timings.restart_backoff
                    );
                    self.restart_unit(index, shutdown);
                }
                Err(err) => {
                    error!("Failed to check status of capture for '{}': {err}", unit.name());
                }
            }
        }
    }

    fn restart_unit(&mut self, index: usize, shutdown: &dyn ShutdownCheck) {
        if !sleep_unless_stopped(self.timings.restart_backoff, shutdown) {
            info!(
                "Shutdown requested; not restarting capture for '{}'",
                self.units[index].name()
            );
            return;
        }

        let unit = &mut self.units[index];
        match unit.respawn(&self.settings) {
            Ok(pid) => info!("Restarted capture for '{}' (pid {pid})", unit.name()),
            Err(err) => error!(
                "Failed to restart capture for '{}': {err}; retrying next cycle",
                unit.name()
            ),
        }
    }

    /// Stops every unit (SIGTERM, bounded wait, SIGKILL, bounded wait), closes their
    /// diagnostic sinks and empties the registry. Per-unit failures are logged and do
    /// not prevent the remaining units from being stopped.
    pub fn stop_all(&mut self) {
        if self.units.is_empty() {
            return;
        }

        info!("Stopping {} capture(s)...", self.units.len());
        let Timings {
            terminate_timeout,
            kill_timeout,
            ..
        } = self.timings;

        for mut unit in self.units.drain(..) {
            unit.stop(terminate_timeout, kill_timeout);
        }

        info!("All captures stopped.");
    }

    /// Main loop: start every unit, monitor until shutdown is requested, then stop
    /// every unit.
    pub fn run(&mut self, shutdown: &dyn ShutdownCheck) -> Result<(), CaptureError> {
        self.start_all()?;

        while !shutdown.should_stop() {
            self.monitor_cycle(shutdown);
            sleep_unless_stopped(self.timings.poll_interval, shutdown);
        }

        info!("Shutting down capture supervisor");
        self.stop_all();
        Ok(())
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if !self.units.is_empty() {
            debug!("Supervisor dropped with live units; stopping them");
            self.stop_all();
        }
    }
}

/// Sleeps for `duration` in short slices, returning `false` as soon as shutdown is
/// requested and `true` if the full duration elapsed.
fn sleep_unless_stopped(duration: Duration, shutdown: &dyn ShutdownCheck) -> bool {
    let deadline = Instant::now() + duration;

    loop {
        if shutdown.should_stop() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SHUTDOWN_CHECK_INTERVAL.min(deadline - now));
    }
}
