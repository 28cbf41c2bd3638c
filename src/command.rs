//! Builds the capture tool invocation for a unit.
use std::{
    fmt,
    path::{Path, PathBuf},
    process::Command,
};

use serde::Serialize;

use crate::{
    config::Settings,
    constants::{CAPTURE_FILE_EXTENSION, DIAGNOSTIC_LOG_SUFFIX},
};

/// Fully resolved capture tool invocation for one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureCommand {
    /// Interface the command captures on.
    pub unit: String,
    /// Capture tool binary.
    pub program: PathBuf,
    /// Arguments passed to the capture tool, in order.
    pub args: Vec<String>,
    /// Primary capture file; the tool appends its own rotation suffixes.
    pub output_path: PathBuf,
}

impl CaptureCommand {
    /// Builds the invocation for `unit`: full packet snap length, output templated by
    /// interface name, rotation size and retained file count, then the configured
    /// passthrough arguments in configured order.
    pub fn build(unit: &str, settings: &Settings) -> Self {
        let output_path = capture_file_path(&settings.output_dir, unit);

        let mut args = vec![
            "-i".to_string(),
            unit.to_string(),
            "-s".to_string(),
            "0".to_string(),
            "-w".to_string(),
            output_path.to_string_lossy().into_owned(),
            "-C".to_string(),
            settings.rotate_size_mb.to_string(),
            "-W".to_string(),
            settings.max_rotated_files.to_string(),
        ];
        args.extend(settings.extra_args.iter().cloned());

        Self {
            unit: unit.to_string(),
            program: settings.tcpdump_bin.clone(),
            args,
            output_path,
        }
    }

    /// Returns a `Command` ready to be configured with stdio and spawned.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CaptureCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// `<output_dir>/<unit>.pcap`
pub fn capture_file_path(output_dir: &Path, unit: &str) -> PathBuf {
    output_dir.join(format!("{unit}.{CAPTURE_FILE_EXTENSION}"))
}

/// `<output_dir>/<unit>.stderr.log`
pub fn diagnostic_log_path(output_dir: &Path, unit: &str) -> PathBuf {
    output_dir.join(format!("{unit}.{DIAGNOSTIC_LOG_SUFFIX}"))
}
