//! Constants and configuration values for the capture supervisor.
//!
//! This module centralizes the timings, file names and exit codes used throughout
//! the supervisor.

use std::time::Duration;

// ============================================================================
// Supervision Timing
// ============================================================================

/// Interval between two monitoring passes over the registry.
/// Also bounds how long a shutdown request may go unnoticed.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Fixed delay inserted before respawning a unit after an unexpected exit.
pub const RESTART_BACKOFF: Duration = Duration::from_secs(2);

/// Time a capture process is given to exit after SIGTERM before it is killed.
pub const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for a killed capture process to be reaped.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Granularity of `try_wait` polling while waiting for a process to exit.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Granularity of interruptible sleeps that watch the shutdown flag.
pub const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// File System Constants
// ============================================================================

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/capsup.yaml";

/// Extension of the primary capture file written for each interface.
pub const CAPTURE_FILE_EXTENSION: &str = "pcap";

/// Suffix of the per-interface diagnostic log receiving the capture tool's stderr.
pub const DIAGNOSTIC_LOG_SUFFIX: &str = "stderr.log";

// ============================================================================
// Capture Tool Defaults
// ============================================================================

/// Directory receiving capture files when the configuration does not name one.
pub const DEFAULT_OUTPUT_DIR: &str = "/var/log/tcpdump";

/// Capture tool used when the configuration does not name one.
pub const DEFAULT_CAPTURE_BIN: &str = "/usr/bin/tcpdump";

/// Rotation threshold in megabytes.
pub const DEFAULT_ROTATE_SIZE_MB: u64 = 100;

/// Number of rotated capture files kept by the capture tool.
pub const DEFAULT_MAX_ROTATED_FILES: u32 = 20;

// ============================================================================
// Process Exit Codes
// ============================================================================

/// Exit statuses reported by the `capsup` binary.
pub mod exit_codes {
    /// Graceful shutdown.
    pub const SUCCESS: i32 = 0;
    /// Configuration missing, unreadable or invalid.
    pub const CONFIG_ERROR: i32 = 1;
    /// Capture binary missing or output directory not creatable.
    pub const ENVIRONMENT_ERROR: i32 = 2;
    /// A capture process could not be started.
    pub const STARTUP_ERROR: i32 = 3;
}
