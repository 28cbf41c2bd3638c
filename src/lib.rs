//! capsup keeps one rotating packet capture running per configured network
//! interface. Capture itself is delegated to an external tool (tcpdump by default);
//! capsup starts it, restarts it when it dies and shuts the whole group down
//! gracefully on SIGINT or SIGTERM.

/// CLI interface.
pub mod cli;

/// Capture tool invocation.
pub mod command;

/// Configuration management.
pub mod config;

/// Timings, paths and exit codes.
pub mod constants;

/// Error handling.
pub mod error;

/// Termination signal handling.
pub mod signal;

/// Process supervisor.
pub mod supervisor;

/// Supervised capture units.
pub mod unit;

#[cfg(test)]
mod test_utils;
