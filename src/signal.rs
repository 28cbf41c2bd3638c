//! Bridges termination signals into a flag the supervisor loop checks cooperatively.
//!
//! The handler never touches the unit registry. It only records that shutdown was
//! requested; the main loop notices at its next safe point and runs the blocking
//! stop sequence itself.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::info;

use crate::error::CaptureError;

/// Something the supervisor can ask whether it should wind down.
pub trait ShutdownCheck: Send + Sync {
    /// Returns true once shutdown has been requested.
    fn should_stop(&self) -> bool;
}

/// Shared flag set by the SIGINT/SIGTERM handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Creates a flag and registers the process-wide handler for SIGINT, SIGTERM and
    /// SIGHUP. Only one handler can be registered per process.
    pub fn install() -> Result<Self, CaptureError> {
        let shutdown = Self::manual();
        let flag = Arc::clone(&shutdown.flag);

        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                info!("Shutdown already in progress");
            } else {
                info!("Received termination signal, shutting down...");
            }
        })?;

        Ok(shutdown)
    }

    /// Creates a flag without registering any handler.
    pub fn manual() -> Self {
        Self::default()
    }

    /// Requests shutdown.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl ShutdownCheck for ShutdownFlag {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
