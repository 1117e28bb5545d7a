//! Cooperative cancellation driven by process signals.
//!
//! SIGINT and SIGTERM ask the capture loop to stop; SIGHUP asks it to stop
//! for a restart. Handlers only set a flag. The loop checks it before each
//! capture and before each sleep, so an in-flight capture always finishes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

/// Process exit status after a requested stop.
pub const EXIT_OK: i32 = 0;
/// Process exit status asking the service manager to restart us.
pub const EXIT_RESTARTING: i32 = 98;
/// Process exit status for errors that need someone to fix the setup.
pub const EXIT_ERROR_STOP: i32 = 99;

const RUNNING: u8 = 0;
const STOP: u8 = 1;
const RESTART: u8 = 2;

/// Why the capture loop was asked to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Interrupt or termination request
    Stop,
    /// Restart request (SIGHUP)
    Restart,
}

impl StopReason {
    pub fn exit_code(self) -> i32 {
        match self {
            StopReason::Stop => EXIT_OK,
            StopReason::Restart => EXIT_RESTARTING,
        }
    }
}

/// Thread-safe stop flag shared between signal handlers and the capture loop.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    state: Arc<AtomicU8>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to end. The first request wins.
    pub fn request(&self, reason: StopReason) {
        let value = match reason {
            StopReason::Stop => STOP,
            StopReason::Restart => RESTART,
        };
        let _ = self
            .state
            .compare_exchange(RUNNING, value, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::SeqCst) != RUNNING
    }

    pub fn reason(&self) -> Option<StopReason> {
        match self.state.load(Ordering::SeqCst) {
            STOP => Some(StopReason::Stop),
            RESTART => Some(StopReason::Restart),
            _ => None,
        }
    }
}

/// Errors that can occur when installing signal handlers.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("Failed to install Ctrl+C handler: {0}")]
    Ctrlc(#[from] ctrlc::Error),

    #[error("Signal handlers are already installed")]
    AlreadyInstalled,
}

/// Flag the raw SIGTERM/SIGHUP handlers write to.
static REGISTERED: OnceLock<StopFlag> = OnceLock::new();

/// Install process signal handlers that set `flag`.
///
/// This should be called once at program startup.
pub fn install_handlers(flag: &StopFlag) -> Result<(), SignalError> {
    REGISTERED
        .set(flag.clone())
        .map_err(|_| SignalError::AlreadyInstalled)?;

    let ctrlc_flag = flag.clone();
    ctrlc::set_handler(move || {
        log::info!("Got SIGINT, stopping after the current capture");
        ctrlc_flag.request(StopReason::Stop);
    })?;

    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGTERM, on_terminate as libc::sighandler_t);
        libc::signal(libc::SIGHUP, on_hangup as libc::sighandler_t);
    }

    Ok(())
}

#[cfg(unix)]
extern "C" fn on_terminate(_signal: libc::c_int) {
    if let Some(flag) = REGISTERED.get() {
        flag.request(StopReason::Stop);
    }
}

#[cfg(unix)]
extern "C" fn on_hangup(_signal: libc::c_int) {
    if let Some(flag) = REGISTERED.get() {
        flag.request(StopReason::Restart);
    }
}
