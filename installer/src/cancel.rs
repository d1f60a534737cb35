//! Cooperative cancellation.
//!
//! The pipeline checks a [`CancellationToken`] between stages and between
//! fetch attempts. The binary wires SIGINT and SIGTERM to the token on Unix;
//! a running build command is not killed, but nothing after it starts.

use crate::error::{InstallerError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by the signal handler; read by tokens that watch signals.
static SIGNALLED: AtomicBool = AtomicBool::new(false);

/// Shared flag requesting that the pipeline stop at the next checkpoint.
///
/// Clones share the same flag.
///
/// # Examples
///
/// ```
/// use formula_installer::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// assert!(token.check().is_ok());
/// handle.cancel();
/// assert!(token.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    watch_signals: bool,
}

impl CancellationToken {
    /// Create a token that is only cancelled explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Return true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || (self.watch_signals && SIGNALLED.load(Ordering::SeqCst))
    }

    /// Checkpoint: fail with [`InstallerError::Interrupted`] if cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Interrupted`] after [`Self::cancel`] or an
    /// interrupt signal.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(InstallerError::Interrupted);
        }
        Ok(())
    }
}

/// Install SIGINT/SIGTERM handlers and return a token that observes them.
///
/// On non-Unix targets the returned token is only cancelled explicitly.
#[must_use]
pub fn install_signal_handlers() -> CancellationToken {
    #[cfg(unix)]
    unix::install();

    CancellationToken {
        flag: Arc::new(AtomicBool::new(false)),
        watch_signals: cfg!(unix),
    }
}

#[cfg(unix)]
mod unix {
    use super::SIGNALLED;
    use log::warn;
    use std::sync::atomic::Ordering;

    extern "C" fn on_signal(_signal: libc::c_int) {
        SIGNALLED.store(true, Ordering::SeqCst);
    }

    pub(super) fn install() {
        let handler = on_signal as extern "C" fn(libc::c_int);
        for signal in [libc::SIGINT, libc::SIGTERM] {
            // SAFETY: the handler only performs an atomic store, which is
            // async-signal-safe.
            let previous = unsafe { libc::signal(signal, handler as libc::sighandler_t) };
            if previous == libc::SIG_ERR {
                warn!("could not install handler for signal {signal}");
            }
        }
    }
}
