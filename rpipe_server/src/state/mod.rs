// Internal modules
mod persist;
mod stream;

// Public exports
pub use stream::Stream;

use rpipe_wire::ServerStats;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Raised when the state lock is requested after shutdown began; handlers
/// answer it with 503.
#[derive(Debug, thiserror::Error)]
#[error("server is shutting down")]
pub struct ServerShutdown;

/// Everything behind the state lock. Not thread safe on its own; reach it
/// through [`State`].
#[derive(Debug, Default)]
pub struct UnlockedState {
    pub streams: HashMap<String, Stream>,
    pub stats: ServerStats,
    pub shutdown: bool,
    debug: bool,
}

impl UnlockedState {
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Debug mode can be switched on but never back off.
    pub fn enable_debug(&mut self) {
        if !self.debug {
            self.debug = true;
            crate::warn!("Debug mode enabled");
        }
    }

    pub fn load(&mut self, file: &Path) -> crate::Result<()> {
        persist::load(self, file)
    }

    pub fn save(&self, file: &Path) -> crate::Result<()> {
        persist::save(self, file)
    }
}

/// The lock around the whole server state.
///
/// Every handler and the prune task go through [`State::lock`]; once the
/// shutdown flag is up further acquisition fails, which is what lets the
/// final state save run with no other holder possible.
#[derive(Debug, Default)]
pub struct State {
    inner: Mutex<UnlockedState>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, UnlockedState>, ServerShutdown> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.shutdown {
            crate::error!("State lock acquired, but server is shut down");
            return Err(ServerShutdown);
        }
        Ok(guard)
    }

    /// Lock without the shutdown gate; only the shutdown path itself may
    /// use this.
    pub fn lock_for_shutdown(&self) -> MutexGuard<'_, UnlockedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
