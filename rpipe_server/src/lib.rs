#[allow(unused_imports)]
pub(crate) use anyhow::{anyhow, bail, Error, Result};
#[allow(unused_imports)]
pub(crate) use tracing::{debug, error, info, trace, warn};

pub mod admin;
pub mod app;
pub mod blocked;
pub mod channel;
pub mod logging;
pub mod prune;
mod reply;
pub mod state;

pub use app::{serve, AppState, ServeConfig};
pub use state::{ServerShutdown, State};

use rpipe_wire::Version;

/// Oldest client the channel endpoints will talk to.
pub const MIN_VERSION_STR: &str = "6.3.0";

pub(crate) fn min_version() -> Version {
    Version::parse(MIN_VERSION_STR)
}
