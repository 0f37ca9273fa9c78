#[allow(unused_imports)]
pub(crate) use anyhow::{anyhow, bail, Error, Result};
#[allow(unused_imports)]
pub(crate) use tracing::{debug, error, info, trace, warn};

pub mod admin;
pub mod config;
pub mod crypt;
pub mod error;
pub mod io;
pub mod net;
pub mod ops;
pub mod recv;
pub mod send;

pub use config::{Config, ConfigFile};
pub use error::ClientError;

use rpipe_wire::Version;

/// The version this client reports to the server.
pub fn client_version() -> Version {
    Version::parse(env!("CARGO_PKG_VERSION"))
}
