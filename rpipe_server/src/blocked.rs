use chrono::{DateTime, Utc};
use regex::Regex;
use rpipe_wire::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Blocklist files written by anything older than this are refused.
const MIN_BLOCKLIST_VERSION: &str = "9.11.0";

/// On-disk shape of the blocklist.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockData {
    pub version: Version,
    pub ip_whitelist: BTreeSet<String>,
    pub ip_blacklist: BTreeSet<String>,
    pub route_whitelist: Vec<String>,
    pub route_blacklist: Vec<String>,
    /// Blocked attempts: ip -> [(when, path)].
    pub stats: HashMap<String, Vec<(DateTime<Utc>, String)>>,
}

impl Default for BlockData {
    fn default() -> Self {
        Self {
            version: Version::parse(env!("CARGO_PKG_VERSION")),
            ip_whitelist: BTreeSet::new(),
            ip_blacklist: BTreeSet::new(),
            route_whitelist: Vec::new(),
            route_blacklist: Vec::new(),
            stats: HashMap::new(),
        }
    }
}

struct Inner {
    data: BlockData,
    white: Vec<Regex>,
    black: Vec<Regex>,
}

/// Decides whether a request is let through, by source IP first and route
/// pattern second. A route-blacklist hit escalates: the offending IP lands
/// on the IP blacklist.
pub struct Blocked {
    inner: Mutex<Inner>,
    file: Option<PathBuf>,
}

impl Blocked {
    pub fn load(file: Option<PathBuf>) -> crate::Result<Self> {
        let data = match &file {
            None => {
                crate::warn!("No blocklist file; blocklist changes will not persist");
                BlockData::default()
            }
            Some(path) if !path.is_file() => {
                crate::warn!("Blocklist {} not found; using defaults", path.display());
                BlockData::default()
            }
            Some(path) => {
                crate::info!("Loading blocklist {}", path.display());
                let mut data: BlockData = serde_json::from_str(&std::fs::read_to_string(path)?)?;
                if data.version < Version::parse(MIN_BLOCKLIST_VERSION) {
                    crate::bail!("blocklist version too old: {}", data.version);
                }
                data.version = Version::parse(env!("CARGO_PKG_VERSION"));
                data
            }
        };
        let (white, black) = (
            compile(&data.route_whitelist),
            compile(&data.route_blacklist),
        );
        Ok(Self {
            inner: Mutex::new(Inner { data, white, black }),
            file,
        })
    }

    /// True iff the request must be rejected. Records the attempt when it is.
    pub fn check(&self, ip: &str, path: &str) -> bool {
        let mut inner = self.guard();
        if inner.data.ip_whitelist.contains(ip) {
            return false;
        }
        if inner.data.ip_blacklist.contains(ip) {
            notate(&mut inner.data, ip, path);
            return true;
        }
        if inner.white.iter().any(|p| p.is_match(path)) {
            return false;
        }
        if inner.black.iter().any(|p| p.is_match(path)) {
            crate::info!("Blacklisting IP {ip} based on route: {path}");
            inner.data.ip_blacklist.insert(ip.to_owned());
            notate(&mut inner.data, ip, path);
            return true;
        }
        false
    }

    /// Mutate the data under the lock; route patterns are recompiled before
    /// the lock is released.
    pub fn update(&self, apply: impl FnOnce(&mut BlockData)) {
        let mut inner = self.guard();
        apply(&mut inner.data);
        inner.white = compile(&inner.data.route_whitelist);
        inner.black = compile(&inner.data.route_blacklist);
    }

    pub fn snapshot<T>(&self, read: impl FnOnce(&BlockData) -> T) -> T {
        read(&self.guard().data)
    }

    /// Persist to the configured file, if one was given.
    pub fn save(&self) -> crate::Result<()> {
        let Some(file) = &self.file else {
            crate::warn!("Blocklist has no file; changes were not persisted");
            return Ok(());
        };
        crate::info!("Saving blocklist {}", file.display());
        let inner = self.guard();
        std::fs::write(file, serde_json::to_string_pretty(&inner.data)?)?;
        Ok(())
    }

    fn guard(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn notate(data: &mut BlockData, ip: &str, path: &str) {
    crate::trace!("{ip} blocked, attempted path: {path}");
    data.stats
        .entry(ip.to_owned())
        .or_default()
        .push((Utc::now(), path.to_owned()));
}

/// Case-insensitive, full-match semantics; patterns that fail to compile
/// are logged and skipped rather than taking the server down.
fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(&format!("(?i)^(?:{p})$")) {
            Ok(re) => Some(re),
            Err(_) => {
                crate::error!("Could not compile blocklist pattern: {p}");
                None
            }
        })
        .collect()
}
