use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Per-channel activity counters, keyed by remote address.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelStats {
    pub peeks: HashMap<String, u64>,
    pub reads: HashMap<String, u64>,
    pub writes: HashMap<String, u64>,
    pub deletes: HashMap<String, u64>,
    /// Last time any new activity touched the channel.
    pub natime: DateTime<Utc>,
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            peeks: HashMap::new(),
            reads: HashMap::new(),
            writes: HashMap::new(),
            deletes: HashMap::new(),
            natime: Utc::now(),
        }
    }
}

/// One record per admin request, successful or not.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminStats {
    pub time: DateTime<Utc>,
    pub version: Option<String>,
    /// Key file that verified the signature, when one did.
    pub signer: Option<PathBuf>,
    pub uid_valid: bool,
    pub uid: Option<String>,
    pub command: String,
    pub host: String,
}

impl AdminStats {
    pub fn new(command: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            version: None,
            signer: None,
            uid_valid: false,
            uid: None,
            command: command.into(),
            host: host.into(),
        }
    }
}

/// Aggregate server statistics, served by the admin `stats` command.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerStats {
    pub start: DateTime<Utc>,
    pub channels: HashMap<String, ChannelStats>,
    pub admin: Vec<AdminStats>,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self {
            start: Utc::now(),
            channels: HashMap::new(),
            admin: Vec::new(),
        }
    }
}

impl ServerStats {
    pub fn peek(&mut self, channel: &str, host: &str) {
        self.bump(channel, host, Field::Peeks);
    }

    pub fn read(&mut self, channel: &str, host: &str) {
        self.bump(channel, host, Field::Reads);
    }

    pub fn write(&mut self, channel: &str, host: &str) {
        self.bump(channel, host, Field::Writes);
    }

    pub fn delete(&mut self, channel: &str, host: &str) {
        self.bump(channel, host, Field::Deletes);
    }

    fn bump(&mut self, channel: &str, host: &str, field: Field) {
        let entry = self.channels.entry(channel.to_owned()).or_default();
        let counters = match field {
            Field::Peeks => &mut entry.peeks,
            Field::Reads => &mut entry.reads,
            Field::Writes => &mut entry.writes,
            Field::Deletes => &mut entry.deletes,
        };
        *counters.entry(host.to_owned()).or_insert(0) += 1;
        entry.natime = Utc::now();
    }
}

enum Field {
    Peeks,
    Reads,
    Writes,
    Deletes,
}
