use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Answer to `GET /q/{channel}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub new: bool,
    pub upload_complete: bool,
    pub size: u64,
    pub encrypted: bool,
    pub version: Version,
    pub expiration: DateTime<Utc>,
}

/// Per-channel summary in the admin `channels` listing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChannelInfo {
    pub version: Version,
    pub packets: usize,
    pub size: u64,
    pub encrypted: bool,
    pub expire: DateTime<Utc>,
}

/// Answer to `GET /supported`: the client versions the server will talk to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Supported {
    pub min: Version,
    pub banned: Vec<Version>,
}
