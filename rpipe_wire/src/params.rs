use crate::version::{web_version, Version};
use std::collections::HashMap;

// Booleans cross the wire as these exact literals.
const TRUE: &str = "True";
const FALSE: &str = "False";

pub(crate) fn fmt_bool(b: bool) -> String {
    (if b { TRUE } else { FALSE }).to_owned()
}

fn get_bool(query: &HashMap<String, String>, key: &str) -> bool {
    query.get(key).map(|v| v == TRUE).unwrap_or(false)
}

/// Query parameters of an upload POST/PUT.
///
/// Keys are hyphen-cased on the wire; absent optionals are omitted rather
/// than sent empty.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadParams {
    pub version: Version,
    pub encrypted: bool,
    pub r#final: bool,
    pub r#override: bool,
    /// Not sent on the stream-opening POST.
    pub stream_id: Option<String>,
    pub ttl: Option<u32>,
}

impl UploadParams {
    pub fn new(version: Version, encrypted: bool) -> Self {
        Self {
            version,
            encrypted,
            r#final: false,
            r#override: false,
            stream_id: None,
            ttl: None,
        }
    }

    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("version", self.version.to_string()),
            ("encrypted", fmt_bool(self.encrypted)),
            ("final", fmt_bool(self.r#final)),
            ("override", fmt_bool(self.r#override)),
        ];
        if let Some(sid) = &self.stream_id {
            q.push(("stream-id", sid.clone()));
        }
        if let Some(ttl) = self.ttl {
            q.push(("ttl", ttl.to_string()));
        }
        q
    }

    /// A missing version means a bare browser request; an unparsable ttl is
    /// treated as unset.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        Self {
            version: query
                .get("version")
                .map(|v| Version::parse(v))
                .unwrap_or_else(web_version),
            encrypted: get_bool(query, "encrypted"),
            r#final: get_bool(query, "final"),
            r#override: get_bool(query, "override"),
            stream_id: query.get("stream-id").cloned(),
            ttl: query.get("ttl").and_then(|t| t.parse().ok()),
        }
    }
}

/// Query parameters of a download GET.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadParams {
    pub version: Version,
    /// True consumes from the stream; false peeks.
    pub delete: bool,
    pub r#override: bool,
    pub stream_id: Option<String>,
}

impl DownloadParams {
    pub fn new(version: Version, delete: bool) -> Self {
        Self {
            version,
            delete,
            r#override: false,
            stream_id: None,
        }
    }

    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("version", self.version.to_string()),
            ("delete", fmt_bool(self.delete)),
            ("override", fmt_bool(self.r#override)),
        ];
        if let Some(sid) = &self.stream_id {
            q.push(("stream-id", sid.clone()));
        }
        q
    }

    pub fn from_query(query: &HashMap<String, String>) -> Self {
        Self {
            version: query
                .get("version")
                .map(|v| Version::parse(v))
                .unwrap_or_else(web_version),
            delete: get_bool(query, "delete"),
            r#override: get_bool(query, "override"),
            stream_id: query.get("stream-id").cloned(),
        }
    }
}
