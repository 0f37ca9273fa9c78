use crate::params::fmt_bool;

/// A response was missing or mangled one of the protocol headers.
#[derive(Debug, thiserror::Error)]
#[error("missing or malformed response header: {0}")]
pub struct BadHeaders(pub &'static str);

fn require(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, BadHeaders> {
    get(key).ok_or(BadHeaders(key))
}

/// Headers on a successful upload response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadHeaders {
    pub stream_id: String,
    /// The soft block size the server wants subsequent blocks capped at.
    pub max_size: usize,
}

impl UploadHeaders {
    pub fn to_pairs(&self) -> [(&'static str, String); 2] {
        [
            ("stream-id", self.stream_id.clone()),
            ("max-size", self.max_size.to_string()),
        ]
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, BadHeaders> {
        Ok(Self {
            stream_id: require(&get, "stream-id")?,
            max_size: require(&get, "max-size")?
                .parse()
                .map_err(|_| BadHeaders("max-size"))?,
        })
    }
}

/// Headers on a successful download response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadHeaders {
    pub stream_id: String,
    pub r#final: bool,
    pub encrypted: bool,
}

impl DownloadHeaders {
    pub fn to_pairs(&self) -> [(&'static str, String); 3] {
        [
            ("stream-id", self.stream_id.clone()),
            ("final", fmt_bool(self.r#final)),
            ("encrypted", fmt_bool(self.encrypted)),
        ]
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, BadHeaders> {
        Ok(Self {
            stream_id: require(&get, "stream-id")?,
            r#final: require(&get, "final")? == "True",
            encrypted: require(&get, "encrypted")? == "True",
        })
    }
}
