/// How a failed pipe operation is reported to the user.
///
/// Variants mirror the server's fixed status codes plus the purely local
/// failure modes; the CLI prints the message and exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The client was used incorrectly (bad flag combination, missing
    /// config, and so on).
    #[error("{0}")]
    Usage(String),
    /// The server's blocklist rejected this address.
    #[error("This IP address is blocked by the server")]
    Blocked,
    /// The server rejected this client's version, or the versions of the
    /// two pipe ends disagree.
    #[error("{0}")]
    Version(String),
    /// Nothing to read on the channel.
    #[error("{0}")]
    NoData(String),
    /// Another client is using the channel.
    #[error("{0}")]
    MultipleClients(String),
    /// The operation cannot work on a stream that is still being uploaded.
    #[error("{0}")]
    Stream(String),
    /// The channel is locked by an admin.
    #[error("Channel is locked: {0}")]
    Locked(String),
    /// A state the server should never put a well-behaved client in.
    #[error("{0}\nPlease report this.")]
    ReportThis(String),
    /// The user interrupted an in-flight transfer.
    #[error("Interrupted")]
    Interrupted,
    #[error(transparent)]
    BadHeaders(#[from] rpipe_wire::BadHeaders),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    pub fn usage(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        crate::info!("{msg}");
        Self::Usage(msg)
    }

    /// Process exit status for this error: 2 for usage errors, matching
    /// the argument parser's convention, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            _ => 1,
        }
    }
}
