// Internal modules
mod admin;
mod headers;
mod info;
mod limits;
mod params;
mod stats;
mod version;

// Public exports
pub use admin::{AdminEnvelope, AdminMessage, EnvelopeError};
pub use headers::{BadHeaders, DownloadHeaders, UploadHeaders};
pub use info::{ChannelInfo, QueryResponse, Supported};
pub use limits::{
    DEFAULT_TTL_SECS, MAX_SIZE_HARD, MAX_SIZE_SOFT, MAX_SOFT_SIZE_MIN, PIPE_MAX_BYTES,
};
pub use params::{DownloadParams, UploadParams};
pub use stats::{AdminStats, ChannelStats, ServerStats};
pub use version::{web_version, Version, INVALID_VERSION_STR};

/// Fixed HTTP status codes the protocol commits to.
///
/// These are wire constants shared by both halves of the pipe; the server
/// must answer with exactly these values and the client classifies errors
/// by them.
pub mod codes {
    /// Sent for any request rejected by the server's blocklist.
    pub const BLOCKED: u16 = 401;

    pub mod upload {
        pub const WRONG_VERSION: u16 = 412;
        pub const ILLEGAL_VERSION: u16 = 426;
        pub const STREAM_ID: u16 = 422;
        pub const TOO_BIG: u16 = 413;
        pub const CONFLICT: u16 = 409;
        pub const WAIT: u16 = 425;
        pub const FORBIDDEN: u16 = 406;
        pub const LOCKED: u16 = 423;
    }

    pub mod download {
        pub const WRONG_VERSION: u16 = 412;
        pub const ILLEGAL_VERSION: u16 = 426;
        pub const NO_DATA: u16 = 410;
        pub const CONFLICT: u16 = 409;
        pub const WAIT: u16 = 425;
        pub const FORBIDDEN: u16 = 406;
        pub const CANNOT_PEEK: u16 = 452;
        pub const IN_USE: u16 = 453;
        pub const LOCKED: u16 = 423;
    }

    pub mod delete {
        pub const LOCKED: u16 = 423;
    }

    pub mod query {
        pub const ILLEGAL_VERSION: u16 = 426;
        pub const NO_DATA: u16 = 410;
    }

    pub mod admin {
        pub const INVALID: u16 = 400;
        pub const UNAUTHORIZED: u16 = 403;
        pub const ILLEGAL_VERSION: u16 = 426;
    }
}
