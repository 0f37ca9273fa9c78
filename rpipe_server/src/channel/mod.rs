// Internal modules
mod query;
mod read;
mod write;

// Route handlers
pub(crate) use query::query;
pub(crate) use read::read;
pub(crate) use write::{open, append};

use crate::app::{AppState, ClientAddr};
use crate::reply::plaintext;
use crate::state::ServerShutdown;
use axum::extract::{Extension, Path as UrlPath, State};
use axum::response::Response;
use rpipe_wire::{codes, Version};
use std::sync::Arc;

/// Reject clients that are neither the web sentinel nor at least the
/// minimum supported version; `code` picks the operation's 426 constant.
pub(crate) fn version_guard(version: &Version, code: u16) -> Option<Response> {
    if !version.is_web() && (version.invalid() || *version < crate::min_version()) {
        return Some(plaintext(
            format!("Bad version. Requires >= {}", crate::MIN_VERSION_STR),
            code,
        ));
    }
    None
}

/// `DELETE /c/{channel}` — idempotent removal; locked channels refuse.
pub(crate) async fn delete(
    State(app): State<Arc<AppState>>,
    Extension(addr): Extension<ClientAddr>,
    UrlPath(channel): UrlPath<String>,
) -> Result<Response, ServerShutdown> {
    let mut state = app.state.lock()?;
    match state.streams.get(&channel) {
        Some(stream) if stream.locked => {
            crate::info!("Refusing to delete locked channel {channel}");
            Ok(plaintext("Channel is locked", codes::delete::LOCKED))
        }
        Some(_) => {
            crate::info!("Deleting channel {channel}");
            state.streams.remove(&channel);
            state.stats.delete(&channel, &addr.0);
            Ok(plaintext("Cleared", 202))
        }
        None => Ok(plaintext("", 204)),
    }
}
