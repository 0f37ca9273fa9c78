use super::version_guard;
use crate::app::AppState;
use crate::reply::{json, plaintext};
use crate::state::ServerShutdown;
use axum::extract::{Path as UrlPath, Query, State};
use axum::response::Response;
use rpipe_wire::codes::query as ec;
use rpipe_wire::{DownloadParams, QueryResponse};
use std::collections::HashMap;
use std::sync::Arc;

/// `GET /q/{channel}` — report a channel's state without touching it.
pub(crate) async fn query(
    State(app): State<Arc<AppState>>,
    UrlPath(channel): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ServerShutdown> {
    let params = DownloadParams::from_query(&query);
    crate::debug!("QUERY {channel}");
    if let Some(reject) = version_guard(&params.version, ec::ILLEGAL_VERSION) {
        return Ok(reject);
    }
    let state = app.state.lock()?;
    let Some(stream) = state.streams.get(&channel) else {
        return Ok(plaintext("This channel is currently empty", ec::NO_DATA));
    };
    Ok(json(&QueryResponse {
        new: stream.new,
        upload_complete: stream.upload_complete,
        size: stream.len() as u64,
        encrypted: stream.encrypted(),
        version: stream.version().clone(),
        expiration: stream.expire(),
    }))
}
