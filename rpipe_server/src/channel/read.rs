use super::version_guard;
use crate::app::{AppState, ClientAddr};
use crate::reply::{octet, plaintext};
use crate::state::{ServerShutdown, Stream};
use axum::extract::{Extension, Path as UrlPath, Query, State};
use axum::response::Response;
use rpipe_wire::codes::download as ec;
use rpipe_wire::{DownloadHeaders, DownloadParams, MAX_SIZE_SOFT};
use std::collections::HashMap;
use std::sync::Arc;

/// Reject reads that must take the whole pipe at once (peeks and web
/// clients) when the stream cannot satisfy that.
fn all_at_once_guard(stream: &Stream, params: &DownloadParams) -> Option<Response> {
    if params.delete && !params.version.is_web() {
        return None;
    }
    let mode = if params.delete { "web client" } else { "peek" };
    if params.stream_id.is_some() {
        return Some(plaintext(
            format!("Stream ID not allowed when using {mode}."),
            ec::FORBIDDEN,
        ));
    }
    if !stream.new {
        return Some(plaintext(
            "Another client has already connected to this pipe.",
            ec::IN_USE,
        ));
    }
    if !stream.upload_complete {
        if stream.full() {
            return Some(plaintext(
                format!("Must wait until uploader completes upload when using {mode}"),
                ec::WAIT,
            ));
        }
        return Some(plaintext(
            format!("Too much data to read all at once when using {mode}; data can only be read all at once."),
            ec::CANNOT_PEEK,
        ));
    }
    None
}

fn read_error_check(stream: &Stream, params: &DownloadParams) -> Option<Response> {
    if let Some(reject) = all_at_once_guard(stream, params) {
        return Some(reject);
    }
    match &params.stream_id {
        None if !stream.new => {
            return Some(plaintext(
                "Another client has already connected to this pipe.",
                ec::IN_USE,
            ))
        }
        Some(id) if id.as_str() != stream.id() => {
            return Some(plaintext("Stream ID mismatch", ec::CONFLICT))
        }
        _ => {}
    }
    if params.version.is_web() && stream.encrypted() {
        return Some(plaintext(
            "Web version cannot read encrypted data. Use the CLI client.",
            422,
        ));
    }
    if !params.version.is_web() && params.version != *stream.version() && !params.r#override {
        return Some(plaintext(
            format!("Override = False. Version should be: {}", stream.version()),
            ec::WRONG_VERSION,
        ));
    }
    if !stream.upload_complete && stream.is_empty() {
        return Some(plaintext(
            "No data available; wait for the uploader to send more",
            ec::WAIT,
        ));
    }
    None
}

/// `GET /c/{channel}` — peek or consume, per the query parameters.
pub(crate) async fn read(
    State(app): State<Arc<AppState>>,
    Extension(addr): Extension<ClientAddr>,
    UrlPath(channel): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ServerShutdown> {
    let params = DownloadParams::from_query(&query);
    crate::debug!("GET {channel}: {params:?}");
    if let Some(reject) = version_guard(&params.version, ec::ILLEGAL_VERSION) {
        return Ok(reject);
    }

    let mut state = app.state.lock()?;
    let Some(stream) = state.streams.get_mut(&channel) else {
        return Ok(plaintext("This channel is currently empty", ec::NO_DATA));
    };
    if let Some(reject) = read_error_check(stream, &params) {
        return Ok(reject);
    }

    let whole_pipe = !params.delete || params.version.is_web();
    let (body, r#final) = if whole_pipe {
        (stream.concat(), true)
    } else {
        let block = stream.pop_coalesced(MAX_SIZE_SOFT);
        (block, stream.upload_complete && stream.is_empty())
    };
    let headers = DownloadHeaders {
        stream_id: stream.id().to_owned(),
        r#final,
        encrypted: stream.encrypted(),
    }
    .to_pairs();

    if params.delete {
        if stream.new {
            state.stats.read(&channel, &addr.0);
        }
        if let Some(stream) = state.streams.get_mut(&channel) {
            stream.new = false;
        }
        if r#final {
            crate::info!("Channel {channel} fully consumed");
            state.streams.remove(&channel);
        }
    } else {
        state.stats.peek(&channel, &addr.0);
    }
    Ok(octet(body, 200, &headers))
}
