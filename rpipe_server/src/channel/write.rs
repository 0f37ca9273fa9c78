use super::version_guard;
use crate::app::{AppState, ClientAddr};
use crate::reply::{plaintext, plaintext_with};
use crate::state::{ServerShutdown, Stream};
use axum::body::Bytes;
use axum::extract::{Extension, Path as UrlPath, Query, State};
use axum::response::Response;
use rpipe_wire::codes::upload as ec;
use rpipe_wire::{UploadHeaders, UploadParams, MAX_SIZE_HARD, MAX_SIZE_SOFT};
use std::collections::HashMap;
use std::sync::Arc;

fn size_guard(body: &Bytes) -> Option<Response> {
    if body.len() > MAX_SIZE_HARD {
        return Some(plaintext(
            format!("Too much data sent. Max data size: {MAX_SIZE_SOFT}"),
            ec::TOO_BIG,
        ));
    }
    None
}

fn ok_headers(stream: &Stream) -> [(&'static str, String); 2] {
    UploadHeaders {
        stream_id: stream.id().to_owned(),
        max_size: MAX_SIZE_SOFT,
    }
    .to_pairs()
}

/// `POST /c/{channel}` — open a new stream, displacing any existing one.
pub(crate) async fn open(
    State(app): State<Arc<AppState>>,
    Extension(addr): Extension<ClientAddr>,
    UrlPath(channel): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ServerShutdown> {
    let params = UploadParams::from_query(&query);
    crate::debug!("POST {channel}: {params:?}");
    if let Some(reject) = version_guard(&params.version, ec::ILLEGAL_VERSION) {
        return Ok(reject);
    }
    if let Some(reject) = size_guard(&body) {
        return Ok(reject);
    }
    if params.stream_id.is_some() {
        return Ok(plaintext(
            "POST request should not have a stream-id",
            ec::STREAM_ID,
        ));
    }

    let stream = Stream::open(
        params.version,
        params.encrypted,
        params.r#final,
        params.ttl,
        body,
    );
    let headers = ok_headers(&stream);
    let mut state = app.state.lock()?;
    // Writing over an existing stream destroys it, which a lock forbids.
    if state.streams.get(&channel).map(|s| s.locked).unwrap_or(false) {
        return Ok(plaintext("Channel is locked", ec::LOCKED));
    }
    state.streams.insert(channel.clone(), stream);
    state.stats.write(&channel, &addr.0);
    Ok(plaintext_with("", 201, &headers))
}

/// `PUT /c/{channel}` — continue an open stream.
pub(crate) async fn append(
    State(app): State<Arc<AppState>>,
    Extension(addr): Extension<ClientAddr>,
    UrlPath(channel): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ServerShutdown> {
    let params = UploadParams::from_query(&query);
    crate::debug!("PUT {channel}: {params:?}");
    if let Some(reject) = version_guard(&params.version, ec::ILLEGAL_VERSION) {
        return Ok(reject);
    }
    if let Some(reject) = size_guard(&body) {
        return Ok(reject);
    }
    let Some(stream_id) = &params.stream_id else {
        return Ok(plaintext("PUT request missing stream-id", ec::STREAM_ID));
    };

    let mut state = app.state.lock()?;
    let stream = match state.streams.get_mut(&channel) {
        Some(s) if s.id() == stream_id.as_str() => s,
        _ => return Ok(plaintext("Stream ID mismatch.", ec::CONFLICT)),
    };
    if stream.upload_complete {
        return Ok(plaintext(
            "Cannot write to a completed stream.",
            ec::FORBIDDEN,
        ));
    }
    if stream.locked {
        return Ok(plaintext("Channel is locked", ec::LOCKED));
    }
    if params.version != *stream.version() && !params.r#override {
        return Ok(plaintext(
            format!("Override = False. Version should be: {}", stream.version()),
            ec::WRONG_VERSION,
        ));
    }
    if !body.is_empty() && stream.would_overflow(body.len()) {
        return Ok(plaintext(
            "Pipe full; wait for the downloader to download more.",
            ec::WAIT,
        ));
    }

    stream.upload_complete = params.r#final;
    if !body.is_empty() {
        stream.push(body);
        log_pipe_size(stream);
    }
    if let Some(ttl) = params.ttl {
        stream.set_ttl(ttl);
    }
    stream.touch();
    let headers = ok_headers(stream);
    state.stats.write(&channel, &addr.0);
    Ok(plaintext_with("", 202, &headers))
}

fn log_pipe_size(stream: &Stream) {
    crate::debug!(
        "Pipe now contains {}/{} bytes ({:.2}% full)",
        stream.len(),
        rpipe_wire::PIPE_MAX_BYTES,
        100.0 * stream.len() as f64 / rpipe_wire::PIPE_MAX_BYTES as f64,
    );
}
