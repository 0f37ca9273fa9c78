use crate::config::Config;
use crate::crypt;
use crate::error::ClientError;
use crate::io::Prefetcher;
use crate::net::{header_lookup, wait_delay, Http};
use reqwest::{Method, Response};
use rpipe_wire::codes::upload as ec;
use rpipe_wire::{codes, UploadHeaders, UploadParams};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Upload everything `input` yields to the configured channel.
///
/// Opens the stream with a POST, adopts the server's advertised block
/// size, then PUTs blocks until the reader reports end of input; the last
/// block carries the final flag. Returns the number of payload bytes read
/// from the input. `opened` flips once the channel holds our stream, so
/// the caller knows a compensating delete is warranted on failure.
pub async fn send(
    config: &Config,
    ttl: Option<u32>,
    level: i32,
    input: Prefetcher,
    opened: &Arc<AtomicBool>,
) -> Result<u64, ClientError> {
    let http = Http::new(config)?;
    let mut params = UploadParams::new(crate::client_version(), config.password.is_some());
    params.ttl = ttl;

    let resp = http
        .channel(Method::POST, &params.to_query(), Vec::new())
        .await?;
    if !resp.status().is_success() {
        return Err(send_error(resp).await);
    }
    let headers = UploadHeaders::from_lookup(header_lookup(&resp))?;
    opened.store(true, Ordering::Relaxed);
    crate::info!(
        "Writing to channel {} with block size {}",
        http.channel_name(),
        headers.max_size
    );
    params.stream_id = Some(headers.stream_id);
    input.increase_chunk(headers.max_size);
    // Give the prefetcher a moment to fill at the new block size.
    tokio::task::yield_now().await;

    let mut total = 0u64;
    loop {
        let reader = input.clone();
        let (block, eof) = tokio::task::spawn_blocking(move || reader.read())
            .await
            .map_err(|e| crate::anyhow!("prefetch reader died: {e}"))?;
        crate::info!("Processing block of {} bytes", block.len());
        total += block.len() as u64;
        params.r#final = eof;
        let payload = crypt::encrypt(&block, config.password.as_deref(), level)?;
        match put_block(&http, &params, payload).await {
            Ok(()) => {}
            // The reader may have taken our last block and closed the pipe
            // before this final marker landed.
            Err(ClientError::MultipleClients(msg)) if eof => {
                crate::warn!("Final block answered with: {msg}");
            }
            Err(e) => return Err(e),
        }
        if eof {
            crate::info!("Stream complete");
            return Ok(total);
        }
    }
}

/// PUT one block, sleeping through 425s with the level-indexed backoff.
async fn put_block(
    http: &Http,
    params: &UploadParams,
    payload: Vec<u8>,
) -> Result<(), ClientError> {
    let mut level = 0u32;
    loop {
        let resp = http
            .channel(Method::PUT, &params.to_query(), payload.clone())
            .await?;
        if resp.status().is_success() {
            let headers = UploadHeaders::from_lookup(header_lookup(&resp))?;
            if Some(&headers.stream_id) != params.stream_id.as_ref() {
                return Err(ClientError::ReportThis(
                    "Server answered with a different stream id".to_owned(),
                ));
            }
            return Ok(());
        }
        if resp.status().as_u16() == ec::WAIT {
            let delay = wait_delay(level);
            crate::info!("Pipe full, sleeping for {delay:?}");
            tokio::time::sleep(delay).await;
            level += 1;
            continue;
        }
        return Err(send_error(resp).await);
    }
}

/// Map a failed upload response onto the client error taxonomy.
async fn send_error(resp: Response) -> ClientError {
    let code = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    match code {
        codes::BLOCKED => ClientError::Blocked,
        ec::ILLEGAL_VERSION => ClientError::Version(format!("Server requires version >= {text}")),
        ec::CONFLICT => ClientError::MultipleClients(
            "The stream ID changed mid-upload; maybe the receiver broke the pipe?".to_owned(),
        ),
        ec::LOCKED => ClientError::Locked(text),
        ec::WRONG_VERSION | ec::TOO_BIG | ec::FORBIDDEN | ec::STREAM_ID => {
            ClientError::ReportThis(text)
        }
        _ => ClientError::Other(crate::anyhow!("unexpected response {code}: {text}")),
    }
}
