use crate::config::Config;
use crate::crypt;
use crate::error::ClientError;
use crate::net::{header_lookup, wait_delay, Http};
use reqwest::{Method, Response};
use rpipe_wire::codes::download as ec;
use rpipe_wire::{codes, DownloadHeaders, DownloadParams};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Download the channel into `out`.
///
/// `block` only affects the first GET: while it is set, an empty channel
/// is retried instead of reported. Once any data arrives the loop follows
/// the stream id and relies solely on the server's wait signal. A broken
/// output pipe ends the transfer quietly. Returns the bytes written.
/// `started` flips on the first successful response, telling the caller a
/// later failure leaves a channel worth clearing.
pub async fn recv(
    config: &Config,
    block: bool,
    peek: bool,
    force: bool,
    out: &mut impl Write,
    started: &Arc<AtomicBool>,
) -> Result<u64, ClientError> {
    let http = Http::new(config)?;
    crate::info!(
        "Reading from channel {} with peek={peek} and force={force}",
        http.channel_name()
    );
    let mut params = DownloadParams::new(crate::client_version(), !peek);
    params.r#override = force;
    let mut block = block;
    let mut level = 0u32;
    let mut total = 0u64;

    loop {
        let resp = http
            .channel(Method::GET, &params.to_query(), Vec::new())
            .await?;
        let code = resp.status().as_u16();

        if resp.status().is_success() {
            started.store(true, Ordering::Relaxed);
            let headers = DownloadHeaders::from_lookup(header_lookup(&resp))?;
            let raw = resp.bytes().await?;
            crate::info!("Received {} bytes", raw.len());
            let password = if headers.encrypted {
                if config.password.is_none() {
                    return Err(ClientError::usage(
                        "Channel data is encrypted and no password is set",
                    ));
                }
                config.password.as_deref()
            } else {
                None
            };
            let data = crypt::decrypt(&raw, password)?;
            match out.write_all(&data).and_then(|()| out.flush()) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    crate::warn!("Output pipe closed; stopping");
                    return Ok(total);
                }
                Err(e) => return Err(crate::anyhow!("could not write output: {e}").into()),
            }
            total += data.len() as u64;
            if headers.r#final {
                crate::info!("Stream complete");
                return Ok(total);
            }
            params.stream_id = Some(headers.stream_id);
            // Only the initial wait honors --block.
            block = false;
            level = 0;
        } else if code == ec::WAIT || (block && code == ec::NO_DATA) {
            let delay = wait_delay(level);
            crate::info!("No data available yet, sleeping for {delay:?}");
            tokio::time::sleep(delay).await;
            level += 1;
        } else {
            return Err(recv_error(resp, config, peek, params.stream_id.is_some(), level != 0).await);
        }
    }
}

/// Map a failed download response onto the client error taxonomy.
async fn recv_error(
    resp: Response,
    config: &Config,
    peek: bool,
    continuing: bool,
    waited: bool,
) -> ClientError {
    let code = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    crate::error!("Error reading from channel {}: status {code}", config.channel);
    match code {
        codes::BLOCKED => ClientError::Blocked,
        ec::WRONG_VERSION => {
            let uploader = text.rsplit(':').next().unwrap_or("").trim().to_owned();
            ClientError::Version(format!(
                "Version mismatch; uploader version = {uploader}; force a read with --force"
            ))
        }
        ec::ILLEGAL_VERSION => ClientError::Version(text),
        ec::NO_DATA if continuing => ClientError::MultipleClients(
            "This data stream no longer exists; maybe the sender cancelled sending?".to_owned(),
        ),
        ec::NO_DATA => ClientError::NoData(format!("The channel {} is empty.", config.channel)),
        ec::CONFLICT if continuing => ClientError::MultipleClients(
            "This data stream no longer exists; maybe the channel was deleted?".to_owned(),
        ),
        ec::CONFLICT => ClientError::ReportThis(text),
        ec::CANNOT_PEEK => ClientError::Stream(
            "Too much data to peek; data is being streamed and does not all exist on server."
                .to_owned(),
        ),
        ec::IN_USE if peek && waited => ClientError::MultipleClients(
            "Another client started reading the data before peek was complete".to_owned(),
        ),
        ec::IN_USE => ClientError::MultipleClients(text),
        ec::FORBIDDEN => {
            ClientError::ReportThis("Attempt to read from stream with stream ID.".to_owned())
        }
        ec::LOCKED => ClientError::Locked(text),
        _ => ClientError::Other(crate::anyhow!("unexpected response {code}: {text}")),
    }
}
