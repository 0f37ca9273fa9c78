use crate::config::Config;
use crate::error::ClientError;
use crate::net::Http;
use reqwest::Method;
use rpipe_wire::codes::query as qec;
use rpipe_wire::{codes, QueryResponse, Supported};

/// Drop the channel and whatever stream it holds.
pub async fn delete(config: &Config) -> Result<(), ClientError> {
    crate::info!("Deleting channel {}", config.channel);
    let http = Http::new(config)?;
    let resp = http
        .channel(Method::DELETE, &[], Vec::new())
        .await?;
    match resp.status().as_u16() {
        code if resp.status().is_success() => {
            crate::debug!("Delete answered {code}");
            Ok(())
        }
        codes::BLOCKED => Err(ClientError::Blocked),
        codes::delete::LOCKED => Err(ClientError::Locked(resp.text().await.unwrap_or_default())),
        code => Err(crate::anyhow!("delete failed with status {code}").into()),
    }
}

/// Ask the server what it knows about the channel.
pub async fn query(config: &Config) -> Result<QueryResponse, ClientError> {
    crate::info!("Querying channel {}", config.channel);
    let http = Http::new(config)?;
    let resp = http
        .get(&["q", &config.channel])
        .await?;
    match resp.status().as_u16() {
        qec::ILLEGAL_VERSION => Err(ClientError::Version(resp.text().await.unwrap_or_default())),
        qec::NO_DATA => Err(ClientError::NoData(format!(
            "No data on channel: {}",
            config.channel
        ))),
        codes::BLOCKED => Err(ClientError::Blocked),
        _ if resp.status().is_success() => Ok(resp.json().await?),
        code => {
            let text = resp.text().await.unwrap_or_default();
            Err(crate::anyhow!("query failed. Error {code}: {text}").into())
        }
    }
}

/// The server's own version string.
pub async fn server_version(config: &Config) -> Result<String, ClientError> {
    let http = Http::new(config)?;
    let resp = http.get(&["version"]).await?;
    if !resp.status().is_success() {
        return Err(crate::anyhow!("failed to get server version: {}", resp.status()).into());
    }
    Ok(resp.text().await?)
}

/// True when the server still accepts this client.
pub async fn supported(config: &Config) -> Result<bool, ClientError> {
    let http = Http::new(config)?;
    let resp = http.get(&["supported"]).await?;
    if !resp.status().is_success() {
        return Err(crate::anyhow!("failed to get supported versions: {}", resp.status()).into());
    }
    let info: Supported = resp.json().await?;
    crate::info!("Server supports clients >= {}", info.min);
    let me = crate::client_version();
    Ok(info.min <= me && !info.banned.iter().any(|banned| *banned == me))
}

/// Probe whether the server's blocklist turns this address away.
pub async fn blocked(config: &Config) -> Result<bool, ClientError> {
    let http = Http::new(config)?;
    let resp = http.get(&["supported"]).await?;
    Ok(resp.status().as_u16() == codes::BLOCKED)
}

/// Render a query answer the way the CLI prints it.
pub fn format_query(channel: &str, q: &QueryResponse) -> String {
    format!(
        "{channel}:\n  new: {}\n  upload complete: {}\n  size: {}\n  encrypted: {}\n  version: {}\n  expiration: {}",
        q.new, q.upload_complete, q.size, q.encrypted, q.version, q.expiration
    )
}
