use crate::error::ClientError;
use ed25519_dalek::{Signer, SigningKey};
use flate2::read::ZlibDecoder;
use reqwest::Response;
use rpipe_wire::{codes, AdminEnvelope, AdminMessage, ChannelInfo};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

const ADMIN_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Signs and posts admin commands.
///
/// Each command fetches a fresh single-use UID, signs the serialized
/// [`AdminMessage`] with the configured SSH ed25519 key, and posts the
/// envelope the verifier on the other side expects.
pub struct AdminClient {
    url: String,
    key: SigningKey,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct BlockRequest<'a> {
    block: &'a [String],
    unblock: &'a [String],
}

impl AdminClient {
    pub fn new(url: &str, key_file: &Path) -> Result<Self, ClientError> {
        if !key_file.exists() {
            return Err(ClientError::usage(format!(
                "Key file {} does not exist",
                key_file.display()
            )));
        }
        let key = ssh_key::PrivateKey::read_openssh_file(key_file)
            .map_err(|e| ClientError::usage(format!("Could not read {}: {e}", key_file.display())))?;
        let Some(pair) = key.key_data().ed25519() else {
            return Err(ClientError::usage(format!(
                "Key file {} is not an ed25519 key; signing is not supported",
                key_file.display()
            )));
        };
        let key = SigningKey::from_bytes(&pair.private.to_bytes());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(ADMIN_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_owned(),
            key,
            client,
        })
    }

    async fn uid(&self) -> Result<String, ClientError> {
        let resp = self
            .client
            .get(format!("{}/admin/uid", self.url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(crate::anyhow!("could not fetch admin UIDs: {}", resp.status()).into());
        }
        let mut uids: Vec<String> = resp.json().await?;
        if uids.is_empty() {
            return Err(crate::anyhow!("server issued no UIDs").into());
        }
        Ok(uids.remove(0))
    }

    async fn post(&self, command: &str, body: String) -> Result<Response, ClientError> {
        let path = format!("/admin/{command}");
        crate::debug!("Signing request for path {path}");
        let message = AdminMessage {
            path: path.clone(),
            body,
            uid: self.uid().await?,
        };
        let json = serde_json::to_vec(&message).map_err(|e| crate::anyhow!(e))?;
        let signature = self.key.sign(&json);
        let raw = AdminEnvelope::encode(
            &crate::client_version(),
            &signature.to_bytes(),
            &json,
        );
        let resp = self
            .client
            .post(format!("{}{path}", self.url))
            .body(raw)
            .send()
            .await?;
        match resp.status().as_u16() {
            codes::BLOCKED => Err(ClientError::Blocked),
            codes::admin::UNAUTHORIZED => {
                Err(ClientError::usage("Admin access denied"))
            }
            codes::admin::ILLEGAL_VERSION => {
                Err(ClientError::Version(resp.text().await.unwrap_or_default()))
            }
            codes::admin::INVALID => {
                let text = resp.text().await.unwrap_or_default();
                Err(crate::anyhow!("server rejected admin request: {text}").into())
            }
            _ if resp.status().is_success() => Ok(resp),
            code => Err(crate::anyhow!("admin request failed with status {code}").into()),
        }
    }

    /// Whether the server runs in debug mode.
    pub async fn debug(&self) -> Result<bool, ClientError> {
        let resp = self.post("debug", String::new()).await?;
        Ok(resp.text().await? == "True")
    }

    /// All live channels with their stream summaries.
    pub async fn channels(&self) -> Result<HashMap<String, ChannelInfo>, ClientError> {
        self.refuse_plaintext_in_release().await?;
        let resp = self.post("channels", String::new()).await?;
        Ok(resp.json().await?)
    }

    /// The server's aggregate statistics, as raw JSON.
    pub async fn stats(&self) -> Result<serde_json::Value, ClientError> {
        let resp = self.post("stats", String::new()).await?;
        Ok(resp.json().await?)
    }

    /// The server's log file, decompressed.
    pub async fn log(&self) -> Result<Vec<u8>, ClientError> {
        let resp = self.post("log", String::new()).await?;
        let compressed = resp.bytes().await?;
        let mut out = Vec::new();
        ZlibDecoder::new(compressed.as_ref())
            .read_to_end(&mut out)
            .map_err(|e| crate::anyhow!("could not decompress server log: {e}"))?;
        Ok(out)
    }

    /// Read or set the server log level; answers (old, new).
    pub async fn log_level(&self, level: Option<&str>) -> Result<(String, String), ClientError> {
        let resp = self
            .post("log-level", level.unwrap_or_default().to_owned())
            .await?;
        let text = resp.text().await?;
        let mut lines = text.lines();
        match (lines.next(), lines.next()) {
            (Some(old), Some(new)) => Ok((old.to_owned(), new.to_owned())),
            _ => Err(crate::anyhow!("malformed log-level response: {text:?}").into()),
        }
    }

    /// Lock or unlock a channel.
    pub async fn lock(&self, channel: &str, lock: bool) -> Result<(), ClientError> {
        let body = serde_json::json!({ "channel": channel, "lock": lock }).to_string();
        let resp = self.post("lock", body).await?;
        crate::info!("Server answered: {}", resp.text().await.unwrap_or_default());
        Ok(())
    }

    /// Block/unblock IPs, or list the blacklist when both lists are empty.
    pub async fn ip(
        &self,
        block: &[String],
        unblock: &[String],
    ) -> Result<Vec<String>, ClientError> {
        let body = serde_json::to_string(&BlockRequest { block, unblock })
            .map_err(|e| crate::anyhow!(e))?;
        let resp = self.post("ip", body).await?;
        Ok(resp.json().await?)
    }

    /// Block/unblock route patterns, or list them.
    pub async fn route(
        &self,
        block: &[String],
        unblock: &[String],
    ) -> Result<Vec<String>, ClientError> {
        let body = serde_json::to_string(&BlockRequest { block, unblock })
            .map_err(|e| crate::anyhow!(e))?;
        let resp = self.post("route", body).await?;
        Ok(resp.json().await?)
    }

    /// Channel listings expose metadata; refuse to fetch them in the clear
    /// unless the server is a debug instance.
    async fn refuse_plaintext_in_release(&self) -> Result<(), ClientError> {
        if self.url.starts_with("https://") {
            return Ok(());
        }
        if self.debug().await? {
            return Ok(());
        }
        Err(ClientError::usage(
            "Refusing to send admin requests to a release-mode server over plaintext",
        ))
    }
}
