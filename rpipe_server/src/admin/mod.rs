// Internal modules
mod uid;

// Public exports
pub use uid::UidStore;

use crate::app::{AppState, ClientAddr};
use crate::reply::{json, octet, plaintext};
use crate::state::ServerShutdown;
use axum::extract::{Extension, Path as UrlPath, State};
use axum::response::{IntoResponse, Response};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rpipe_wire::{codes, AdminEnvelope, AdminStats, ChannelInfo, Version};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Oldest client allowed to issue admin requests.
pub const ADMIN_MIN_VERSION_STR: &str = "8.6.0";

const UIDS_PER_QUERY: usize = 2;
const BRUTE_FORCE_DELAY_MS: u64 = 20;

/// Verifies signed admin requests.
///
/// Holds the UID store and the verifying halves of the configured SSH keys;
/// every admin POST goes through [`Admin::verify`] before its command
/// handler runs.
pub struct Admin {
    pub uids: UidStore,
    verifiers: Vec<(VerifyingKey, PathBuf)>,
    // Serializes the pre-verification delay so brute force attempts queue.
    gate: tokio::sync::Mutex<()>,
}

impl Default for Admin {
    fn default() -> Self {
        Self::new()
    }
}

impl Admin {
    pub fn new() -> Self {
        Self {
            uids: UidStore::default(),
            verifiers: Vec::new(),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the SSH public keys admin signatures are checked against.
    /// Unsupported key algorithms are skipped with a log message.
    pub fn load_keys(&mut self, key_files: &[PathBuf]) {
        crate::info!("Loading allowed signing keys");
        self.verifiers = key_files
            .iter()
            .filter_map(|f| load_verifier(f).map(|v| (v, f.clone())))
            .collect();
        crate::info!("Signing key load complete: {} key(s)", self.verifiers.len());
    }

    /// Run the whole verification sequence over a raw admin POST body and
    /// return the signed command payload. Every attempt, good or bad, is
    /// appended to the admin stats log.
    pub async fn verify(
        &self,
        raw: &[u8],
        host: &str,
        command: &str,
        state: &crate::State,
    ) -> Result<String, Response> {
        let mut stat = AdminStats::new(command, host);
        let outcome = self.verify_inner(raw, &mut stat).await;
        match state.lock() {
            Ok(mut s) => s.stats.admin.push(stat),
            Err(e) => return Err(e.into_response()),
        }
        outcome
    }

    async fn verify_inner(
        &self,
        raw: &[u8],
        stat: &mut AdminStats,
    ) -> Result<String, Response> {
        let envelope = AdminEnvelope::decode(raw).map_err(|e| {
            crate::warn!("Rejecting malformed admin request: {e}");
            plaintext(e.to_string(), codes::admin::INVALID)
        })?;
        stat.version = Some(envelope.version.to_string());
        if envelope.version < Version::parse(ADMIN_MIN_VERSION_STR) {
            crate::warn!("Rejecting admin request; client too old: {}", envelope.version);
            return Err(plaintext(
                format!("Minimum supported client version: {ADMIN_MIN_VERSION_STR}"),
                codes::admin::ILLEGAL_VERSION,
            ));
        }
        {
            // Slow down brute force attacks
            let _gate = self.gate.lock().await;
            tokio::time::sleep(std::time::Duration::from_millis(BRUTE_FORCE_DELAY_MS)).await;
        }
        let message = envelope.parse_message().map_err(|e| {
            crate::warn!("Rejecting admin request with bad message: {e}");
            plaintext(e.to_string(), codes::admin::INVALID)
        })?;
        stat.uid = Some(message.uid.clone());
        if !self.uids.verify(&message.uid) {
            crate::error!("Rejecting admin request; invalid UID: {}", message.uid);
            return Err(plaintext("", codes::admin::UNAUTHORIZED));
        }
        stat.uid_valid = true;
        let Some(signer) = self.verify_signature(&envelope.signature, &envelope.message) else {
            crate::error!("Admin signature verification failed");
            return Err(plaintext("", codes::admin::UNAUTHORIZED));
        };
        stat.signer = Some(signer.clone());
        crate::info!("Admin signature verified; executing {}", message.path);
        Ok(message.body)
    }

    fn verify_signature(&self, signature: &[u8], message: &[u8]) -> Option<&PathBuf> {
        let signature = Signature::from_slice(signature).ok()?;
        self.verifiers
            .iter()
            .find(|(key, _)| key.verify(message, &signature).is_ok())
            .map(|(_, path)| path)
    }
}

fn load_verifier(key_file: &Path) -> Option<VerifyingKey> {
    if !key_file.exists() {
        crate::error!("Key file {} does not exist", key_file.display());
        return None;
    }
    let raw = match std::fs::read_to_string(key_file) {
        Ok(raw) => raw,
        Err(e) => {
            crate::error!("Could not read key file {}: {e}", key_file.display());
            return None;
        }
    };
    let key = match ssh_key::PublicKey::from_openssh(&raw) {
        Ok(key) => key,
        Err(e) => {
            crate::error!("Could not parse key file {}: {e}", key_file.display());
            return None;
        }
    };
    let Some(ed25519) = key.key_data().ed25519() else {
        crate::error!(
            "Signature verification is not supported for {} - skipping",
            key_file.display()
        );
        return None;
    };
    VerifyingKey::from_bytes(&ed25519.0).ok()
}

//
// Command dispatch
//

type AdminHandler = fn(&AppState, &str) -> Result<Response, ServerShutdown>;

/// Every admin command the server knows, and whether a signed request may
/// reach it. All of these require verification; `/admin/uid` is the only
/// unauthenticated admin route and is wired separately.
pub(crate) const COMMANDS: &[(&str, AdminHandler)] = &[
    ("debug", debug),
    ("channels", channels),
    ("stats", stats),
    ("log", log),
    ("log-level", log_level),
    ("lock", lock),
    ("ip", ip),
    ("route", route),
];

/// `GET /admin/uid`
pub(crate) async fn uids(State(app): State<Arc<AppState>>) -> Response {
    json(&app.admin.uids.issue(UIDS_PER_QUERY))
}

/// `POST /admin/{command}` — verify the signature, then dispatch.
pub(crate) async fn dispatch(
    State(app): State<Arc<AppState>>,
    UrlPath(command): UrlPath<String>,
    Extension(addr): Extension<ClientAddr>,
    body: axum::body::Bytes,
) -> Response {
    let Some((_, handler)) = COMMANDS.iter().find(|(name, _)| *name == command) else {
        return plaintext(format!("Unknown admin command: {command}"), 404);
    };
    match app.admin.verify(&body, &addr.0, &command, &app.state).await {
        Ok(body) => handler(&app, &body).unwrap_or_else(|e| e.into_response()),
        Err(rejection) => rejection,
    }
}

fn debug(app: &AppState, _body: &str) -> Result<Response, ServerShutdown> {
    let debug = app.state.lock()?.debug();
    Ok(plaintext(if debug { "True" } else { "False" }, 200))
}

fn channels(app: &AppState, _body: &str) -> Result<Response, ServerShutdown> {
    let state = app.state.lock()?;
    let listing: HashMap<&String, ChannelInfo> = state
        .streams
        .iter()
        .map(|(name, s)| {
            (
                name,
                ChannelInfo {
                    version: s.version().clone(),
                    packets: s.blocks(),
                    size: s.len() as u64,
                    encrypted: s.encrypted(),
                    expire: s.expire(),
                },
            )
        })
        .collect();
    Ok(json(&listing))
}

fn stats(app: &AppState, _body: &str) -> Result<Response, ServerShutdown> {
    let state = app.state.lock()?;
    Ok(json(&state.stats))
}

fn log(app: &AppState, _body: &str) -> Result<Response, ServerShutdown> {
    let Some(log_file) = &app.log_file else {
        return Ok(plaintext("Missing log file", 500));
    };
    let raw = match std::fs::read(log_file) {
        Ok(raw) => raw,
        Err(e) => {
            crate::error!("Could not read log file: {e}");
            return Ok(plaintext("Could not read log file", 500));
        }
    };
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    let compressed = enc
        .write_all(&raw)
        .and_then(|()| enc.finish())
        .unwrap_or_default();
    crate::debug!("Sending compressed log of size: {}", compressed.len());
    Ok(octet(compressed, 200, &[]))
}

fn log_level(app: &AppState, body: &str) -> Result<Response, ServerShutdown> {
    let old = app.log.level();
    let new = if body.is_empty() {
        old.clone()
    } else {
        match app.log.set_level(body) {
            Ok(()) => {
                crate::info!("Log level set to {body}");
                app.log.level()
            }
            Err(_) => {
                return Ok(plaintext(
                    format!("Invalid log level: {body}"),
                    codes::admin::INVALID,
                ))
            }
        }
    };
    Ok(plaintext(format!("{old}\n{new}"), 200))
}

#[derive(Deserialize)]
struct LockRequest {
    channel: String,
    lock: bool,
}

fn lock(app: &AppState, body: &str) -> Result<Response, ServerShutdown> {
    let req: LockRequest = match serde_json::from_str(body) {
        Ok(req) => req,
        Err(e) => return Ok(plaintext(e.to_string(), codes::admin::INVALID)),
    };
    let mut state = app.state.lock()?;
    let Some(stream) = state.streams.get_mut(&req.channel) else {
        return Ok(plaintext("No such channel", codes::query::NO_DATA));
    };
    stream.locked = req.lock;
    crate::info!(
        "Channel {} is now {}",
        req.channel,
        if req.lock { "locked" } else { "unlocked" }
    );
    Ok(plaintext(if req.lock { "Locked" } else { "Unlocked" }, 200))
}

#[derive(Deserialize)]
struct BlockRequest {
    #[serde(default)]
    block: Vec<String>,
    #[serde(default)]
    unblock: Vec<String>,
}

fn ip(app: &AppState, body: &str) -> Result<Response, ServerShutdown> {
    let req: BlockRequest = match serde_json::from_str(body) {
        Ok(req) => req,
        Err(e) => return Ok(plaintext(e.to_string(), codes::admin::INVALID)),
    };
    app.blocked.update(|data| {
        for ip in &req.block {
            data.ip_blacklist.insert(ip.clone());
        }
        for ip in &req.unblock {
            data.ip_blacklist.remove(ip);
        }
    });
    Ok(json(&app.blocked.snapshot(|d| {
        d.ip_blacklist.iter().cloned().collect::<Vec<_>>()
    })))
}

fn route(app: &AppState, body: &str) -> Result<Response, ServerShutdown> {
    let req: BlockRequest = match serde_json::from_str(body) {
        Ok(req) => req,
        Err(e) => return Ok(plaintext(e.to_string(), codes::admin::INVALID)),
    };
    app.blocked.update(|data| {
        for pattern in &req.block {
            if !data.route_blacklist.contains(pattern) {
                data.route_blacklist.push(pattern.clone());
            }
        }
        data.route_blacklist.retain(|p| !req.unblock.contains(p));
    });
    Ok(json(
        &app.blocked.snapshot(|d| d.route_blacklist.clone()),
    ))
}
