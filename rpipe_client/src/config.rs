use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PASSWORD_ENV: &str = "RPIPE_PASSWORD";
pub const CONFIG_FILE_ENV: &str = "RPIPE_CONFIG_FILE";

const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

/// The settings a pipe operation runs with, after CLI, config file and
/// defaults have been folded together.
#[derive(Clone, Debug)]
pub struct Config {
    pub ssl: bool,
    pub url: String,
    pub channel: String,
    /// No password means plaintext mode.
    pub password: Option<String>,
    pub timeout: Duration,
    pub key_file: Option<PathBuf>,
}

/// What may appear in the JSON config file. Every field is optional; the
/// file only pins what the user saved.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Saved {
    pub ssl: Option<bool>,
    pub url: Option<String>,
    pub channel: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<f64>,
    pub key_file: Option<PathBuf>,
}

/// The values the CLI contributed this invocation.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub ssl: Option<bool>,
    pub url: Option<String>,
    pub channel: Option<String>,
    pub timeout: Option<f64>,
    pub key_file: Option<PathBuf>,
    /// `Some(true)` forces encryption, `Some(false)` forces plaintext,
    /// `None` encrypts when a password is around.
    pub encrypt: Option<bool>,
}

/// CLI beats file beats default.
fn pick<T>(cli: Option<T>, file: Option<T>, default: Option<T>) -> Option<T> {
    cli.or(file).or(default)
}

/// Fold the three config layers into an effective [`Config`].
pub fn resolve(cli: &CliOverrides, file: &Saved) -> Result<Config, ClientError> {
    let password = match cli.encrypt {
        Some(false) => None,
        _ => pick(
            std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty()),
            file.password.clone().filter(|p| !p.is_empty()),
            None,
        ),
    };
    if cli.encrypt == Some(true) && password.is_none() {
        return Err(ClientError::usage(format!(
            "--encrypt requires a password; set {PASSWORD_ENV} or save one in the config"
        )));
    }
    let url = pick(cli.url.clone(), file.url.clone(), None)
        .ok_or_else(|| ClientError::usage("Missing: --url"))?;
    let channel = pick(cli.channel.clone(), file.channel.clone(), None)
        .ok_or_else(|| ClientError::usage("Missing: --channel"))?;
    let ssl = pick(cli.ssl, file.ssl, Some(true)).unwrap_or(true);
    if ssl && !url.starts_with("https://") {
        return Err(ClientError::usage(
            "SSL is required but the URL does not use the https scheme. \
             If raw http is desired, pass --no-require-ssl",
        ));
    }
    let timeout = pick(cli.timeout, file.timeout, Some(DEFAULT_TIMEOUT_SECS))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Ok(Config {
        ssl,
        url: url.trim_end_matches('/').to_owned(),
        channel,
        password,
        timeout: Duration::from_secs_f64(timeout),
        key_file: pick(cli.key_file.clone(), file.key_file.clone(), None),
    })
}

/// A partial resolution for modes that only talk to server-wide routes
/// (`/version`, `/supported`) and need no channel, password or SSL rule.
pub fn resolve_url_only(cli: &CliOverrides, file: &Saved) -> Result<Config, ClientError> {
    let url = pick(cli.url.clone(), file.url.clone(), None)
        .ok_or_else(|| ClientError::usage("Missing: --url"))?;
    let timeout = pick(cli.timeout, file.timeout, Some(DEFAULT_TIMEOUT_SECS))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Ok(Config {
        ssl: false,
        url: url.trim_end_matches('/').to_owned(),
        channel: String::new(),
        password: None,
        timeout: Duration::from_secs_f64(timeout),
        key_file: pick(cli.key_file.clone(), file.key_file.clone(), None),
    })
}

/// The JSON config file at `$RPIPE_CONFIG_FILE` or `~/.config/rpipe.json`.
pub struct ConfigFile {
    pub path: PathBuf,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigFile {
    pub fn new() -> Self {
        let path = std::env::var_os(CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("rpipe.json")
            });
        Self { path }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Saved, ClientError> {
        crate::debug!("Reading config file {}", self.path.display());
        if !self.path.exists() {
            return Ok(Saved::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| crate::anyhow!("could not read {}: {e}", self.path.display()))?;
        serde_json::from_str(&raw)
            .map_err(|e| ClientError::usage(format!("Failed to load config: {e}")))
    }

    /// Save the CLI-visible settings; incomplete configs are fine.
    pub fn save(&self, cli: &CliOverrides, old: &Saved) -> Result<(), ClientError> {
        let password = match cli.encrypt {
            Some(false) => None,
            _ => pick(
                std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty()),
                old.password.clone(),
                None,
            ),
        };
        if cli.encrypt == Some(true) && password.is_none() {
            return Err(ClientError::usage(format!(
                "saving an encrypting config requires {PASSWORD_ENV} be set"
            )));
        }
        let merged = Saved {
            ssl: pick(cli.ssl, old.ssl, None),
            url: pick(cli.url.clone(), old.url.clone(), None),
            channel: pick(cli.channel.clone(), old.channel.clone(), None),
            password,
            timeout: pick(cli.timeout, old.timeout, None),
            key_file: pick(cli.key_file.clone(), old.key_file.clone(), None),
        };
        if let Some(parent) = self.path.parent().filter(|p: &&Path| !p.exists()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::anyhow!("could not create {}: {e}", parent.display()))?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&merged)?)
            .map_err(|e| crate::anyhow!("could not write {}: {e}", self.path.display()))?;
        crate::info!("Config saved");
        Ok(())
    }

    /// Human-readable dump for `--print-config`; the password is redacted.
    pub fn print(&self) -> Result<String, ClientError> {
        let mut out = format!("Config file: {}\n", self.path.display());
        if !self.path.exists() {
            out.push_str("No saved config");
            return Ok(out);
        }
        let mut saved = self.load()?;
        if let Some(pw) = &mut saved.password {
            *pw = "*".repeat(pw.len());
        }
        out.push_str(&serde_json::to_string_pretty(&saved)?);
        Ok(out)
    }
}
