use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Runtime handle on the subscriber's level filter, so the admin
/// `log-level` command can inspect and change it while serving.
pub struct LogControl {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    level: Mutex<String>,
}

impl LogControl {
    /// A control that tracks the requested level but drives no subscriber;
    /// for embedding the app without taking over global logging.
    pub fn disabled() -> Self {
        Self {
            handle: None,
            level: Mutex::new(tracing::Level::WARN.to_string()),
        }
    }

    pub fn level(&self) -> String {
        self.level
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_level(&self, level: &str) -> crate::Result<()> {
        let parsed: tracing::Level = level
            .parse()
            .map_err(|_| crate::anyhow!("invalid log level: {level}"))?;
        if let Some(handle) = &self.handle {
            handle.reload(EnvFilter::new(parsed.to_string().to_lowercase()))?;
        }
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = parsed.to_string();
        Ok(())
    }
}

fn verbosity_level(verbose: u8) -> tracing::Level {
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// Install the global subscriber: a compact stdout layer plus, when a log
/// file is configured, a non-blocking plain file layer (the file the admin
/// `log` command serves back).
pub fn init(verbose: u8, log_file: Option<&Path>) -> crate::Result<(LogControl, Option<WorkerGuard>)> {
    let level = verbosity_level(verbose);
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy("");
    let (filter, handle) = reload::Layer::new(filter);

    let (file_layer, guard) = match log_file {
        None => (None, None),
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path
                .file_name()
                .ok_or_else(|| crate::anyhow!("log file has no file name"))?;
            let appender =
                tracing_appender::rolling::never(dir.unwrap_or_else(|| Path::new(".")), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
    };

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    crate::info!("Logging level set to {level}");
    Ok((
        LogControl {
            handle: Some(handle),
            level: Mutex::new(level.to_string()),
        },
        guard,
    ))
}
