use clap::{Parser, Subcommand};
use rpipe_client::config::{self, CliOverrides, Saved};
use rpipe_client::io::{hex_digest, Prefetcher, TapReader, TapWriter};
use rpipe_client::{admin, ops, recv, send, ClientError, Config, ConfigFile};
use rpipe_wire::MAX_SOFT_SIZE_MIN;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// rpipe: pipe bytes through a named remote channel.
#[derive(Parser)]
#[command(name = "rpipe", version)]
struct Cli {
    /// Read data from the server
    #[arg(short = 'r', long)]
    recv: bool,

    /// Send data to the server
    #[arg(short = 's', long)]
    send: bool,

    /// Delete all entries in the channel
    #[arg(short = 'd', long)]
    delete: bool,

    /// Get information on the given channel
    #[arg(short = 'q', long)]
    query: bool,

    /// Print the config, then exit
    #[arg(short = 'X', long)]
    print_config: bool,

    /// Update the saved config from the given flags, then exit
    #[arg(short = 'U', long)]
    save_config: bool,

    /// Check if this client is too old for the server
    #[arg(short = 'O', long)]
    outdated: bool,

    /// Print the server version
    #[arg(short = 'Q', long)]
    server_version: bool,

    /// Determine if the client is blocked from the server
    #[arg(short = 'B', long)]
    blocked: bool,

    /// Wait until a channel has data before reading
    #[arg(short = 'b', long)]
    block: bool,

    /// Read the pipe without emptying it
    #[arg(short = 'p', long)]
    peek: bool,

    /// Read even on an upload/download client version mismatch
    #[arg(short = 'f', long)]
    force: bool,

    /// Overwrite the output file if it exists (requires --file)
    #[arg(short = 'y', long)]
    yes: bool,

    /// Pipe TTL in seconds; the server default is used if not passed
    #[arg(short = 't', long)]
    ttl: Option<u32>,

    /// Compression level to use; invalid in plaintext mode
    #[arg(short = 'Z', long, value_parser = clap::value_parser!(i32).range(1..=22))]
    zstd: Option<i32>,

    /// A file to use for input/output instead of stdin/stdout
    #[arg(short = 'F', long)]
    file: Option<PathBuf>,

    /// Print the total number of bytes sent/received
    #[arg(short = 'Y', long)]
    total: bool,

    /// Print a sha256 of the data sent/received
    #[arg(short = 'K', long)]
    checksum: bool,

    /// The pipe url to use
    #[arg(short = 'u', long)]
    url: Option<String>,

    /// The channel to use
    #[arg(short = 'c', long)]
    channel: Option<String>,

    /// The timeout for HTTP requests, in seconds
    #[arg(short = 'T', long)]
    timeout: Option<f64>,

    /// SSH ed25519 private key file used to sign admin requests
    #[arg(short = 'k', long)]
    key_file: Option<PathBuf>,

    /// Encrypt the data; uses RPIPE_PASSWORD or the saved password
    #[arg(short = 'e', long, conflicts_with = "plaintext")]
    encrypt: bool,

    /// Never encrypt, even when a password is available
    #[arg(long)]
    plaintext: bool,

    /// Do not require an https url
    #[arg(long)]
    no_require_ssl: bool,

    /// Increase log verbosity; pass more than once to increase it further
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    admin: Option<AdminCmd>,
}

/// Server admin commands; the server must trust the selected key file.
#[derive(Subcommand)]
enum AdminCmd {
    /// Check if the server is running in debug mode
    Debug,
    /// List all channels with stats
    Channels,
    /// Print various server stats
    Stats,
    /// Download the server log
    Log {
        /// Write the log here instead of stdout
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },
    /// Get or set the server log level
    LogLevel {
        /// The log level for the server to use
        level: Option<String>,
    },
    /// Lock the channel
    Lock,
    /// Unlock the channel
    Unlock,
    /// Block/unblock IPs, or list the blocked IPs
    Ip {
        #[arg(long, num_args = 1..)]
        block: Vec<String>,
        #[arg(long, num_args = 1..)]
        unblock: Vec<String>,
    },
    /// Block/unblock route patterns, or list the blocked routes
    Route {
        #[arg(long, num_args = 1..)]
        block: Vec<String>,
        #[arg(long, num_args = 1..)]
        unblock: Vec<String>,
    },
}

enum Mode {
    Send,
    Recv,
    Delete,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::new(level.to_string().to_lowercase()))
        .with_writer(std::io::stderr)
        .init();
}

fn overrides(cli: &Cli) -> CliOverrides {
    CliOverrides {
        ssl: if cli.no_require_ssl { Some(false) } else { None },
        url: cli.url.clone(),
        channel: cli.channel.clone(),
        timeout: cli.timeout,
        key_file: cli.key_file.clone(),
        encrypt: match (cli.encrypt, cli.plaintext) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
    }
}

fn pick_mode(cli: &Cli) -> Result<Mode, ClientError> {
    let picked = [cli.send, cli.recv, cli.delete]
        .iter()
        .filter(|flag| **flag)
        .count();
    if picked > 1 {
        return Err(ClientError::usage("Can only read, write, or delete at a time"));
    }
    Ok(if cli.send {
        Mode::Send
    } else if cli.recv {
        Mode::Recv
    } else if cli.delete {
        Mode::Delete
    } else if std::io::stdin().is_terminal() {
        Mode::Recv
    } else {
        Mode::Send
    })
}

fn check_flags(cli: &Cli, mode: &Mode) -> Result<(), ClientError> {
    if cli.ttl == Some(0) {
        return Err(ClientError::usage("--ttl must be positive"));
    }
    if cli.yes && cli.file.is_none() {
        return Err(ClientError::usage("--yes requires --file"));
    }
    match mode {
        Mode::Recv if cli.ttl.is_some() => Err(ClientError::usage(
            "--ttl may not be used when reading data from the pipe",
        )),
        Mode::Send if cli.block || cli.peek || cli.force => Err(ClientError::usage(
            "--block, --peek and --force may not be used when writing data to the pipe",
        )),
        Mode::Delete
            if cli.block || cli.peek || cli.force || cli.ttl.is_some() || cli.file.is_some() =>
        {
            Err(ClientError::usage(
                "transfer arguments may not be used when deleting a channel",
            ))
        }
        _ => Ok(()),
    }
}

async fn run(cli: Cli) -> Result<(), ClientError> {
    let overrides = overrides(&cli);
    let config_file = ConfigFile::new();
    tracing::info!("Config file: {}", config_file.path.display());

    if cli.print_config {
        println!("{}", config_file.print()?);
        return Ok(());
    }
    let saved = config_file.load()?;
    if cli.save_config {
        return config_file.save(&overrides, &saved);
    }

    if let Some(command) = cli.admin {
        return run_admin(command, &overrides, &saved).await;
    }

    if cli.server_version || cli.outdated || cli.blocked {
        let conf = config::resolve_url_only(&overrides, &saved)?;
        if cli.server_version {
            println!("rpipe_server {}", ops::server_version(&conf).await?);
        }
        if cli.outdated {
            let ok = ops::supported(&conf).await?;
            println!("{}SUPPORTED", if ok { "" } else { "NOT " });
        }
        if cli.blocked {
            let blocked = ops::blocked(&conf).await?;
            println!("{}BLOCKED", if blocked { "" } else { "NOT " });
        }
        return Ok(());
    }

    let conf = config::resolve(&overrides, &saved)?;
    if cli.query {
        let answer = ops::query(&conf).await?;
        println!("{}", ops::format_query(&conf.channel, &answer));
        return Ok(());
    }

    let mode = pick_mode(&cli)?;
    check_flags(&cli, &mode)?;
    if !matches!(mode, Mode::Delete) && conf.password.is_none() {
        tracing::warn!("Encryption disabled: plaintext mode");
        if cli.zstd.is_some() {
            return Err(ClientError::usage("Cannot compress data in plaintext mode"));
        }
    }

    match mode {
        Mode::Delete => ops::delete(&conf).await,
        Mode::Send => run_send(&cli, &conf).await,
        Mode::Recv => run_recv(&cli, &conf).await,
    }
}

async fn run_send(cli: &Cli, conf: &Config) -> Result<(), ClientError> {
    let (input, digest) = match &cli.file {
        Some(path) => {
            let file = std::fs::File::open(path)
                .map_err(|e| ClientError::usage(format!("Cannot open {}: {e}", path.display())))?;
            let (tap, digest) = TapReader::new(file);
            (Prefetcher::spawn(tap, MAX_SOFT_SIZE_MIN), digest)
        }
        None => {
            let (tap, digest) = TapReader::new(std::io::stdin());
            (Prefetcher::spawn(tap, MAX_SOFT_SIZE_MIN), digest)
        }
    };
    let level = cli.zstd.unwrap_or(rpipe_client::crypt::DEFAULT_ZSTD_LEVEL);
    let opened = Arc::new(AtomicBool::new(false));

    let outcome = tokio::select! {
        outcome = send::send(conf, cli.ttl, level, input, &opened) => outcome,
        _ = tokio::signal::ctrl_c() => Err(ClientError::Interrupted),
    };
    let total = match outcome {
        Ok(total) => total,
        Err(e) => {
            if opened.load(Ordering::Relaxed) {
                tracing::warn!("Send failed; clearing channel");
                let _ = ops::delete(conf).await;
            }
            return Err(e);
        }
    };
    report(cli, total, &digest);
    Ok(())
}

async fn run_recv(cli: &Cli, conf: &Config) -> Result<(), ClientError> {
    let out: Box<dyn Write + Send> = match &cli.file {
        Some(path) => {
            if path.exists() && !cli.yes {
                return Err(ClientError::usage(format!(
                    "Output path {} exists; pass --yes to overwrite",
                    path.display()
                )));
            }
            Box::new(std::fs::File::create(path).map_err(|e| {
                ClientError::usage(format!("Cannot create {}: {e}", path.display()))
            })?)
        }
        None => Box::new(std::io::stdout()),
    };
    let (mut out, digest) = TapWriter::new(out);
    let started = Arc::new(AtomicBool::new(false));

    let outcome = tokio::select! {
        outcome = recv::recv(conf, cli.block, cli.peek, cli.force, &mut out, &started) => outcome,
        _ = tokio::signal::ctrl_c() => Err(ClientError::Interrupted),
    };
    let total = match outcome {
        Ok(total) => total,
        Err(e) => {
            if started.load(Ordering::Relaxed) {
                tracing::warn!("Receive failed mid-stream; clearing channel");
                let _ = ops::delete(conf).await;
            }
            return Err(e);
        }
    };
    report(cli, total, &digest);
    Ok(())
}

fn report(cli: &Cli, total: u64, digest: &Arc<std::sync::Mutex<sha2::Sha256>>) {
    if cli.total {
        eprintln!("{total} bytes");
    }
    if cli.checksum {
        eprintln!("sha256: {}", hex_digest(digest));
    }
}

async fn run_admin(
    command: AdminCmd,
    overrides: &CliOverrides,
    saved: &Saved,
) -> Result<(), ClientError> {
    let conf = config::resolve_url_only(overrides, saved)?;
    let key_file = conf.key_file.clone().ok_or_else(|| {
        ClientError::usage("Admin mode requires a key file; pass --key-file or save one")
    })?;
    let admin = admin::AdminClient::new(&conf.url, &key_file)?;

    match command {
        AdminCmd::Debug => {
            let debug = admin.debug().await?;
            println!(
                "Server is running in {} mode",
                if debug { "DEBUG" } else { "RELEASE" }
            );
        }
        AdminCmd::Channels => {
            let channels = admin.channels().await?;
            if channels.is_empty() {
                println!("Server is empty");
            }
            for (name, info) in channels {
                println!(
                    "{name} : version={} packets={} size={} encrypted={} expire={}",
                    info.version, info.packets, info.size, info.encrypted, info.expire
                );
            }
        }
        AdminCmd::Stats => {
            let stats = admin.stats().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&stats).map_err(anyhow::Error::from)?
            );
        }
        AdminCmd::Log { output_file } => {
            let log = admin.log().await?;
            match output_file {
                Some(path) => std::fs::write(&path, log)
                    .map_err(|e| ClientError::usage(format!("Cannot write {}: {e}", path.display())))?,
                None => std::io::stdout()
                    .write_all(&log)
                    .map_err(anyhow::Error::from)?,
            }
        }
        AdminCmd::LogLevel { level } => {
            let (old, new) = admin.log_level(level.as_deref()).await?;
            println!("Log level was {old}, now {new}");
        }
        AdminCmd::Lock | AdminCmd::Unlock => {
            let channel = overrides
                .channel
                .clone()
                .or_else(|| saved.channel.clone())
                .ok_or_else(|| ClientError::usage("Missing: --channel"))?;
            let lock = matches!(command, AdminCmd::Lock);
            admin.lock(&channel, lock).await?;
            println!("{} {channel}", if lock { "Locked" } else { "Unlocked" });
        }
        AdminCmd::Ip { block, unblock } => {
            let banned = admin.ip(&block, &unblock).await?;
            println!("Blocked IPs: {banned:?}");
        }
        AdminCmd::Route { block, unblock } => {
            let banned = admin.route(&block, &unblock).await?;
            println!("Blocked routes: {banned:?}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = run(cli).await {
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }
}
