use clap::Parser;
use rpipe_server::{logging, serve, ServeConfig};
use std::path::PathBuf;

/// The rpipe channel broker.
#[derive(Parser)]
#[command(name = "rpipe_server", version)]
struct Args {
    /// The port the server listens on
    port: u16,

    /// The host the server binds to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Save state here on shutdown and load it on startup
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Persist the blocklist here on shutdown
    #[arg(long)]
    blocklist_file: Option<PathBuf>,

    /// SSH ed25519 public keys to accept for admin access
    #[arg(long = "key-files", num_args = 0..)]
    key_files: Vec<PathBuf>,

    /// Log to this file as well as stdout; served by the admin log command
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Optional favicon to serve at /favicon.ico
    #[arg(long)]
    favicon: Option<PathBuf>,

    /// Run the server in debug mode
    #[arg(long)]
    debug: bool,

    /// Increase log verbosity; pass more than once to increase it further
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the minimum supported client version, then exit
    #[arg(long)]
    min_client_version: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.min_client_version {
        println!("rpipe>={}", rpipe_server::MIN_VERSION_STR);
        return Ok(());
    }
    let (log, _log_guard) = logging::init(args.verbose, args.log_file.as_deref())?;
    serve(
        ServeConfig {
            host: args.host,
            port: args.port,
            state_file: args.state_file,
            blocklist_file: args.blocklist_file,
            key_files: args.key_files,
            log_file: args.log_file,
            favicon: args.favicon,
            debug: args.debug,
        },
        log,
    )
    .await
}
