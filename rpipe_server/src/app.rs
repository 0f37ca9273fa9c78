use crate::admin::Admin;
use crate::blocked::Blocked;
use crate::logging::LogControl;
use crate::reply::{json, plaintext};
use crate::state::State;
use crate::{admin, channel};
use axum::extract::{ConnectInfo, DefaultBodyLimit, Request, State as AxumState};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use rpipe_wire::{codes, Supported, MAX_SIZE_HARD};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

const HELP_TEXT: &str = "Welcome to the web UI of rpipe. \
To interact with a given channel, use the path /c/<channel>. \
To read a message from a given channel, use a GET request. \
To write a message to a given channel, use PUT and POST requests. \
To clear a channel, use a DELETE request. \
Note: using the web version bypasses version consistency checks \
and may result in safe but unexpected behavior; if possible use \
the rpipe client CLI instead.";

/// Everything the handlers share, injected through axum state.
pub struct AppState {
    pub state: State,
    pub blocked: Blocked,
    pub admin: Admin,
    pub log: LogControl,
    pub log_file: Option<PathBuf>,
    pub favicon: Option<PathBuf>,
}

/// Source address of the current request, resolved by the block guard and
/// stashed in request extensions for the handlers.
#[derive(Clone, Debug)]
pub struct ClientAddr(pub String);

/// Outermost middleware: resolve the caller's IP, consult the blocklist,
/// and reject with 401 before any route logic runs.
pub(crate) async fn block_guard(
    AxumState(app): AxumState<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_owned())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_owned());
    if app.blocked.check(&ip, req.uri().path()) {
        return plaintext("", codes::BLOCKED);
    }
    req.extensions_mut().insert(ClientAddr(ip));
    next.run(req).await
}

async fn help() -> Response {
    crate::info!("Request for /help");
    plaintext(HELP_TEXT, 200)
}

async fn show_version() -> Response {
    crate::info!("Request for /version");
    plaintext(env!("CARGO_PKG_VERSION"), 200)
}

async fn supported() -> Response {
    json(&Supported {
        min: crate::min_version(),
        banned: vec![],
    })
}

async fn favicon(AxumState(app): AxumState<Arc<AppState>>) -> Response {
    match app.favicon.as_ref().and_then(|p| std::fs::read(p).ok()) {
        Some(raw) => crate::reply::octet(raw, 200, &[]),
        None => plaintext("", 404),
    }
}

async fn not_found(req: Request) -> Response {
    crate::info!("404: {} {}", req.method(), req.uri().path());
    plaintext(format!("Unknown path: {}", req.uri().path()), 404)
}

pub fn router(app: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(help))
        .route("/help", get(help))
        .route("/version", get(show_version))
        .route("/supported", get(supported))
        .route("/favicon.ico", get(favicon))
        .route(
            "/c/{channel}",
            get(channel::read)
                .post(channel::open)
                .put(channel::append)
                .delete(channel::delete),
        )
        .route("/q/{channel}", get(channel::query))
        .route("/admin/uid", get(admin::uids))
        .route("/admin/{command}", post(admin::dispatch))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(app.clone(), block_guard))
        .layer(DefaultBodyLimit::max(MAX_SIZE_HARD + 0x1000))
        .with_state(app)
}

/// What `serve` needs to bring the broker up.
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub state_file: Option<PathBuf>,
    pub blocklist_file: Option<PathBuf>,
    pub key_files: Vec<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub favicon: Option<PathBuf>,
    pub debug: bool,
}

/// Bring the server up, run until interrupted, then save state exactly
/// once with no other lock holder possible.
pub async fn serve(config: ServeConfig, log: LogControl) -> crate::Result<()> {
    crate::info!("Initializing server");
    let state = State::new();
    {
        let mut unlocked = state
            .lock()
            .map_err(|_| crate::anyhow!("state unavailable at startup"))?;
        if config.debug {
            unlocked.enable_debug();
        }
        if let Some(file) = &config.state_file {
            unlocked.load(file)?;
        }
    }
    let blocked = Blocked::load(config.blocklist_file.clone())?;
    let mut admin = Admin::new();
    admin.load_keys(&config.key_files);

    let app = Arc::new(AppState {
        state,
        blocked,
        admin,
        log,
        log_file: config.log_file.clone(),
        favicon: config.favicon.clone(),
    });

    crate::info!("Starting prune task");
    let _prune = crate::prune::spawn(app.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    crate::info!("Serving on {addr}");
    axum::serve(
        listener,
        router(app.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // All connections have drained; raise the flag and persist.
    crate::warn!("Server shutdown initiated");
    {
        let mut unlocked = app.state.lock_for_shutdown();
        unlocked.shutdown = true;
        if let Some(file) = &config.state_file {
            unlocked.save(file)?;
        }
    }
    app.blocked.save()?;
    crate::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                crate::error!("Could not install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
