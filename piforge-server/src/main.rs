use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{Router, http::StatusCode, middleware, routing::any};
use clap::Parser;
use confique::Config;
use piforge_proto::ServiceStatus;
use tokio::{net::TcpListener, signal, sync::RwLock};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{counters::RequestCounters, registry::SocketRegistry};

mod counters;
mod registry;
mod route;
mod ws;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "piforge-server", about = "Quantum Pi Forge status server")]
struct Cli {
    #[arg(short, long, value_name = "FILE", help = "Path to config file")]
    config_path: Option<String>,
}

#[derive(Config, Debug)]
struct Conf {
    /// Port to listen on
    #[config(env = "PORT", default = 8080)]
    port: u16,

    /// Bind address
    #[config(env = "PIFORGE_ADDRESS", default = "0.0.0.0")]
    address: IpAddr,

    /// HTML page served for every path without a route. Defaults to the page
    /// shipped with this crate, wherever the binary is started from.
    #[config(env = "PIFORGE_DASHBOARD")]
    dashboard_path: Option<PathBuf>,

    /// Interval between two status broadcasts, in milliseconds
    #[config(env = "PIFORGE_BROADCAST_INTERVAL_MS", default = 5000)]
    broadcast_interval_ms: u64,

    /// Time allowed for draining on shutdown before exiting with failure
    #[config(env = "PIFORGE_SHUTDOWN_TIMEOUT_SECS", default = 10)]
    shutdown_timeout_secs: u64,

    #[config(env = "PIFORGE_SERVICE", default = "Quantum Pi Forge")]
    service: String,

    #[config(env = "PIFORGE_ENGINE", default = "Gargoura Active")]
    engine: String,

    #[config(env = "PIFORGE_NETWORK", default = "Pi Mainnet")]
    network: String,
}

fn default_dashboard_path() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static/index.html"))
}

fn config(path: &str) -> anyhow::Result<Conf> {
    Conf::builder()
        .env()
        .file(path)
        .load()
        .map_err(|e| e.into())
}

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    pub started_at: Instant,
    pub identity: Arc<ServiceStatus>,
    pub counters: Arc<RequestCounters>,
    pub sockets: Arc<RwLock<SocketRegistry>>,
    pub dashboard_path: Arc<PathBuf>,
    pub ws_graceful_shutdown: WebsocketGraceful,
}

#[derive(Clone, Debug)]
pub(crate) struct WebsocketGraceful {
    pub token: CancellationToken,
    pub tracker: TaskTracker,
}

impl AppState {
    pub fn new(identity: ServiceStatus, dashboard_path: impl Into<PathBuf>) -> Self {
        AppState {
            started_at: Instant::now(),
            identity: Arc::new(identity),
            counters: Arc::new(RequestCounters::new()),
            sockets: Arc::new(RwLock::new(SocketRegistry::new())),
            dashboard_path: Arc::new(dashboard_path.into()),
            ws_graceful_shutdown: WebsocketGraceful {
                token: CancellationToken::new(),
                tracker: TaskTracker::new(),
            },
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .route(route::PATH_STATUS, any(route::status))
        .route(route::PATH_HEALTHZ, any(route::health))
        .route(route::PATH_METRICS, any(route::metrics))
        .fallback(route::dashboard)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            route::count_requests,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ws::intercept_upgrade,
        ))
        .layer((
            TraceLayer::new_for_http(),
            // Prevent requests to hang forever
            timeout_layer(REQUEST_TIMEOUT),
        ))
        .with_state(state)
}

fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    install_panic_hook();

    let cli = Cli::parse();
    trace!("using command line arguments {:?}", cli);

    let config = config(&cli.config_path.unwrap_or("config.toml".to_owned()))?;
    trace!("using config {:?}", config);

    let addr = SocketAddr::from((config.address, config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {addr}");

    let identity = ServiceStatus::online(config.service, config.engine, config.network);
    info!(
        service = %identity.service,
        engine = %identity.engine,
        network = %identity.network,
        "status server ready"
    );

    let dashboard_path = config
        .dashboard_path
        .unwrap_or_else(default_dashboard_path);
    info!(path = %dashboard_path.display(), "serving dashboard");

    let state = AppState::new(identity, dashboard_path);
    let token = state.ws_graceful_shutdown.token.clone();
    let tracker = state.ws_graceful_shutdown.tracker.clone();

    tracker.spawn(ws::broadcast::run(
        state.clone(),
        Duration::from_millis(config.broadcast_interval_ms),
    ));

    let serve = async {
        axum::serve(listener, app(state))
            .with_graceful_shutdown(shutdown_signal(token.clone()))
            .await?;
        anyhow::Ok(())
    };

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    drain_or_force(serve, &tracker, &token, shutdown_timeout).await
}

/// Run `serve` to completion, then wait for every tracked task. Once `token`
/// is cancelled the whole drain has `timeout` to finish, otherwise the exit
/// code reports a forced shutdown.
async fn drain_or_force(
    serve: impl Future<Output = anyhow::Result<()>>,
    tracker: &TaskTracker,
    token: &CancellationToken,
    timeout: Duration,
) -> anyhow::Result<ExitCode> {
    let drain = async {
        serve.await?;

        tracker.close();
        trace!("waiting {} websocket task shutdown", tracker.len());
        tracker.wait().await;

        anyhow::Ok(())
    };

    let deadline = async {
        token.cancelled().await;
        tokio::time::sleep(timeout).await;
    };

    tokio::select! {
        res = drain => {
            res?;
            info!("server closed");
            Ok(ExitCode::SUCCESS)
        }
        _ = deadline => {
            error!(timeout_secs = timeout.as_secs(), "forced shutdown after timeout");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                #[cfg(debug_assertions)]
                let default_log_level = format!(
                    "{}=debug,tower_http=debug,axum=trace",
                    env!("CARGO_CRATE_NAME")
                )
                .into();

                #[cfg(not(debug_assertions))]
                let default_log_level = format!(
                    "{}=info,tower_http=info,axum=info",
                    env!("CARGO_CRATE_NAME")
                )
                .into();

                default_log_level
            }),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();
}

/// A panic anywhere, including inside a spawned task, takes the process down.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        error!(%info, "uncaught panic");
        std::process::exit(1);
    }));
}

async fn shutdown_signal(ws_token: CancellationToken) {
    let _ws_shutdown_guard = ws_token.drop_guard();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!(signal, "received shutdown signal, draining");
}
