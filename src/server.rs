//! HTTP server bootstrap for Gatewatch.
//!
//! This module wires together:
//! - configuration
//! - the in-memory stores and core services
//! - the Solana event listener
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::AllowOrigin;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::domain::{validate_operation_digests, DomainInfo};
use crate::infra::{
    shutdown_signal, spawn_until_shutdown, BatchPlanner, ChallengeCoordinator, CidValidator,
    CiphertextStore, InMemoryCiphertextStore, InMemoryJobQueue, InMemoryPendingStore,
    InMemoryRegistrationLog, JobQueue, PendingStore, RegistrationLog, ShutdownCoordinator,
};
use crate::ledger::{validate_event_table, ConnectionConfig, EventListener, RpcLedgerReader};

/// Chain identity bound into registration receipts.
const CHAIN_ID: &str = "devnet";
/// Active compute-protection key and its epoch.
const CPK_ID: &str = "v1-2025";
const KEY_EPOCH: u64 = 7;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Seconds a staged ciphertext may wait for on-chain confirmation.
    pub pending_ttl_secs: i64,
    /// Interval between expiry sweeps.
    pub pending_sweep_secs: u64,
    /// Capacity of the pending and confirmed ciphertext stores.
    pub store_capacity: usize,
    /// Maximum accepted ciphertext blob size in bytes.
    pub max_ciphertext_bytes: usize,
    /// Start the event listener at boot.
    pub listener_autostart: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = std::env::var("GATEWATCH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("GATEWATCH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {host}:{port}: {e}"))?;

        let pending_ttl_secs: i64 = std::env::var("PENDING_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        let pending_sweep_secs: u64 = std::env::var("PENDING_SWEEP_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let store_capacity: usize = std::env::var("STORE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000);

        let max_ciphertext_bytes: usize = std::env::var("MAX_CIPHERTEXT_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1_048_576);

        let listener_autostart = std::env::var("LISTENER_AUTOSTART")
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off"))
            .unwrap_or(true);

        Ok(Self {
            listen_addr,
            pending_ttl_secs,
            pending_sweep_secs,
            store_capacity,
            max_ciphertext_bytes,
            listener_autostart,
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pending: Arc<dyn PendingStore>,
    pub ciphertexts: Arc<dyn CiphertextStore>,
    pub registrations: Arc<dyn RegistrationLog>,
    pub queue: Arc<dyn JobQueue>,
    pub validator: Arc<CidValidator>,
    pub planner: Arc<BatchPlanner>,
    pub challenges: Arc<ChallengeCoordinator>,
    pub listener: EventListener,
}

impl AppState {
    /// Domain binding advertised in receipts and the status endpoint.
    pub fn domain_info(&self) -> DomainInfo {
        DomainInfo::new(
            CHAIN_ID,
            self.listener.connection().program_id.to_string(),
            CPK_ID,
            KEY_EPOCH,
        )
    }
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Gatewatch v{}", env!("CARGO_PKG_VERSION"));

    // The event table and operation digests are compile-time constants;
    // verify their coherence once before serving anything derived from them.
    validate_event_table().map_err(|e| anyhow::anyhow!("event table invalid: {e}"))?;
    validate_operation_digests().map_err(|e| anyhow::anyhow!("operation table invalid: {e}"))?;

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Pending TTL: {}s", config.pending_ttl_secs);
    info!("  Store capacity: {}", config.store_capacity);

    let connection = ConnectionConfig::from_env()?;
    info!("Ledger connection:");
    info!("  RPC URL: {}", connection.rpc_url);
    info!("  WS URL: {}", connection.ws_url);
    info!("  Program: {}", connection.program_id);

    // Stores and services
    let pending: Arc<dyn PendingStore> = Arc::new(InMemoryPendingStore::new(
        config.store_capacity,
        config.max_ciphertext_bytes,
    ));
    let ciphertexts: Arc<dyn CiphertextStore> =
        Arc::new(InMemoryCiphertextStore::new(config.store_capacity));
    let registrations: Arc<dyn RegistrationLog> = Arc::new(InMemoryRegistrationLog::new());
    let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
    let validator = Arc::new(CidValidator::new(ciphertexts.clone()));
    let planner = Arc::new(BatchPlanner::new(queue.clone()));
    let challenges = Arc::new(ChallengeCoordinator::with_default_verifiers());

    let reader = Arc::new(RpcLedgerReader::new(&connection));
    let listener = EventListener::new(
        connection,
        reader,
        pending.clone(),
        ciphertexts.clone(),
        registrations.clone(),
        queue.clone(),
        validator.clone(),
    );

    let state = AppState {
        config: config.clone(),
        pending,
        ciphertexts,
        registrations,
        queue,
        validator,
        planner,
        challenges,
        listener,
    };

    // Background expiry sweeps
    let shutdown = ShutdownCoordinator::new();
    spawn_sweeper(&state, shutdown.signal());

    if config.listener_autostart {
        state.listener.start().await;
        info!("Event listener started");
    } else {
        info!("Event listener autostart disabled (LISTENER_AUTOSTART=0)");
    }

    let app = build_router()?.with_state(state.clone());

    info!("Starting HTTP server on {}", config.listen_addr);
    let tcp = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("Gatewatch is ready to accept connections");
    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    state.listener.stop().await;
    shutdown.shutdown();

    Ok(())
}

/// Periodically expire staged ciphertexts that never confirmed on-chain.
fn spawn_sweeper(state: &AppState, shutdown: crate::infra::ShutdownSignal) {
    let pending = state.pending.clone();
    let ciphertexts = state.ciphertexts.clone();
    let ttl = state.config.pending_ttl_secs;
    let period = Duration::from_secs(state.config.pending_sweep_secs.max(1));

    spawn_until_shutdown(shutdown, async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match pending.sweep_expired().await {
                Ok(0) => {}
                Ok(n) => info!(swept = n, "expired staged ciphertexts"),
                Err(e) => warn!(error = %e, "pending sweep failed"),
            }
            match ciphertexts.expire_stale_pending(ttl).await {
                Ok(0) => {}
                Ok(n) => info!(expired = n, "stale pending-verification records dropped"),
                Err(e) => warn!(error = %e, "verification expiry sweep failed"),
            }
        }
    });
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

pub fn build_router() -> anyhow::Result<Router<AppState>> {
    let mut router = Router::new()
        .nest("/api", crate::api::router())
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors_layer_from_env()? {
        router = router.layer(cors_layer);
    }

    Ok(router)
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE]),
    ))
}

/// Health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "gatewatch",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, (axum::http::StatusCode, String)> {
    // Stores are in-process; readiness means they answer and the listener
    // state is reportable.
    let stores_ok = state.queue.stats().await.is_ok()
        && state.ciphertexts.stats().await.is_ok()
        && state.pending.stats().await.is_ok();

    if stores_ok {
        Ok(axum::Json(serde_json::json!({
            "status": "ready",
            "listener_running": state.listener.is_running(),
        })))
    } else {
        Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "stores unavailable".to_string(),
        ))
    }
}
