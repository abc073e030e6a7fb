/**
 * PROBE KERNEL - Point d'entrée du collecteur de métriques
 *
 * RÔLE : Orchestration des modules : config, store, sink, auth, HTTP.
 * Bootstrap du serveur avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : agents → POST /report → ClientStore (mémoire) + SnapshotSink (disque)
 *                admin  → /login puis /clients, /client/{ip} (vivacité calculée à la lecture)
 */

mod auth;
mod config;
mod error;
mod health;
mod http;
mod liveness;
mod models;
mod sink;
mod state;
mod store;
mod web;

use crate::auth::{Auth, InMemoryCredentials};
use crate::config::load_config;
use crate::health::HealthTracker;
use crate::sink::SnapshotSink;
use crate::state::AppState;
use crate::store::ClientStore;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("probe_kernel=info")))
        .init();

    let cfg = load_config().await;
    info!(
        "[kernel] config: liveness={}s history={} log_dir={}",
        cfg.liveness_threshold_secs, cfg.history_capacity, cfg.log_dir
    );
    if cfg.ingest_token.is_none() {
        warn!("[kernel] ingest_token non configuré : /report ouvert à tous");
    }

    let credentials = InMemoryCredentials::from_config(&cfg.admin)
        .context("invalid admin credential in config")?;

    let (sink, sink_writer) = SnapshotSink::spawn(&cfg.log_dir, cfg.sink_queue_capacity);

    let listen = cfg.listen.clone();
    let app_state = AppState {
        store: Arc::new(ClientStore::new(cfg.history_capacity)),
        sink,
        auth: Auth::new(Arc::new(credentials)),
        cfg: Arc::new(cfg),
        health: HealthTracker::new(),
    };

    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("cannot bind {listen}"))?;
    info!("[kernel] listening on http://{listen}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("[kernel] shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    // le router est droppé : plus aucun émetteur, le writer vide sa file et s'arrête
    let stats = sink_writer.join().await;
    info!(
        "[kernel] sink closed: written={} dropped={} failed={}",
        stats.written, stats.dropped, stats.failed
    );
    Ok(())
}
