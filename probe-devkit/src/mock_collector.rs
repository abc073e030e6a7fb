/*!
Collecteur HTTP factice pour tester l'agent sans lancer le kernel

Écoute sur un port éphémère de 127.0.0.1, enregistre chaque POST `/report`
et répond avec le code HTTP programmé par le test.
*/

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ReceivedReport {
    pub body: Value,
    pub client_secret: Option<String>,
}

#[derive(Clone, Default)]
struct Shared {
    reports: Arc<Mutex<Vec<ReceivedReport>>>,
    status: Arc<Mutex<u16>>,
}

pub struct MockCollector {
    addr: SocketAddr,
    shared: Shared,
    server: JoinHandle<()>,
}

impl MockCollector {
    /// Démarre le faux collecteur ; il répond 200 tant qu'on ne change pas le code.
    pub async fn start() -> Result<Self> {
        let shared = Shared {
            reports: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(Mutex::new(200)),
        };

        let app = Router::new()
            .route("/report", post(record_report))
            .with_state(shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("[mock-collector] server error: {e}");
            }
        });

        tracing::info!("[mock-collector] listening on {addr}");
        Ok(Self { addr, shared, server })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_status(&self, status: u16) {
        *self.shared.status.lock() = status;
    }

    pub fn reports(&self) -> Vec<ReceivedReport> {
        self.shared.reports.lock().clone()
    }

    /// Attend au moins `count` rapports, false si le délai expire.
    pub async fn wait_for_reports(&self, count: usize, timeout_ms: u64) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if self.shared.reports.lock().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn record_report(
    State(shared): State<Shared>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let client_secret = headers
        .get("x-client-secret")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    shared.reports.lock().push(ReceivedReport { body, client_secret });

    let code = StatusCode::from_u16(*shared.status.lock()).unwrap_or(StatusCode::OK);
    if code.is_success() {
        (code, Json(serde_json::json!({ "status": "success" })))
    } else {
        (code, Json(serde_json::json!({ "status": "error", "message": "scripted failure" })))
    }
}
