/**
 * API REST PROBE - Ingestion des snapshots + surface de consultation
 *
 * FONCTIONNEMENT :
 * - POST /report : ingestion (jeton partagé X-Client-Secret si configuré)
 * - POST /login : ouvre une session admin (cookie `probe_session` ou Bearer)
 * - /clients, /client/{ip}, /client/{ip}/history, /system/health, /logout,
 *   /change-password : réservées aux sessions valides
 * - /health : toujours accessible
 * - GET / et GET /login : console HTML (voir web.rs)
 *
 * SÉCURITÉ :
 * - Middleware de session sur toutes les routes de consultation
 * - Toute erreur terminale rendue en `{status:"error", message}`
 */

use crate::auth::Session;
use crate::error::ApiError;
use crate::health::KernelHealth;
use crate::liveness::{self, Liveness};
use crate::models::MetricSnapshot;
use crate::state::AppState;
use crate::store::HostEntry;
use crate::web;
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub const SESSION_COOKIE: &str = "probe_session";
const CLIENT_SECRET_HEADER: &str = "x-client-secret";

#[derive(Serialize)]
struct ClientView {
    ip: String,
    hostname: String,
    system: String,
    last_seen: String, // RFC3339
    seen_seconds_ago: i64,
    status: Liveness,
}

fn to_view(entry: &HostEntry, now: OffsetDateTime, threshold: std::time::Duration) -> ClientView {
    ClientView {
        ip: entry.ip.clone(),
        hostname: entry.latest.host.hostname.clone(),
        system: entry.latest.host.system.clone(),
        last_seen: entry.last_seen.format(&Rfc3339).unwrap_or_default(),
        seen_seconds_ago: (now - entry.last_seen).whole_seconds().max(0),
        status: liveness::status(entry.last_seen, now, threshold),
    }
}

#[derive(Clone)]
struct CurrentSession {
    token: String,
    session: Session,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    old_password: String,
    new_password: String,
    confirm_password: String,
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub(crate) fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());
    bearer.or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
}

async fn require_session(
    State(app): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(&jar, req.headers());
    let session = app.auth.session(token.as_deref()).map_err(|e| {
        warn!(path = %req.uri().path(), "[http] rejected: {e}");
        e
    })?;

    if let Some(token) = token {
        req.extensions_mut().insert(CurrentSession { token, session });
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    let protected = Router::new()
        .route("/clients", get(list_clients))
        .route("/client/{ip}", get(get_client))
        .route("/client/{ip}/history", get(get_client_history))
        .route("/system/health", get(get_system_health))
        .route("/logout", post(logout))
        .route("/change-password", post(change_password))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), require_session));

    Router::new()
        .route("/", get(web::dashboard))
        .route("/health", get(|| async { "ok" }))
        .route("/login", get(web::login_page).post(login))
        .route("/report", post(report))
        .merge(protected)
        .with_state(app_state)
}

// POST /report (ingestion)
async fn report(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if let Some(expected) = app.cfg.ingest_token.as_deref() {
        let given = headers.get(CLIENT_SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected) {
            warn!("[ingest] rejected: bad or missing client secret");
            return Err(ApiError::BadIngestToken);
        }
    }

    let snapshot = MetricSnapshot::from_wire(&body).map_err(|e| {
        warn!("[ingest] rejected snapshot: {e}");
        e
    })?;

    let now = OffsetDateTime::now_utc();
    let ip = snapshot.ip().to_string();
    let snapshot = Arc::new(snapshot);
    app.store.upsert(&ip, snapshot.clone(), now);
    app.sink.append(snapshot, now);

    debug!(ip = %ip, "[ingest] snapshot accepted");
    Ok(Json(json!({ "status": "success" })))
}

// POST /login
async fn login(
    State(app): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let req: LoginRequest = parse_body(&body)?;
    let token = app.auth.login(&req.username, &req.password)?;
    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict);
    Ok((jar.add(cookie), Json(json!({ "status": "success", "token": token }))))
}

// POST /logout
async fn logout(
    State(app): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    app.auth.logout(&current.token);
    let open_for = OffsetDateTime::now_utc() - current.session.created_at;
    debug!(user = %current.session.username, seconds = open_for.whole_seconds(), "[auth] logout");
    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/"));
    (jar, Json(json!({ "status": "success" })))
}

// POST /change-password
async fn change_password(
    State(app): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: ChangePasswordRequest = parse_body(&body)?;
    app.auth.change_password(
        &current.session.username,
        &req.old_password,
        &req.new_password,
        &req.confirm_password,
    )?;
    Ok(Json(json!({ "status": "success" })))
}

// GET /clients (liste)
async fn list_clients(State(app): State<AppState>) -> Json<Vec<ClientView>> {
    let now = OffsetDateTime::now_utc();
    let threshold = app.cfg.liveness_threshold();
    let list = app.store.list().iter().map(|e| to_view(e, now, threshold)).collect();
    Json(list)
}

// GET /client/{ip} (dernier snapshot)
async fn get_client(
    State(app): State<AppState>,
    Path(ip): Path<String>,
) -> Result<Json<MetricSnapshot>, ApiError> {
    let latest = app.store.latest(&ip).ok_or_else(|| ApiError::NotFound(ip))?;
    Ok(Json(MetricSnapshot::clone(&latest)))
}

// GET /client/{ip}/history (historique retenu, plus ancien en premier)
async fn get_client_history(
    State(app): State<AppState>,
    Path(ip): Path<String>,
) -> Result<Json<Vec<MetricSnapshot>>, ApiError> {
    let history = app.store.history(&ip).ok_or_else(|| ApiError::NotFound(ip))?;
    Ok(Json(history.iter().map(|s| MetricSnapshot::clone(s)).collect()))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health(
        &app.store,
        app.sink.stats(),
        app.auth.active_sessions(),
        app.cfg.liveness_threshold(),
    ))
}
