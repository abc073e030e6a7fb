/**
 * CONSOLE WEB - Pages statiques au-dessus de l'API de consultation
 *
 * - GET /login : formulaire qui poste les identifiants en JSON sur POST /login
 * - GET / : console (liste des hôtes rafraîchie toutes les 30s via /clients),
 *   redirige vers /login sans session valide
 */

use crate::http::session_token;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;

const TPL_LOGIN: &str = include_str!("web/login.html");
const TPL_DASHBOARD: &str = include_str!("web/dashboard.html");

// GET /login
pub async fn login_page() -> Html<&'static str> {
    Html(TPL_LOGIN)
}

// GET /
pub async fn dashboard(State(app): State<AppState>, jar: CookieJar, headers: HeaderMap) -> Response {
    let token = session_token(&jar, &headers);
    match app.auth.session(token.as_deref()) {
        Ok(_) => Html(TPL_DASHBOARD).into_response(),
        Err(_) => Redirect::to("/login").into_response(),
    }
}
