//! API route handlers.
//!
//! All handlers receive `SharedState` via Axum state extraction. Endpoints
//! other than health and the OAuth flow require a session cookie.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::session;
use crate::error::SyncError;
use crate::SharedState;

/// Entry point of the OAuth flow; returned to clients that need to log in.
pub const LOGIN_PATH: &str = "/auth/meli/login";

pub fn router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        .route("/", get(home))
        // ── Auth ─────────────────────────────────────────────────────────
        .route(LOGIN_PATH, get(meli_login))
        .route("/auth/meli/callback", get(meli_callback))
        .route("/auth/logout", get(logout))
        // ── Questions ────────────────────────────────────────────────────
        .route("/questions", get(question_list))
        .route("/questions/sync", post(question_sync))
        // ── Orders ───────────────────────────────────────────────────────
        .route("/orders", get(order_list))
        .route("/orders/sync", post(order_sync))
        // ── Notifications ────────────────────────────────────────────────
        .route("/notifications", get(notification_list))
        .route("/notifications/{id}/read", post(notification_read))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "meli-sync",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET / — Session user, or a pointer to the login flow.
async fn home(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, SyncError> {
    if let Some(user_id) = session::read_session(&state.crypto, &headers, Utc::now()) {
        if let Some(user) = state.accounts.get_user(user_id).await? {
            return Ok(Json(json!({
                "data": { "authenticated": true, "user": user }
            })));
        }
    }

    Ok(Json(json!({
        "data": { "authenticated": false, "login_url": LOGIN_PATH }
    })))
}

// =============================================================================
// Auth Endpoints
// =============================================================================

/// GET /auth/meli/login — Redirect to MercadoLibre consent.
async fn meli_login(State(state): State<SharedState>) -> Result<Response, SyncError> {
    let nonce = session::new_state_nonce();
    let signed_state = session::sign_login_state(&state.crypto, &nonce, Utc::now())?;
    let url = state.accounts.login_url(&signed_state);
    Ok((
        [(
            header::SET_COOKIE,
            session::state_cookie(&nonce, !state.config.debug),
        )],
        Redirect::temporary(&url),
    )
        .into_response())
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /auth/meli/callback — Complete the authorization-code flow.
async fn meli_callback(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(q): Query<CallbackQuery>,
) -> Result<Response, SyncError> {
    if let Some(error) = q.error {
        warn!("MercadoLibre authorization denied: {error}");
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "authorization_failed",
            format!("Authorization failed: {error}"),
            None,
        ));
    }

    let Some(code) = q.code.filter(|c| !c.is_empty()) else {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "missing_code",
            "No authorization code received",
            None,
        ));
    };

    let signed = q.state.as_deref().ok_or(SyncError::InvalidState)?;
    session::verify_login_state(&state.crypto, signed, &headers, Utc::now())?;

    let login = match state.accounts.handle_callback(&code).await {
        Ok(login) => login,
        Err(SyncError::AuthExchange(e)) => {
            warn!("Authorization code exchange failed: {e}");
            return Ok(error_response(
                StatusCode::BAD_GATEWAY,
                "auth_exchange_failed",
                "MercadoLibre rejected the authorization, please re-authorize",
                Some(LOGIN_PATH),
            ));
        }
        Err(e) => return Err(e),
    };

    let cookie = session::session_cookie(
        &session::issue_session(&state.crypto, login.meli_user.id, Utc::now())?,
        !state.config.debug,
    );

    Ok((
        AppendHeaders([
            (header::SET_COOKIE, cookie),
            (header::SET_COOKIE, session::clear_state_cookie()),
        ]),
        Redirect::to(&state.config.landing_url),
    )
        .into_response())
}

/// GET /auth/logout — Drop the session cookie.
async fn logout() -> Response {
    (
        [(header::SET_COOKIE, session::clear_session_cookie())],
        Redirect::to("/"),
    )
        .into_response()
}

/// Extract the session user for protected endpoints.
fn require_user(state: &SharedState, headers: &HeaderMap) -> Result<i64, SyncError> {
    session::read_session(&state.crypto, headers, Utc::now()).ok_or(SyncError::Unauthorized)
}

// =============================================================================
// Question Endpoints
// =============================================================================

/// GET /questions — Stored questions, newest first.
async fn question_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, SyncError> {
    let user_id = require_user(&state, &headers)?;
    let questions = state.questions.get_by_user(user_id).await?;
    Ok(Json(json!({ "data": questions })))
}

/// POST /questions/sync — Pull questions from MercadoLibre now.
async fn question_sync(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, SyncError> {
    let user_id = require_user(&state, &headers)?;
    match state.sync.sync_questions(user_id).await {
        Ok(report) => Ok(Json(json!({ "data": report })).into_response()),
        Err(e) => sync_failure(user_id, e),
    }
}

// =============================================================================
// Order Endpoints
// =============================================================================

/// GET /orders — Stored orders, newest first.
async fn order_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, SyncError> {
    let user_id = require_user(&state, &headers)?;
    let orders = state.orders.get_by_user(user_id).await?;
    Ok(Json(json!({ "data": orders })))
}

/// POST /orders/sync — Pull orders from MercadoLibre now.
async fn order_sync(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, SyncError> {
    let user_id = require_user(&state, &headers)?;
    match state.sync.sync_orders(user_id).await {
        Ok(report) => Ok(Json(json!({ "data": report })).into_response()),
        Err(e) => sync_failure(user_id, e),
    }
}

/// Turn authorization failures into a prompt to log in again.
fn sync_failure(user_id: i64, err: SyncError) -> Result<Response, SyncError> {
    let code = match &err {
        SyncError::NotFound(_) => "authorization_required",
        SyncError::AuthExchange(_) => "reauthorization_required",
        _ => return Err(err),
    };

    info!("Sync for user {user_id} needs authorization: {err}");
    Ok(error_response(
        StatusCode::UNAUTHORIZED,
        code,
        err.to_string(),
        Some(LOGIN_PATH),
    ))
}

// =============================================================================
// Notification Endpoints
// =============================================================================

#[derive(Deserialize)]
struct NotificationQuery {
    #[serde(default)]
    unread_only: bool,
}

/// GET /notifications — Notifications, newest first.
async fn notification_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(q): Query<NotificationQuery>,
) -> Result<Json<serde_json::Value>, SyncError> {
    let user_id = require_user(&state, &headers)?;
    let notifications = state.notifications.list(user_id, q.unread_only).await?;
    Ok(Json(json!({ "data": notifications })))
}

/// POST /notifications/:id/read
async fn notification_read(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, SyncError> {
    let user_id = require_user(&state, &headers)?;
    let notification = state.notifications.mark_as_read(user_id, id).await?;
    Ok(Json(json!({ "data": notification })))
}

fn error_response(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
    login_url: Option<&str>,
) -> Response {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(url) = login_url {
        error["login_url"] = json!(url);
    }
    (status, Json(json!({ "error": error }))).into_response()
}
