// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Public (used by the mini-app client):
//   GET  /                  banner
//   GET  /health            plain "OK"
//   GET  /api/v1/health     JSON health
//   POST /auth              register {id, username}
//   POST /signal            {userId, coin, timeframe} -> one of four outcomes
//   POST /confirm-payment   {userId} -> subscription toggle
//
// Operator (Bearer token, see `auth`):
//   GET  /api/v1/users/:id
//   POST /api/v1/users/:id/subscription
//   GET  /api/v1/signals/recent
//   GET  /api/v1/policy
//   POST /api/v1/policy
//
// `/confirm-payment` trusts the caller; there is no payment proof behind it.
// Setting `require_operator_activation` closes it in favour of the operator
// endpoint.
//
// CORS is permissive because the client is served from another origin.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::access::UserAccount;
use crate::api::auth::OperatorAuth;
use crate::app_state::AppState;
use crate::runtime_config::SignalPolicy;
use crate::service::{FailureKind, RawSignalRequest, SignalOutcome, SignalRequest};
use crate::signals::SignalRecord;
use crate::types::UserId;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/", get(banner))
        .route("/health", get(health_plain))
        .route("/api/v1/health", get(health))
        .route("/auth", post(register))
        .route("/signal", post(signal))
        .route("/confirm-payment", post(confirm_payment))
        // ── Operator ────────────────────────────────────────────────
        .route("/api/v1/users/:id", get(user_account))
        .route("/api/v1/users/:id/subscription", post(operator_activate))
        .route("/api/v1/signals/recent", get(recent_signals))
        .route("/api/v1/policy", get(get_policy).post(set_policy))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": true, "message": message })),
    )
        .into_response()
}

// =============================================================================
// Health (public)
// =============================================================================

async fn banner() -> &'static str {
    "Alpina Signal API is running"
}

async fn health_plain() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    users: usize,
    signals_logged: usize,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        users: state.access.user_count(),
        signals_logged: state.signal_log.len(),
        uptime_secs: state.uptime_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Registration (public)
// =============================================================================

#[derive(Deserialize)]
struct AuthRequest {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
}

async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return bad_request("invalid JSON body");
    };
    let Some(id) = req.id.as_ref().and_then(UserId::from_json) else {
        return bad_request("missing id");
    };

    let display_name = req
        .username
        .filter(|s| !s.trim().is_empty())
        .or(req.first_name)
        .unwrap_or_default();

    state.access.register(&id, display_name.trim());
    Json(serde_json::json!({ "ok": true })).into_response()
}

// =============================================================================
// Signal (public)
// =============================================================================

async fn signal(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RawSignalRequest>, JsonRejection>,
) -> Response {
    let raw = match body {
        Ok(Json(raw)) => raw,
        Err(e) => {
            debug!(error = %e, "signal body rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(SignalOutcome::Error(FailureKind::MalformedRequest)),
            )
                .into_response();
        }
    };

    let req = match SignalRequest::from_raw(&raw) {
        Ok(req) => req,
        Err(e) => {
            debug!(error = %e, "signal request rejected");
            return (StatusCode::BAD_REQUEST, Json(SignalOutcome::from_error(&e))).into_response();
        }
    };

    let auto_register = state.runtime_config.read().auto_register_on_signal;
    if auto_register {
        state.access.register(&req.user_id, "");
    }

    let outcome = state.signals.serve(&req).await;
    if let Some(served) = outcome.signal() {
        state.signal_log.push(SignalRecord::new(
            req.user_id.clone(),
            req.symbol.clone(),
            req.timeframe,
            served,
        ));
    }

    Json(outcome).into_response()
}

// =============================================================================
// Subscription activation
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmPaymentRequest {
    #[serde(default)]
    user_id: Option<serde_json::Value>,
}

async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> Response {
    let operator_only = state.runtime_config.read().require_operator_activation;
    if operator_only {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": true, "message": "activation requires operator confirmation" })),
        )
            .into_response();
    }

    let Ok(Json(req)) = body else {
        return bad_request("invalid JSON body");
    };
    let Some(id) = req.user_id.as_ref().and_then(UserId::from_json) else {
        return bad_request("missing userId");
    };

    warn!(user = %id, "subscription activated by unverified payment confirmation");
    let acct = state.access.activate_subscription(&id).await;
    Json(serde_json::json!({ "ok": true, "subscribed": acct.subscribed })).into_response()
}

async fn operator_activate(
    _auth: OperatorAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Some(id) = UserId::parse(&id) else {
        return bad_request("invalid user id");
    };
    let acct = state.access.activate_subscription(&id).await;
    info!(user = %id, "subscription activated by operator");
    Json(account_view(&state, acct)).into_response()
}

// =============================================================================
// Accounts (operator)
// =============================================================================

#[derive(Serialize)]
struct AccountView {
    #[serde(flatten)]
    account: UserAccount,
    is_admin: bool,
    /// `None` when the account is not quota-limited.
    free_signals_remaining: Option<u32>,
}

fn account_view(state: &AppState, account: UserAccount) -> AccountView {
    let is_admin = state.access.is_admin(&account.id);
    let free_signals_remaining = if is_admin || account.subscribed {
        None
    } else {
        Some(
            state
                .access
                .free_signal_limit()
                .saturating_sub(account.free_signals_used),
        )
    };
    AccountView {
        account,
        is_admin,
        free_signals_remaining,
    }
}

async fn user_account(
    _auth: OperatorAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let account = UserId::parse(&id).and_then(|id| state.access.account(&id));
    match account {
        Some(acct) => Json(account_view(&state, acct)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "user not found" })),
        )
            .into_response(),
    }
}

// =============================================================================
// Signal log (operator)
// =============================================================================

async fn recent_signals(_auth: OperatorAuth, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.signal_log.recent())
}

// =============================================================================
// Policy (operator)
// =============================================================================

async fn get_policy(_auth: OperatorAuth, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let policy = state.runtime_config.read().signal_policy.clone();
    Json(policy)
}

async fn set_policy(
    _auth: OperatorAuth,
    State(state): State<Arc<AppState>>,
    body: Result<Json<SignalPolicy>, JsonRejection>,
) -> Response {
    let Ok(Json(policy)) = body else {
        return bad_request("invalid policy body");
    };

    match state.update_policy(policy) {
        Ok(cfg) => {
            info!(policy = ?cfg.signal_policy, "signal policy updated");
            Json(cfg.signal_policy).into_response()
        }
        Err(e) => {
            warn!(error = %e, "signal policy rejected");
            bad_request(&e.to_string())
        }
    }
}
