// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the rate guard service.
//!
//! The service can be used two ways:
//!
//! 1. **External check**: a reverse proxy calls `/check` with the client IP
//!    and user agent, and forwards the request only if it is allowed.
//! 2. **Direct filter**: requests hit the service itself; unrouted paths are
//!    answered by [`proxy_handler`], and [`guard_layer`] can be mounted on
//!    any other router.
//!
//! The `/admin` routes are the only way to inspect or change guard state.
//! They require `Authorization: Bearer <token>` matching the configured admin
//! token, and are closed entirely when no token is configured.

use crate::config::Config;
use crate::error::GuardError;
use crate::guard::{RateGuard, Verdict};
use crate::store::CounterPage;
use axum::{
    extract::{ConnectInfo, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Body returned to blocked clients.
pub const BLOCKED_MESSAGE: &str = "Your IP has been blocked due to suspected DDoS attack.";

/// Shared application state.
pub struct AppState {
    pub guard: Arc<RateGuard>,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Check request from an external proxy.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub ip: String,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Check response.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Pagination parameters for the counter listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub per_page: Option<usize>,
}

/// Blocked IP listing.
#[derive(Debug, Serialize)]
pub struct BlockedResponse {
    pub ips: Vec<String>,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/admin/counters", get(list_counters).delete(clear_counters))
        .route("/admin/blocked", get(list_blocked))
        .route("/admin/blocked/:ip", delete(unblock))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/check", post(check))
        .merge(admin);

    if state.config.metrics.enabled {
        match state.config.metrics.route() {
            Ok(path) => app = app.route(&path, get(metrics)),
            Err(e) => error!(error = %e, "Metrics endpoint not mounted"),
        }
    }

    app.fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "ip-rate-guard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Decide a request on behalf of an external proxy.
///
/// Allowed requests get 200, blocked ones 403, and an unusable IP 400. The
/// proxy chooses what to do with a 400; allowing is the safer default.
pub async fn check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckRequest>,
) -> impl IntoResponse {
    let user_agent = req.user_agent.as_deref().unwrap_or("");
    debug!(ip = %req.ip, user_agent = %user_agent, "Processing check");

    match state.guard.decide(&req.ip, user_agent, Utc::now()) {
        Ok(Verdict::Allowed) => (
            StatusCode::OK,
            Json(CheckResponse {
                allowed: true,
                verdict: Some(Verdict::Allowed),
                reason: None,
            }),
        ),
        Ok(Verdict::Blocked) => (
            StatusCode::FORBIDDEN,
            Json(CheckResponse {
                allowed: false,
                verdict: Some(Verdict::Blocked),
                reason: Some(BLOCKED_MESSAGE.to_string()),
            }),
        ),
        Err(e @ GuardError::InvalidInput(_)) => {
            warn!(ip = %req.ip, error = %e, "Rejected check with invalid IP");
            (
                StatusCode::BAD_REQUEST,
                Json(CheckResponse {
                    allowed: false,
                    verdict: None,
                    reason: Some(e.to_string()),
                }),
            )
        }
        Err(e) => {
            error!(ip = %req.ip, error = %e, "Check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CheckResponse {
                    allowed: false,
                    verdict: None,
                    reason: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Evaluate a request from `addr` and return the rejection, if any.
///
/// Invalid input fails open: the request is let through with a warning.
fn evaluate(guard: &RateGuard, addr: SocketAddr, headers: &HeaderMap) -> Option<Response> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let ip = addr.ip().to_string();

    match guard.decide(&ip, user_agent, Utc::now()) {
        Ok(Verdict::Allowed) => None,
        Ok(Verdict::Blocked) => Some((StatusCode::FORBIDDEN, BLOCKED_MESSAGE).into_response()),
        Err(e) => {
            warn!(%ip, error = %e, "Guard failed, allowing request");
            None
        }
    }
}

/// Middleware that rejects blocked peers with 403.
///
/// Mount with [`axum::middleware::from_fn_with_state`]; the router must be
/// served with connect info so the peer address is available.
pub async fn guard_layer(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(rejection) = evaluate(&state.guard, addr, request.headers()) {
        return rejection;
    }
    next.run(request).await
}

/// Convenience wrapper applying [`guard_layer`] to `router`.
pub fn guarded<S>(router: Router<S>, state: Arc<AppState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(state, guard_layer))
}

/// Fallback for requests sent straight to the service.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = evaluate(&state.guard, addr, &headers) {
        return rejection;
    }

    // Nothing to forward to; report that the request would pass
    (StatusCode::OK, "Request allowed").into_response()
}

/// Middleware admitting only requests that carry the admin bearer token.
///
/// Answers 401 for a missing or wrong token and 403 when no token is
/// configured.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.admin.token.as_deref().filter(|t| !t.is_empty()) else {
        warn!(path = %request.uri().path(), "Admin request refused, no admin token configured");
        return StatusCode::FORBIDDEN.into_response();
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .is_some_and(|token| token_matches(token.trim(), expected));

    if !authorized {
        warn!(path = %request.uri().path(), "Admin request refused, bad credentials");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
        )
            .into_response();
    }
    next.run(request).await
}

/// Compare tokens without exiting early on the first differing byte.
fn token_matches(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// List live counters, most recent first.
pub async fn list_counters(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<CounterPage> {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(0);
    Json(state.guard.list_counters(page, per_page))
}

/// Clear every counter. Blocks stay in place.
pub async fn clear_counters(State(state): State<Arc<AppState>>) -> StatusCode {
    state.guard.admin_clear_counters();
    StatusCode::NO_CONTENT
}

/// List blocked IPs.
pub async fn list_blocked(State(state): State<Arc<AppState>>) -> Json<BlockedResponse> {
    Json(BlockedResponse {
        ips: state.guard.list_blocked(),
    })
}

/// Unblock one IP. Unblocking an IP that is not blocked also succeeds.
pub async fn unblock(State(state): State<Arc<AppState>>, Path(ip): Path<String>) -> StatusCode {
    let removed = state.guard.admin_unblock(&ip);
    if !removed {
        info!(%ip, "Unblock requested for IP that was not blocked");
    }
    StatusCode::NO_CONTENT
}

/// Prometheus metrics in text format.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.guard.metrics().render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
