use axum::{
    extract::{Extension, State},
    http::header::SET_COOKIE,
    http::HeaderValue,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::token;
use crate::config;
use crate::context::RequestContext;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CallerSession};
use crate::services::{AuthService, SessionUpdateService};
use crate::session::UserSession;
use crate::stores::{AppState, Reauthentication, SignIn};

/// POST /v1/auth/signIn - credential sign-in, returns the new session
///
/// The client version gate runs before any session work, so deprecated
/// clients are turned away without touching the identity backend.
pub async fn sign_in(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<SignIn>,
) -> Result<Response, ApiError> {
    if payload.app_id.trim().is_empty() || payload.email.trim().is_empty() {
        return Err(ApiError::bad_request("app_id and email are required"));
    }
    let session = AuthService::new(&state).sign_in(&ctx, &payload).await?;
    Ok(session_response(session))
}

/// POST /v1/auth/reauth - trade a reauthentication token for a new session
pub async fn reauthenticate(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<Reauthentication>,
) -> Result<Response, ApiError> {
    if payload.reauth_token.trim().is_empty() {
        return Err(ApiError::bad_request("reauth_token is required"));
    }
    let session = AuthService::new(&state)
        .reauthenticate(&ctx, &payload)
        .await?;
    Ok(session_response(session))
}

/// GET /v1/auth/session - current session details for any signed-in caller
pub async fn get_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(caller): Extension<CallerSession>,
) -> ApiResult<UserSession> {
    let (session, _ctx) = super::authenticated(&state, &ctx, &caller, &[]).await?;
    Ok(ApiResponse::success(session))
}

/// POST /v1/auth/signOut - invalidate the session and drop the cache entry
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(caller): Extension<CallerSession>,
) -> Result<Response, ApiError> {
    let (session, _ctx) = super::authenticated(&state, &ctx, &caller, &[]).await?;
    SessionUpdateService::new(&state).sign_out(&session).await?;

    let mut response =
        ApiResponse::success(json!({ "signed_out": true })).into_response();
    let config = config::config();
    if config.environment.emits_session_cookie() {
        let cookie = token::expired_session_cookie(&config.security.session_cookie_domain);
        if let Ok(cookie) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
    }
    Ok(response)
}

/// Session body plus, on local-class deployments, the session cookie so
/// browser tooling can round-trip it
fn session_response(session: UserSession) -> Response {
    let config = config::config();
    let cookie = config
        .environment
        .emits_session_cookie()
        .then(|| token::session_cookie(&session.session_token, &config.security.session_cookie_domain));

    let mut response = ApiResponse::success(session).into_response();
    if let Some(cookie) = cookie {
        if let Ok(cookie) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
    }
    response
}
