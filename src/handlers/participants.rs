use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::Deserialize;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CallerSession};
use crate::services::{OrgService, SessionUpdateService};
use crate::session::UserSession;
use crate::stores::{Account, AppState};
use crate::types::{Role, SharingScope};

#[derive(Debug, Deserialize)]
pub struct SharingScopeRequest {
    pub sharing_scope: SharingScope,
}

#[derive(Debug, Deserialize)]
pub struct TimeZoneRequest {
    pub time_zone: String,
}

#[derive(Debug, Deserialize)]
pub struct ExternalIdRequest {
    pub external_id: String,
}

/// GET /v1/participants/self - the caller's own participant view
pub async fn get_self(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(caller): Extension<CallerSession>,
) -> ApiResult<UserSession> {
    let (session, _ctx) = super::authenticated(&state, &ctx, &caller, &[]).await?;
    Ok(ApiResponse::success(session))
}

/// POST /v1/participants/self/dataSharing - change the sharing scope
///
/// Consent-gated: a participant who has not signed the required consents
/// has no sharing decision to change yet.
pub async fn update_sharing_scope(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(caller): Extension<CallerSession>,
    Json(payload): Json<SharingScopeRequest>,
) -> ApiResult<UserSession> {
    let (session, _ctx) = super::consented(&state, &ctx, &caller, &[]).await?;
    let updated = SessionUpdateService::new(&state)
        .update_sharing_scope(&session, payload.sharing_scope)
        .await?;
    Ok(ApiResponse::success(updated))
}

/// POST /v1/participants/self/timeZone - capture the participant timezone
pub async fn update_time_zone(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(caller): Extension<CallerSession>,
    Json(payload): Json<TimeZoneRequest>,
) -> ApiResult<UserSession> {
    if payload.time_zone.trim().is_empty() {
        return Err(ApiError::bad_request("time_zone is required"));
    }
    let (session, _ctx) = super::authenticated(&state, &ctx, &caller, &[]).await?;
    let updated = SessionUpdateService::new(&state)
        .capture_time_zone(&session, &payload.time_zone)
        .await?;
    Ok(ApiResponse::success(updated))
}

/// POST /v1/participants/self/externalId - attach or change the external id
pub async fn update_external_id(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(caller): Extension<CallerSession>,
    Json(payload): Json<ExternalIdRequest>,
) -> ApiResult<UserSession> {
    if payload.external_id.trim().is_empty() {
        return Err(ApiError::bad_request("external_id is required"));
    }
    let (session, _ctx) = super::authenticated(&state, &ctx, &caller, &[]).await?;
    let updated = SessionUpdateService::new(&state)
        .update_external_id(&session, &payload.external_id)
        .await?;
    Ok(ApiResponse::success(updated))
}

/// GET /v1/participants/:user_id - account lookup for elevated callers,
/// org-scoped for org-admins
pub async fn get_participant(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(caller): Extension<CallerSession>,
    Path(user_id): Path<String>,
) -> ApiResult<Account> {
    let (session, ctx) = super::authenticated(
        &state,
        &ctx,
        &caller,
        &[Role::OrgAdmin, Role::Admin, Role::Superadmin],
    )
    .await?;
    let account = OrgService::new(&state)
        .verify_acting_on_org_member(&ctx, &session.app_id, &user_id)
        .await?;
    Ok(ApiResponse::success(account))
}
