pub mod auth;
pub mod participants;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::middleware::CallerSession;
use crate::services::AuthService;
use crate::session::UserSession;
use crate::stores::AppState;
use crate::types::Role;

/// Shorthand for the gateway's role-gated entry point
pub(crate) async fn authenticated(
    state: &AppState,
    ctx: &RequestContext,
    caller: &CallerSession,
    roles: &[Role],
) -> Result<(UserSession, RequestContext), ApiError> {
    let (session, ctx) = AuthService::new(state)
        .get_authenticated_session(ctx, caller.0.as_ref(), roles)
        .await?;
    Ok((session, ctx))
}

/// Shorthand for the gateway's consent-gated entry point
pub(crate) async fn consented(
    state: &AppState,
    ctx: &RequestContext,
    caller: &CallerSession,
    roles: &[Role],
) -> Result<(UserSession, RequestContext), ApiError> {
    let (session, ctx) = AuthService::new(state)
        .get_consented_session(ctx, caller.0.as_ref(), roles)
        .await?;
    Ok((session, ctx))
}
