//! The gateway boundary handlers call into.
//!
//! `get_authenticated_session` / `get_consented_session` are the only
//! entry points: resolve the token, load the target study's policy, run
//! the gate, then hand back the session together with a RequestContext
//! that has absorbed the session's identity.

use std::sync::Arc;

use crate::auth::{gate, AuthError};
use crate::context::RequestContext;
use crate::services::SessionUpdateService;
use crate::session::UserSession;
use crate::stores::{
    AppState, AuthenticationBackend, Reauthentication, SessionCache, SignIn, StoreError, Study,
    StudyStore,
};
use crate::types::Role;

pub struct AuthService {
    backend: Arc<dyn AuthenticationBackend>,
    cache: Arc<dyn SessionCache>,
    studies: Arc<dyn StudyStore>,
    session_updates: SessionUpdateService,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            backend: state.backend.clone(),
            cache: state.cache.clone(),
            studies: state.studies.clone(),
            session_updates: SessionUpdateService::new(state),
        }
    }

    /// Token to cached session. Blank tokens never reach the backend.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<UserSession>, StoreError> {
        if token.trim().is_empty() {
            return Ok(None);
        }
        self.backend.get_session(token).await
    }

    /// Role-gated entry point. Returns the session and the context rebuilt
    /// from it; the caller must use the returned context from here on.
    pub async fn get_authenticated_session(
        &self,
        ctx: &RequestContext,
        session: Option<&UserSession>,
        roles: &[Role],
    ) -> Result<(UserSession, RequestContext), AuthError> {
        let study = self.study_of(session).await?;
        let session = gate::require_role(session, ctx.caller_ip_address(), &study, roles)?;
        let ctx = ctx.with_session(session);
        Ok((session.clone(), ctx))
    }

    /// Consent-gated entry point. Also where participant languages are
    /// captured from Accept-Language, so preference negotiation happens on
    /// first contact without a dedicated endpoint.
    pub async fn get_consented_session(
        &self,
        ctx: &RequestContext,
        session: Option<&UserSession>,
        roles: &[Role],
    ) -> Result<(UserSession, RequestContext), AuthError> {
        let study = self.study_of(session).await?;
        let session =
            gate::require_consented_or_role(session, ctx.caller_ip_address(), &study, roles)?;
        let ctx = ctx.with_session(session);
        let session = self.session_updates.negotiate_languages(&ctx, session).await?;
        Ok((session, ctx))
    }

    /// Credential sign-in. The version gate runs before any session work so
    /// deprecated clients fail fast.
    pub async fn sign_in(
        &self,
        ctx: &RequestContext,
        sign_in: &SignIn,
    ) -> Result<UserSession, AuthError> {
        let study = self.study(&sign_in.app_id).await?;
        gate::verify_supported_version(&study, ctx.caller_client_info())?;
        let session = self
            .backend
            .sign_in(sign_in, ctx.caller_ip_address())
            .await?;
        self.cache.set_user_session(&session).await?;
        tracing::debug!(user_id = session.user_id(), app_id = %session.app_id, "signed in");
        Ok(session)
    }

    /// Trade a reauth token for a recreated session, same version gate as
    /// sign-in
    pub async fn reauthenticate(
        &self,
        ctx: &RequestContext,
        reauth: &Reauthentication,
    ) -> Result<UserSession, AuthError> {
        let study = self.study(&reauth.app_id).await?;
        gate::verify_supported_version(&study, ctx.caller_client_info())?;
        let session = self
            .backend
            .reauthenticate(reauth, ctx.caller_ip_address())
            .await?;
        self.cache.set_user_session(&session).await?;
        Ok(session)
    }

    async fn study(&self, app_id: &str) -> Result<Study, AuthError> {
        self.studies
            .get_study(app_id)
            .await?
            .ok_or(AuthError::EntityNotFound("Study"))
    }

    /// The study policy for the session's app; an absent session is simply
    /// not authenticated, not a missing-study error
    async fn study_of(&self, session: Option<&UserSession>) -> Result<Study, AuthError> {
        match session {
            Some(session) => self.study(&session.app_id).await,
            None => Err(AuthError::NotAuthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn blank_token_resolves_to_none_without_backend_call() {
        let fixture = testing::fixture();
        let service = fixture.auth_service();
        assert!(service.resolve_session("").await.unwrap().is_none());
        assert!(service.resolve_session("   ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_token_resolves_to_none() {
        let fixture = testing::fixture();
        let service = fixture.auth_service();
        assert!(service.resolve_session("no-such-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn authenticated_session_populates_the_context() {
        let fixture = testing::fixture();
        let session = fixture.sign_in_researcher().await;
        let ctx = testing::context_with_ip(session.ip_address.as_deref().unwrap());

        let (returned, ctx) = fixture
            .auth_service()
            .get_authenticated_session(&ctx, Some(&session), &[Role::Researcher])
            .await
            .unwrap();

        assert_eq!(returned.session_token, session.session_token);
        assert_eq!(ctx.caller_user_id(), Some(session.user_id()));
        assert!(ctx.is_administrator());
    }

    #[tokio::test]
    async fn consented_path_captures_languages_on_first_contact() {
        let fixture = testing::fixture();
        let session = fixture.sign_in_participant().await;
        let ctx = testing::context_with_ip(session.ip_address.as_deref().unwrap())
            .to_builder()
            .with_caller_languages(vec!["es".into()])
            .build();

        let (session, _ctx) = fixture
            .auth_service()
            .get_consented_session(&ctx, Some(&session), &[])
            .await
            .unwrap();
        assert_eq!(session.participant.languages, vec!["es"]);

        // and the capture is durable
        let account = fixture.account_of(&session).await.unwrap();
        assert_eq!(account.languages, vec!["es"]);
    }

    #[tokio::test]
    async fn sign_in_rejects_unsupported_client_versions() {
        let fixture = testing::fixture();
        let ctx = testing::context_with_client("Cardio Health/1 (Moto G; Android/14) CohortSDK/7");

        let err = fixture
            .auth_service()
            .sign_in(&ctx, &testing::participant_sign_in())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedVersion));
    }

    #[tokio::test]
    async fn sign_in_against_unknown_study_is_entity_not_found() {
        let fixture = testing::fixture();
        let ctx = testing::context_with_ip("1.1.1.1");
        let mut sign_in = testing::participant_sign_in();
        sign_in.app_id = "no-such-study".into();

        let err = fixture.auth_service().sign_in(&ctx, &sign_in).await.unwrap_err();
        assert!(matches!(err, AuthError::EntityNotFound("Study")));
    }

    #[tokio::test]
    async fn bad_password_is_not_authenticated() {
        let fixture = testing::fixture();
        let ctx = testing::context_with_ip("1.1.1.1");
        let mut sign_in = testing::participant_sign_in();
        sign_in.password = "wrong".into();

        let err = fixture.auth_service().sign_in(&ctx, &sign_in).await.unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
    }

    #[tokio::test]
    async fn reauthentication_rotates_the_session_token() {
        let fixture = testing::fixture();
        let ctx = testing::context_with_ip("1.1.1.1");
        let session = fixture.sign_in_participant().await;

        let reauth = Reauthentication {
            app_id: session.app_id.clone(),
            email: session.participant.email.clone().unwrap(),
            reauth_token: session.reauth_token.clone().unwrap(),
        };
        let fresh = fixture
            .auth_service()
            .reauthenticate(&ctx, &reauth)
            .await
            .unwrap();
        assert_ne!(fresh.session_token, session.session_token);
        assert!(fresh.authenticated);
    }
}
