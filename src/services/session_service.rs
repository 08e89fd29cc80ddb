//! Write-through session mutations.
//!
//! Narrow attribute changes (languages, timezone, sharing scope, external
//! id) update the durable account record and then patch the cached session
//! in place, so the derived state built at sign-in (consent statuses) is
//! preserved and a fresh token lookup immediately observes the new value.

use std::sync::Arc;

use crate::auth::AuthError;
use crate::context::RequestContext;
use crate::session::UserSession;
use crate::stores::{
    AccountPatch, AccountStore, AppState, AuthenticationBackend, ConsentEvaluator, SessionCache,
};
use crate::types::SharingScope;

pub struct SessionUpdateService {
    backend: Arc<dyn AuthenticationBackend>,
    cache: Arc<dyn SessionCache>,
    accounts: Arc<dyn AccountStore>,
    consents: Arc<dyn ConsentEvaluator>,
}

impl SessionUpdateService {
    pub fn new(state: &AppState) -> Self {
        Self {
            backend: state.backend.clone(),
            cache: state.cache.clone(),
            accounts: state.accounts.clone(),
            consents: state.consents.clone(),
        }
    }

    /// Capture the caller's Accept-Language preferences on first contact.
    /// A participant's stored language list always wins; once non-empty it
    /// is never overwritten from the header, so repeat negotiation with any
    /// Accept-Language value is a no-op.
    pub async fn negotiate_languages(
        &self,
        ctx: &RequestContext,
        session: &UserSession,
    ) -> Result<UserSession, AuthError> {
        if !session.participant.languages.is_empty() {
            return Ok(session.clone());
        }
        let languages = ctx.caller_languages().to_vec();
        if languages.is_empty() {
            return Ok(session.clone());
        }
        tracing::debug!(
            user_id = session.user_id(),
            ?languages,
            "capturing participant languages from Accept-Language"
        );
        let updated = self
            .write_through(
                session,
                AccountPatch {
                    languages: Some(languages),
                    ..AccountPatch::default()
                },
            )
            .await?;
        // languages feed subpopulation criteria, so drop derived state
        self.notify_consent_evaluator(&updated);
        Ok(updated)
    }

    /// Record the participant's timezone the first time a client reports
    /// one; later reports with a differing zone are ignored
    pub async fn capture_time_zone(
        &self,
        session: &UserSession,
        time_zone: &str,
    ) -> Result<UserSession, AuthError> {
        let time_zone = time_zone.trim();
        if time_zone.is_empty() || session.participant.time_zone.is_some() {
            return Ok(session.clone());
        }
        self.write_through(
            session,
            AccountPatch {
                time_zone: Some(time_zone.to_string()),
                ..AccountPatch::default()
            },
        )
        .await
    }

    pub async fn update_sharing_scope(
        &self,
        session: &UserSession,
        sharing_scope: SharingScope,
    ) -> Result<UserSession, AuthError> {
        if session.participant.sharing_scope == sharing_scope {
            return Ok(session.clone());
        }
        let updated = self
            .write_through(
                session,
                AccountPatch {
                    sharing_scope: Some(sharing_scope),
                    ..AccountPatch::default()
                },
            )
            .await?;
        // sharing scope is consent-relevant; keep the evaluator fresh
        self.notify_consent_evaluator(&updated);
        Ok(updated)
    }

    pub async fn update_external_id(
        &self,
        session: &UserSession,
        external_id: &str,
    ) -> Result<UserSession, AuthError> {
        if session.participant.external_id.as_deref() == Some(external_id) {
            return Ok(session.clone());
        }
        self.write_through(
            session,
            AccountPatch {
                external_id: Some(external_id.to_string()),
                ..AccountPatch::default()
            },
        )
        .await
    }

    /// Invalidate the session on the identity side and drop the cache entry
    pub async fn sign_out(&self, session: &UserSession) -> Result<(), AuthError> {
        self.backend.sign_out(session).await?;
        self.cache.remove_user_session(&session.session_token).await?;
        tracing::debug!(user_id = session.user_id(), "signed out");
        Ok(())
    }

    /// Durable record first, then the cached snapshot. A failure between
    /// the two leaves the account correct and the cache merely stale until
    /// the next successful resolution.
    async fn write_through(
        &self,
        session: &UserSession,
        patch: AccountPatch,
    ) -> Result<UserSession, AuthError> {
        if patch.is_empty() {
            return Ok(session.clone());
        }
        self.accounts
            .update_account(&session.app_id, session.user_id(), patch.clone())
            .await?;
        let mut updated = session.clone();
        patch.apply_to_participant(&mut updated.participant);
        self.cache.set_user_session(&updated).await?;
        Ok(updated)
    }

    /// Fire-and-forget with respect to the current response; the evaluator
    /// only needs to be fresh by the next request
    fn notify_consent_evaluator(&self, session: &UserSession) {
        let Some(health_code) = session.participant.health_code.clone() else {
            return;
        };
        let consents = self.consents.clone();
        tokio::spawn(async move {
            consents.invalidate(&health_code).await;
        });
    }
}
