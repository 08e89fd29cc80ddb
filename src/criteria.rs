//! Attribute bag handed to the consent evaluator.
//!
//! The builder only assembles; subpopulation matching happens in the
//! evaluator collaborator. Missing optional fields stay absent.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::session::{ClientInfo, UserSession};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaContext {
    pub app_id: String,
    pub user_id: Option<String>,
    pub health_code: Option<String>,
    pub client_info: ClientInfo,
    pub languages: Vec<String>,
    pub user_data_groups: BTreeSet<String>,
    pub user_substudy_ids: BTreeSet<String>,
}

impl CriteriaContext {
    /// Criteria for an authenticated session. Session languages win over
    /// the request's Accept-Language when the participant has any stored.
    pub fn for_session(session: &UserSession, ctx: &RequestContext) -> CriteriaContext {
        let languages = if session.participant.languages.is_empty() {
            ctx.caller_languages().to_vec()
        } else {
            session.participant.languages.clone()
        };
        CriteriaContext {
            app_id: session.app_id.clone(),
            user_id: Some(session.user_id().to_string()),
            health_code: session.participant.health_code.clone(),
            client_info: ctx.caller_client_info().clone(),
            languages,
            user_data_groups: session.participant.data_groups.clone(),
            user_substudy_ids: session.participant.substudy_ids.clone(),
        }
    }

    /// Criteria for an anonymous request against a known study,
    /// before any session exists (e.g. sign-up screens)
    pub fn for_context(app_id: &str, ctx: &RequestContext) -> CriteriaContext {
        CriteriaContext {
            app_id: app_id.to_string(),
            user_id: ctx.caller_user_id().map(str::to_string),
            health_code: None,
            client_info: ctx.caller_client_info().clone(),
            languages: ctx.caller_languages().to_vec(),
            user_data_groups: BTreeSet::new(),
            user_substudy_ids: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StudyParticipant;

    fn session() -> UserSession {
        UserSession {
            session_token: "token".into(),
            reauth_token: None,
            internal_session_id: "internal".into(),
            authenticated: true,
            ip_address: None,
            app_id: "cardio-study".into(),
            participant: StudyParticipant {
                id: "user-1".into(),
                health_code: Some("hc-1".into()),
                data_groups: ["group_a".to_string()].into(),
                substudy_ids: ["substudy-1".to_string()].into(),
                languages: vec!["de".into(), "en".into()],
                ..StudyParticipant::default()
            },
            consent_statuses: Default::default(),
        }
    }

    #[test]
    fn session_languages_win_over_request_languages() {
        let ctx = RequestContext::builder()
            .with_caller_languages(vec!["fr".into()])
            .build();
        let criteria = CriteriaContext::for_session(&session(), &ctx);
        assert_eq!(criteria.languages, vec!["de".to_string(), "en".to_string()]);
        assert_eq!(criteria.health_code.as_deref(), Some("hc-1"));
        assert!(criteria.user_data_groups.contains("group_a"));
    }

    #[test]
    fn request_languages_used_when_session_has_none() {
        let mut session = session();
        session.participant.languages.clear();
        let ctx = RequestContext::builder()
            .with_caller_languages(vec!["fr".into()])
            .build();
        let criteria = CriteriaContext::for_session(&session, &ctx);
        assert_eq!(criteria.languages, vec!["fr".to_string()]);
    }

    #[test]
    fn anonymous_criteria_carry_only_request_attributes() {
        let ctx = RequestContext::builder()
            .with_caller_languages(vec!["en".into()])
            .build();
        let criteria = CriteriaContext::for_context("cardio-study", &ctx);
        assert_eq!(criteria.app_id, "cardio-study");
        assert_eq!(criteria.user_id, None);
        assert_eq!(criteria.health_code, None);
        assert_eq!(criteria.languages, vec!["en".to_string()]);
    }
}
