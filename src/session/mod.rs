pub mod client_info;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{Role, SharingScope};

pub use client_info::ClientInfo;

/// Consent state for one subpopulation (consent cohort) within a study
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentStatus {
    pub name: String,
    pub subpopulation_guid: String,
    pub required: bool,
    pub consented: bool,
    pub signed_most_recent_consent: bool,
}

/// The participant snapshot carried inside a cached session
/// Mirrors the durable account record at the time the session was built,
/// except where the mutation protocol has patched it in place since
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyParticipant {
    pub id: String,
    pub email: Option<String>,
    pub health_code: Option<String>,
    pub roles: BTreeSet<Role>,
    pub org_membership: Option<String>,
    pub substudy_ids: BTreeSet<String>,
    pub data_groups: BTreeSet<String>,
    /// Ordered by preference, most preferred first
    pub languages: Vec<String>,
    pub time_zone: Option<String>,
    pub sharing_scope: SharingScope,
    pub external_id: Option<String>,
}

/// Cached representation of an authenticated principal
///
/// Created by the authentication backend on sign-in or reauthentication,
/// replaced wholesale when session state is recreated (consent actions,
/// sign-in), patched in place for narrow attribute changes, and removed
/// from the cache on sign-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// Opaque credential, rotates on sign-in
    pub session_token: String,
    pub reauth_token: Option<String>,
    /// Stable telemetry identifier, distinct from the token
    pub internal_session_id: String,
    /// True only when produced by a successful credential check
    pub authenticated: bool,
    /// Caller IP observed when the session was created
    pub ip_address: Option<String>,
    pub app_id: String,
    pub participant: StudyParticipant,
    /// Keyed by subpopulation guid
    pub consent_statuses: BTreeMap<String, ConsentStatus>,
}

impl UserSession {
    /// A session is fully consented when every required subpopulation
    /// has a signed consent; optional subpopulations don't count against it
    pub fn is_consented(&self) -> bool {
        self.consent_statuses
            .values()
            .filter(|status| status.required)
            .all(|status| status.consented)
    }

    /// True when the participant holds at least one of the given roles.
    /// An empty slice means "no role restriction" and always matches.
    pub fn is_in_role(&self, roles: &[Role]) -> bool {
        roles.is_empty() || roles.iter().any(|r| self.participant.roles.contains(r))
    }

    /// Privileged accounts (any role at all) get stricter treatment
    /// from the gate than ordinary participants
    pub fn has_any_role(&self) -> bool {
        !self.participant.roles.is_empty()
    }

    pub fn user_id(&self) -> &str {
        &self.participant.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consent(guid: &str, required: bool, consented: bool) -> ConsentStatus {
        ConsentStatus {
            name: format!("Consent {}", guid),
            subpopulation_guid: guid.to_string(),
            required,
            consented,
            signed_most_recent_consent: consented,
        }
    }

    fn session_with(statuses: Vec<ConsentStatus>) -> UserSession {
        UserSession {
            session_token: "token".into(),
            reauth_token: None,
            internal_session_id: "internal".into(),
            authenticated: true,
            ip_address: None,
            app_id: "app".into(),
            participant: StudyParticipant::default(),
            consent_statuses: statuses
                .into_iter()
                .map(|s| (s.subpopulation_guid.clone(), s))
                .collect(),
        }
    }

    #[test]
    fn consented_when_all_required_signed() {
        let session = session_with(vec![
            consent("default", true, true),
            consent("optional", false, false),
        ]);
        assert!(session.is_consented());
    }

    #[test]
    fn not_consented_when_any_required_unsigned() {
        let session = session_with(vec![
            consent("default", true, true),
            consent("second", true, false),
        ]);
        assert!(!session.is_consented());
    }

    #[test]
    fn empty_consent_map_counts_as_consented() {
        let session = session_with(vec![]);
        assert!(session.is_consented());
    }

    #[test]
    fn empty_role_slice_matches_everyone() {
        let session = session_with(vec![]);
        assert!(session.is_in_role(&[]));
        assert!(!session.is_in_role(&[Role::Developer]));
    }
}
