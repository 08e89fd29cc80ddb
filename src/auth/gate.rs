//! The authorization gate: pure decision logic over a resolved session,
//! the target study's security policy, and the caller's requirement.
//!
//! Nothing here touches a store; every function is a plain computation so
//! the security rules can be tested exhaustively without collaborators.

use crate::auth::AuthError;
use crate::session::{ClientInfo, UserSession};
use crate::stores::Study;
use crate::types::Role;

/// Session must exist and be authenticated, and must pass the IP lock.
///
/// The IP lock runs before any role or consent check. Privileged accounts
/// (any role at all) are always bound to their sign-in IP; ordinary
/// participants only when the study enables participant IP locking.
pub fn require_authenticated<'a>(
    session: Option<&'a UserSession>,
    caller_ip: Option<&str>,
    study: &Study,
) -> Result<&'a UserSession, AuthError> {
    let session = session.ok_or(AuthError::NotAuthenticated)?;
    if !session.authenticated {
        return Err(AuthError::NotAuthenticated);
    }

    if let Some(session_ip) = session.ip_address.as_deref() {
        let ip_matches = caller_ip == Some(session_ip);
        let locked = session.has_any_role() || study.participant_ip_locking_enabled;
        if locked && !ip_matches {
            tracing::warn!(
                user_id = session.user_id(),
                app_id = %session.app_id,
                "session IP does not match request IP, rejecting"
            );
            return Err(AuthError::NotAuthenticated);
        }
    }

    Ok(session)
}

/// `require_authenticated`, then at least one of the supplied roles.
/// An empty role slice means no role restriction. A role miss is
/// Unauthorized, never NotAuthenticated: the caller is signed in,
/// just insufficiently privileged.
pub fn require_role<'a>(
    session: Option<&'a UserSession>,
    caller_ip: Option<&str>,
    study: &Study,
    roles: &[Role],
) -> Result<&'a UserSession, AuthError> {
    let session = require_authenticated(session, caller_ip, study)?;
    if !session.is_in_role(roles) {
        return Err(AuthError::Unauthorized);
    }
    Ok(session)
}

/// Consent-gated access: a fully consented participant always passes, a
/// caller holding one of the supplied roles passes without consent, an
/// unconsented role-less participant is sent to consent, and a caller with
/// the wrong roles is refused outright (never told to consent).
pub fn require_consented_or_role<'a>(
    session: Option<&'a UserSession>,
    caller_ip: Option<&str>,
    study: &Study,
    roles: &[Role],
) -> Result<&'a UserSession, AuthError> {
    let session = require_authenticated(session, caller_ip, study)?;
    if session.is_consented() {
        return Ok(session);
    }
    if !roles.is_empty() && session.is_in_role(roles) {
        return Ok(session);
    }
    if !session.has_any_role() {
        return Err(AuthError::ConsentRequired(Box::new(session.clone())));
    }
    Err(AuthError::Unauthorized)
}

/// Deny deprecated clients before any session work. Only denies when the
/// caller's OS has an entry in the study's minimum-version table and the
/// caller's build is strictly below it; unknown OS or missing entries pass.
pub fn verify_supported_version(study: &Study, client_info: &ClientInfo) -> Result<(), AuthError> {
    let (Some(os_name), Some(app_version)) = (&client_info.os_name, client_info.app_version)
    else {
        return Ok(());
    };
    if let Some(&minimum) = study.min_supported_app_versions.get(os_name) {
        if app_version < minimum {
            tracing::warn!(
                os = %os_name,
                build = app_version,
                minimum,
                study = %study.identifier,
                "rejecting client below minimum supported version"
            );
            return Err(AuthError::UnsupportedVersion);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ConsentStatus, StudyParticipant};
    use std::collections::BTreeMap;

    fn study(ip_locking: bool) -> Study {
        Study {
            identifier: "cardio-study".into(),
            name: "Cardio Health Study".into(),
            participant_ip_locking_enabled: ip_locking,
            ..Study::default()
        }
    }

    fn session(roles: &[Role], session_ip: &str) -> UserSession {
        UserSession {
            session_token: "token".into(),
            reauth_token: None,
            internal_session_id: "internal".into(),
            authenticated: true,
            ip_address: Some(session_ip.to_string()),
            app_id: "cardio-study".into(),
            participant: StudyParticipant {
                id: "user-1".into(),
                roles: roles.iter().copied().collect(),
                ..StudyParticipant::default()
            },
            consent_statuses: BTreeMap::new(),
        }
    }

    fn unconsented(mut session: UserSession) -> UserSession {
        session.consent_statuses.insert(
            "default".into(),
            ConsentStatus {
                name: "Default Consent".into(),
                subpopulation_guid: "default".into(),
                required: true,
                consented: false,
                signed_most_recent_consent: false,
            },
        );
        session
    }

    #[test]
    fn absent_session_is_not_authenticated() {
        let err = require_authenticated(None, Some("1.1.1.1"), &study(false)).unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
    }

    #[test]
    fn unauthenticated_session_is_rejected_regardless_of_role_or_ip() {
        let mut s = session(&[Role::Admin], "1.1.1.1");
        s.authenticated = false;
        let err =
            require_authenticated(Some(&s), Some("1.1.1.1"), &study(false)).unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
    }

    #[test]
    fn participant_ip_mismatch_allowed_when_locking_disabled() {
        let s = session(&[], "2.2.2.2");
        assert!(require_authenticated(Some(&s), Some("1.1.1.1"), &study(false)).is_ok());
    }

    #[test]
    fn participant_ip_mismatch_rejected_when_locking_enabled() {
        let s = session(&[], "2.2.2.2");
        let err = require_authenticated(Some(&s), Some("1.1.1.1"), &study(true)).unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
    }

    #[test]
    fn privileged_ip_mismatch_rejected_even_with_locking_disabled() {
        let s = session(&[Role::Developer], "2.2.2.2");
        let err = require_authenticated(Some(&s), Some("1.1.1.1"), &study(false)).unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
    }

    #[test]
    fn equal_ips_never_deny() {
        for ip_locking in [false, true] {
            for roles in [&[][..], &[Role::Superadmin][..]] {
                let s = session(roles, "1.1.1.1");
                assert!(
                    require_authenticated(Some(&s), Some("1.1.1.1"), &study(ip_locking)).is_ok()
                );
            }
        }
    }

    #[test]
    fn role_miss_is_unauthorized_not_unauthenticated() {
        let s = session(&[Role::Developer], "1.1.1.1");
        let err = require_role(
            Some(&s),
            Some("1.1.1.1"),
            &study(false),
            &[Role::Researcher],
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[test]
    fn empty_role_slice_means_no_restriction() {
        let s = session(&[], "1.1.1.1");
        assert!(require_role(Some(&s), Some("1.1.1.1"), &study(false), &[]).is_ok());
    }

    #[test]
    fn matching_role_passes() {
        let s = session(&[Role::Researcher, Role::Developer], "1.1.1.1");
        assert!(
            require_role(Some(&s), Some("1.1.1.1"), &study(false), &[Role::Researcher]).is_ok()
        );
    }

    #[test]
    fn consented_session_passes_regardless_of_roles() {
        let s = session(&[], "1.1.1.1");
        assert!(require_consented_or_role(
            Some(&s),
            Some("1.1.1.1"),
            &study(false),
            &[Role::Developer]
        )
        .is_ok());
    }

    #[test]
    fn unconsented_participant_without_roles_is_sent_to_consent() {
        let s = unconsented(session(&[], "1.1.1.1"));
        let err = require_consented_or_role(
            Some(&s),
            Some("1.1.1.1"),
            &study(false),
            &[Role::Developer],
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::ConsentRequired(_)));
    }

    #[test]
    fn unconsented_caller_with_wrong_roles_is_unauthorized() {
        let s = unconsented(session(&[Role::Researcher], "1.1.1.1"));
        let err = require_consented_or_role(
            Some(&s),
            Some("1.1.1.1"),
            &study(false),
            &[Role::Developer],
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[test]
    fn unconsented_caller_with_matching_role_passes() {
        let s = unconsented(session(&[Role::Developer], "1.1.1.1"));
        assert!(require_consented_or_role(
            Some(&s),
            Some("1.1.1.1"),
            &study(false),
            &[Role::Developer]
        )
        .is_ok());
    }

    #[test]
    fn ip_lock_runs_before_consent_checks() {
        let s = unconsented(session(&[Role::Developer], "2.2.2.2"));
        let err = require_consented_or_role(
            Some(&s),
            Some("1.1.1.1"),
            &study(false),
            &[Role::Developer],
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
    }

    #[test]
    fn version_below_minimum_is_rejected() {
        let mut study = study(false);
        study
            .min_supported_app_versions
            .insert("Android".into(), 10);
        let client = ClientInfo {
            os_name: Some("Android".into()),
            app_version: Some(9),
            ..ClientInfo::default()
        };
        let err = verify_supported_version(&study, &client).unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedVersion));
    }

    #[test]
    fn version_at_minimum_passes() {
        let mut study = study(false);
        study
            .min_supported_app_versions
            .insert("Android".into(), 10);
        let client = ClientInfo {
            os_name: Some("Android".into()),
            app_version: Some(10),
            ..ClientInfo::default()
        };
        assert!(verify_supported_version(&study, &client).is_ok());
    }

    #[test]
    fn unknown_os_or_missing_table_entry_never_denies() {
        let mut with_entry = study(false);
        with_entry
            .min_supported_app_versions
            .insert("Android".into(), 10);

        let ios_client = ClientInfo {
            os_name: Some("iPhone OS".into()),
            app_version: Some(1),
            ..ClientInfo::default()
        };
        assert!(verify_supported_version(&with_entry, &ios_client).is_ok());
        assert!(verify_supported_version(&with_entry, &ClientInfo::default()).is_ok());
        assert!(verify_supported_version(&study(false), &ios_client).is_ok());
    }
}
