//! Shared builders for unit tests: a seeded in-memory collaborator set and
//! RequestContext shorthands.

use crate::context::RequestContext;
use crate::services::{AuthService, OrgService, SessionUpdateService};
use crate::session::{ClientInfo, UserSession};
use crate::stores::memory;
use crate::stores::{Account, AccountStore, AppState, SignIn};
use crate::types::Role;

/// The demo wiring doubles as the test fixture: one study
/// ("cardio-study", participant IP locking off, Android minimum build 5),
/// a required subpopulation, and three accounts - alice (consented
/// participant), rita (researcher), oscar (org-admin of org-a).
pub struct Fixture {
    pub state: AppState,
}

pub fn fixture() -> Fixture {
    Fixture {
        state: memory::demo_state(),
    }
}

impl Fixture {
    pub fn auth_service(&self) -> AuthService {
        AuthService::new(&self.state)
    }

    pub fn session_service(&self) -> SessionUpdateService {
        SessionUpdateService::new(&self.state)
    }

    pub fn org_service(&self) -> OrgService {
        OrgService::new(&self.state)
    }

    pub async fn sign_in_participant(&self) -> UserSession {
        self.sign_in(participant_sign_in()).await
    }

    pub async fn sign_in_researcher(&self) -> UserSession {
        self.sign_in(SignIn {
            app_id: "cardio-study".into(),
            email: "rita@example.com".into(),
            password: "password2".into(),
        })
        .await
    }

    async fn sign_in(&self, sign_in: SignIn) -> UserSession {
        self.auth_service()
            .sign_in(&context_with_ip("1.1.1.1"), &sign_in)
            .await
            .expect("fixture sign-in should succeed")
    }

    /// The durable record behind a session, for asserting write-through
    pub async fn account_of(&self, session: &UserSession) -> Option<Account> {
        self.state
            .accounts
            .get_account(&session.app_id, session.user_id())
            .await
            .expect("memory store never fails")
    }
}

pub fn participant_sign_in() -> SignIn {
    SignIn {
        app_id: "cardio-study".into(),
        email: "alice@example.com".into(),
        password: "password1".into(),
    }
}

pub fn context_with_ip(ip: &str) -> RequestContext {
    RequestContext::builder()
        .with_request_id("test-request")
        .with_caller_ip_address(Some(ip.to_string()))
        .build()
}

pub fn context_with_languages(languages: &[&str]) -> RequestContext {
    context_with_ip("1.1.1.1")
        .to_builder()
        .with_caller_languages(languages.iter().map(|l| l.to_string()).collect())
        .build()
}

pub fn context_with_client(user_agent: &str) -> RequestContext {
    context_with_ip("1.1.1.1")
        .to_builder()
        .with_caller_client_info(ClientInfo::parse(user_agent))
        .build()
}

pub fn context_with_role(role: Role, org: Option<&str>) -> RequestContext {
    context_with_ip("1.1.1.1")
        .to_builder()
        .with_caller_user_id("caller")
        .with_caller_roles([role].into())
        .with_caller_org_membership(org.map(str::to_string))
        .build()
}
