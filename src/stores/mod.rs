//! Collaborator contracts for the gateway.
//!
//! Persistence, identity and consent evaluation are external systems; this
//! crate only consumes them through these traits. `memory` holds the
//! implementations used for local serving and the test suite.

pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::criteria::CriteriaContext;
use crate::session::{ConsentStatus, UserSession};
use crate::types::{AccountStatus, Role, SharingScope};

/// Per-study security policy consumed by the authorization gate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Study {
    pub identifier: String,
    pub name: String,
    /// When true, ordinary participants are bound to their sign-in IP.
    /// Privileged accounts are always bound, regardless of this toggle.
    pub participant_ip_locking_enabled: bool,
    /// Minimum supported app build per OS name; absent OS never denies
    pub min_supported_app_versions: BTreeMap<String, u32>,
    /// Vocabulary of data groups assignable in this study
    pub data_groups: BTreeSet<String>,
}

/// Durable account record, the source of truth behind a session's
/// participant snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub app_id: String,
    pub email: Option<String>,
    pub health_code: Option<String>,
    pub status: AccountStatus,
    pub roles: BTreeSet<Role>,
    pub org_membership: Option<String>,
    pub substudy_ids: BTreeSet<String>,
    pub data_groups: BTreeSet<String>,
    pub languages: Vec<String>,
    pub time_zone: Option<String>,
    pub sharing_scope: SharingScope,
    pub external_id: Option<String>,
}

/// Field-level account mutation, applied by the account store inside a
/// scoped read-modify-write. Only the narrow session-patchable attributes
/// are expressible; everything else goes through full account edits owned
/// by other systems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPatch {
    pub languages: Option<Vec<String>>,
    pub time_zone: Option<String>,
    pub sharing_scope: Option<SharingScope>,
    pub external_id: Option<String>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.languages.is_none()
            && self.time_zone.is_none()
            && self.sharing_scope.is_none()
            && self.external_id.is_none()
    }

    pub fn apply_to(&self, account: &mut Account) {
        if let Some(languages) = &self.languages {
            account.languages = languages.clone();
        }
        if let Some(time_zone) = &self.time_zone {
            account.time_zone = Some(time_zone.clone());
        }
        if let Some(scope) = self.sharing_scope {
            account.sharing_scope = scope;
        }
        if let Some(external_id) = &self.external_id {
            account.external_id = Some(external_id.clone());
        }
    }

    /// The same patch applied to a session's cached participant snapshot,
    /// keeping it aligned with the durable record it mirrors
    pub fn apply_to_participant(&self, participant: &mut crate::session::StudyParticipant) {
        if let Some(languages) = &self.languages {
            participant.languages = languages.clone();
        }
        if let Some(time_zone) = &self.time_zone {
            participant.time_zone = Some(time_zone.clone());
        }
        if let Some(scope) = self.sharing_scope {
            participant.sharing_scope = scope;
        }
        if let Some(external_id) = &self.external_id {
            participant.external_id = Some(external_id.clone());
        }
    }
}

/// Credentials presented at sign-in
#[derive(Debug, Clone, Deserialize)]
pub struct SignIn {
    pub app_id: String,
    pub email: String,
    pub password: String,
}

/// Reauthentication request: trades a reauth token for a fresh session
#[derive(Debug, Clone, Deserialize)]
pub struct Reauthentication {
    pub app_id: String,
    pub email: String,
    pub reauth_token: String,
}

/// Failures from collaborator round trips. Credential rejection is a
/// distinct outcome so the gateway can answer 401 rather than 500.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuthenticationBackend: Send + Sync {
    /// Look up the session for an opaque token; unknown tokens are a miss,
    /// not an error
    async fn get_session(&self, token: &str) -> Result<Option<UserSession>, StoreError>;

    /// Credential check; on success returns a fresh authenticated session
    /// with a rotated token and the caller's IP captured
    async fn sign_in(
        &self,
        sign_in: &SignIn,
        ip_address: Option<&str>,
    ) -> Result<UserSession, StoreError>;

    /// Trade a reauthentication token for a recreated session
    async fn reauthenticate(
        &self,
        reauth: &Reauthentication,
        ip_address: Option<&str>,
    ) -> Result<UserSession, StoreError>;

    /// Invalidate the session on the identity side; cache removal is the
    /// caller's responsibility
    async fn sign_out(&self, session: &UserSession) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(
        &self,
        app_id: &str,
        account_id: &str,
    ) -> Result<Option<Account>, StoreError>;

    /// Scoped read-modify-write: the store loads the latest record, applies
    /// the patch, persists, and returns the updated account. Failures leave
    /// the record unmodified.
    async fn update_account(
        &self,
        app_id: &str,
        account_id: &str,
        patch: AccountPatch,
    ) -> Result<Account, StoreError>;
}

#[async_trait]
pub trait StudyStore: Send + Sync {
    async fn get_study(&self, identifier: &str) -> Result<Option<Study>, StoreError>;
}

#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Persist a session object under its token, replacing any prior value
    async fn set_user_session(&self, session: &UserSession) -> Result<(), StoreError>;

    async fn remove_user_session(&self, token: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ConsentEvaluator: Send + Sync {
    /// Compute per-subpopulation consent status for the given criteria
    async fn get_consent_statuses(
        &self,
        criteria: &CriteriaContext,
    ) -> Result<BTreeMap<String, ConsentStatus>, StoreError>;

    /// Drop any derived state held for a participant so the next
    /// evaluation sees fresh attributes
    async fn invalidate(&self, health_code: &str);
}

/// The collaborator handles shared across the router
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn AuthenticationBackend>,
    pub cache: Arc<dyn SessionCache>,
    pub accounts: Arc<dyn AccountStore>,
    pub studies: Arc<dyn StudyStore>,
    pub consents: Arc<dyn ConsentEvaluator>,
}
