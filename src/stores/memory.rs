//! In-memory collaborator implementations.
//!
//! These back local serving and the test suite. A deployment wires real
//! identity, account and cache services behind the same traits.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::criteria::CriteriaContext;
use crate::session::{ConsentStatus, StudyParticipant, UserSession};
use crate::stores::{
    Account, AccountPatch, AccountStore, AppState, AuthenticationBackend, ConsentEvaluator,
    Reauthentication, SessionCache, SignIn, StoreError, Study, StudyStore,
};
use crate::types::{AccountStatus, Role, SharingScope};

/// Identity backend and session cache over one shared session map, so a
/// cache patch is immediately visible to the next token lookup
pub struct MemoryAuthStore {
    sessions: RwLock<HashMap<String, UserSession>>,
    credentials: RwLock<HashMap<(String, String), Credential>>,
    accounts: Arc<MemoryAccountStore>,
    consents: Arc<MemoryConsentEvaluator>,
}

#[derive(Clone)]
struct Credential {
    password: String,
    account_id: String,
    reauth_token: Option<String>,
}

impl MemoryAuthStore {
    pub fn new(accounts: Arc<MemoryAccountStore>, consents: Arc<MemoryConsentEvaluator>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            credentials: RwLock::new(HashMap::new()),
            accounts,
            consents,
        }
    }

    pub fn register_credentials(&self, app_id: &str, email: &str, password: &str, account_id: &str) {
        let mut credentials = self.credentials.write().unwrap();
        credentials.insert(
            (app_id.to_string(), email.to_string()),
            Credential {
                password: password.to_string(),
                account_id: account_id.to_string(),
                reauth_token: None,
            },
        );
    }

    async fn create_session(
        &self,
        app_id: &str,
        account_id: &str,
        ip_address: Option<&str>,
    ) -> Result<UserSession, StoreError> {
        let account = self
            .accounts
            .get_account(app_id, account_id)
            .await?
            .ok_or(StoreError::InvalidCredentials)?;
        if account.status == AccountStatus::Disabled {
            return Err(StoreError::AccountDisabled);
        }

        let participant = participant_from(&account);
        let criteria = CriteriaContext {
            app_id: app_id.to_string(),
            user_id: Some(account.id.clone()),
            health_code: account.health_code.clone(),
            client_info: Default::default(),
            languages: account.languages.clone(),
            user_data_groups: account.data_groups.clone(),
            user_substudy_ids: account.substudy_ids.clone(),
        };
        let consent_statuses = self.consents.get_consent_statuses(&criteria).await?;

        Ok(UserSession {
            session_token: Uuid::new_v4().simple().to_string(),
            reauth_token: Some(Uuid::new_v4().simple().to_string()),
            internal_session_id: Uuid::new_v4().simple().to_string(),
            authenticated: true,
            ip_address: ip_address.map(str::to_string),
            app_id: app_id.to_string(),
            participant,
            consent_statuses,
        })
    }
}

fn participant_from(account: &Account) -> StudyParticipant {
    StudyParticipant {
        id: account.id.clone(),
        email: account.email.clone(),
        health_code: account.health_code.clone(),
        roles: account.roles.clone(),
        org_membership: account.org_membership.clone(),
        substudy_ids: account.substudy_ids.clone(),
        data_groups: account.data_groups.clone(),
        languages: account.languages.clone(),
        time_zone: account.time_zone.clone(),
        sharing_scope: account.sharing_scope,
        external_id: account.external_id.clone(),
    }
}

#[async_trait]
impl AuthenticationBackend for MemoryAuthStore {
    async fn get_session(&self, token: &str) -> Result<Option<UserSession>, StoreError> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions.get(token).cloned())
    }

    async fn sign_in(
        &self,
        sign_in: &SignIn,
        ip_address: Option<&str>,
    ) -> Result<UserSession, StoreError> {
        let account_id = {
            let mut credentials = self.credentials.write().unwrap();
            let credential = credentials
                .get_mut(&(sign_in.app_id.clone(), sign_in.email.clone()))
                .ok_or(StoreError::InvalidCredentials)?;
            if credential.password != sign_in.password {
                return Err(StoreError::InvalidCredentials);
            }
            credential.account_id.clone()
        };

        let session = self
            .create_session(&sign_in.app_id, &account_id, ip_address)
            .await?;

        {
            let mut credentials = self.credentials.write().unwrap();
            if let Some(credential) =
                credentials.get_mut(&(sign_in.app_id.clone(), sign_in.email.clone()))
            {
                credential.reauth_token = session.reauth_token.clone();
            }
        }
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(session.session_token.clone(), session.clone());
        Ok(session)
    }

    async fn reauthenticate(
        &self,
        reauth: &Reauthentication,
        ip_address: Option<&str>,
    ) -> Result<UserSession, StoreError> {
        let account_id = {
            let credentials = self.credentials.read().unwrap();
            let credential = credentials
                .get(&(reauth.app_id.clone(), reauth.email.clone()))
                .ok_or(StoreError::InvalidCredentials)?;
            if credential.reauth_token.as_deref() != Some(reauth.reauth_token.as_str()) {
                return Err(StoreError::InvalidCredentials);
            }
            credential.account_id.clone()
        };

        let session = self
            .create_session(&reauth.app_id, &account_id, ip_address)
            .await?;

        {
            let mut credentials = self.credentials.write().unwrap();
            if let Some(credential) =
                credentials.get_mut(&(reauth.app_id.clone(), reauth.email.clone()))
            {
                credential.reauth_token = session.reauth_token.clone();
            }
        }
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(session.session_token.clone(), session.clone());
        Ok(session)
    }

    async fn sign_out(&self, session: &UserSession) -> Result<(), StoreError> {
        {
            let mut sessions = self.sessions.write().unwrap();
            sessions.remove(&session.session_token);
        }
        if let Some(email) = &session.participant.email {
            let mut credentials = self.credentials.write().unwrap();
            if let Some(credential) =
                credentials.get_mut(&(session.app_id.clone(), email.clone()))
            {
                credential.reauth_token = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SessionCache for MemoryAuthStore {
    async fn set_user_session(&self, session: &UserSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(session.session_token.clone(), session.clone());
        Ok(())
    }

    async fn remove_user_session(&self, token: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(token);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<(String, String), Account>>,
}

impl MemoryAccountStore {
    pub fn put_account(&self, account: Account) {
        let mut accounts = self.accounts.write().unwrap();
        accounts.insert((account.app_id.clone(), account.id.clone()), account);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_account(
        &self,
        app_id: &str,
        account_id: &str,
    ) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().unwrap();
        Ok(accounts
            .get(&(app_id.to_string(), account_id.to_string()))
            .cloned())
    }

    async fn update_account(
        &self,
        app_id: &str,
        account_id: &str,
        patch: AccountPatch,
    ) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .get_mut(&(app_id.to_string(), account_id.to_string()))
            .ok_or_else(|| StoreError::Unavailable(format!("no account {}", account_id)))?;
        patch.apply_to(account);
        Ok(account.clone())
    }
}

#[derive(Default)]
pub struct MemoryStudyStore {
    studies: RwLock<HashMap<String, Study>>,
}

impl MemoryStudyStore {
    pub fn put_study(&self, study: Study) {
        let mut studies = self.studies.write().unwrap();
        studies.insert(study.identifier.clone(), study);
    }
}

#[async_trait]
impl StudyStore for MemoryStudyStore {
    async fn get_study(&self, identifier: &str) -> Result<Option<Study>, StoreError> {
        let studies = self.studies.read().unwrap();
        Ok(studies.get(identifier).cloned())
    }
}

/// A consent subpopulation with the light criteria matching the memory
/// evaluator supports: required data groups and an optional language
#[derive(Debug, Clone)]
pub struct Subpopulation {
    pub guid: String,
    pub name: String,
    pub required: bool,
    pub match_data_groups: BTreeSet<String>,
    pub match_language: Option<String>,
}

impl Subpopulation {
    pub fn required(guid: &str, name: &str) -> Subpopulation {
        Subpopulation {
            guid: guid.to_string(),
            name: name.to_string(),
            required: true,
            match_data_groups: BTreeSet::new(),
            match_language: None,
        }
    }

    fn applies_to(&self, criteria: &CriteriaContext) -> bool {
        if !self
            .match_data_groups
            .iter()
            .all(|g| criteria.user_data_groups.contains(g))
        {
            return false;
        }
        match &self.match_language {
            Some(language) => criteria.languages.iter().any(|l| l == language),
            None => true,
        }
    }
}

#[derive(Default)]
pub struct MemoryConsentEvaluator {
    subpopulations: RwLock<HashMap<String, Vec<Subpopulation>>>,
    signatures: RwLock<HashSet<(String, String)>>,
    derived: RwLock<HashMap<String, BTreeMap<String, ConsentStatus>>>,
}

impl MemoryConsentEvaluator {
    pub fn put_subpopulation(&self, app_id: &str, subpopulation: Subpopulation) {
        let mut subpopulations = self.subpopulations.write().unwrap();
        subpopulations
            .entry(app_id.to_string())
            .or_default()
            .push(subpopulation);
    }

    /// Record a signed consent and drop the stale derived entry
    pub fn record_signature(&self, health_code: &str, subpopulation_guid: &str) {
        {
            let mut signatures = self.signatures.write().unwrap();
            signatures.insert((health_code.to_string(), subpopulation_guid.to_string()));
        }
        let mut derived = self.derived.write().unwrap();
        derived.remove(health_code);
    }
}

#[async_trait]
impl ConsentEvaluator for MemoryConsentEvaluator {
    async fn get_consent_statuses(
        &self,
        criteria: &CriteriaContext,
    ) -> Result<BTreeMap<String, ConsentStatus>, StoreError> {
        if let Some(health_code) = &criteria.health_code {
            let derived = self.derived.read().unwrap();
            if let Some(statuses) = derived.get(health_code) {
                return Ok(statuses.clone());
            }
        }

        let subpopulations = self.subpopulations.read().unwrap();
        let signatures = self.signatures.read().unwrap();
        let mut statuses = BTreeMap::new();
        for subpopulation in subpopulations.get(&criteria.app_id).into_iter().flatten() {
            if !subpopulation.applies_to(criteria) {
                continue;
            }
            let signed = criteria.health_code.as_ref().is_some_and(|hc| {
                signatures.contains(&(hc.clone(), subpopulation.guid.clone()))
            });
            statuses.insert(
                subpopulation.guid.clone(),
                ConsentStatus {
                    name: subpopulation.name.clone(),
                    subpopulation_guid: subpopulation.guid.clone(),
                    required: subpopulation.required,
                    consented: signed,
                    signed_most_recent_consent: signed,
                },
            );
        }

        if let Some(health_code) = &criteria.health_code {
            let mut derived = self.derived.write().unwrap();
            derived.insert(health_code.clone(), statuses.clone());
        }
        Ok(statuses)
    }

    async fn invalidate(&self, health_code: &str) {
        let mut derived = self.derived.write().unwrap();
        derived.remove(health_code);
    }
}

/// Wire the memory collaborators together with a demo study so the server
/// is usable out of the box
pub fn demo_state() -> AppState {
    let accounts = Arc::new(MemoryAccountStore::default());
    let studies = Arc::new(MemoryStudyStore::default());
    let consents = Arc::new(MemoryConsentEvaluator::default());
    let auth = Arc::new(MemoryAuthStore::new(accounts.clone(), consents.clone()));

    studies.put_study(Study {
        identifier: "cardio-study".into(),
        name: "Cardio Health Study".into(),
        participant_ip_locking_enabled: false,
        min_supported_app_versions: BTreeMap::from([("Android".to_string(), 5)]),
        data_groups: BTreeSet::from(["pilot".to_string(), "test_user".to_string()]),
    });
    consents.put_subpopulation(
        "cardio-study",
        Subpopulation::required("default-consent", "Cardio Health Consent"),
    );

    let participant = Account {
        id: "alice".into(),
        app_id: "cardio-study".into(),
        email: Some("alice@example.com".into()),
        health_code: Some("hc-alice".into()),
        sharing_scope: SharingScope::NoSharing,
        ..Account::default()
    };
    consents.record_signature("hc-alice", "default-consent");
    accounts.put_account(participant);
    auth.register_credentials("cardio-study", "alice@example.com", "password1", "alice");

    let researcher = Account {
        id: "rita".into(),
        app_id: "cardio-study".into(),
        email: Some("rita@example.com".into()),
        roles: BTreeSet::from([Role::Researcher]),
        ..Account::default()
    };
    accounts.put_account(researcher);
    auth.register_credentials("cardio-study", "rita@example.com", "password2", "rita");

    let org_admin = Account {
        id: "oscar".into(),
        app_id: "cardio-study".into(),
        email: Some("oscar@example.com".into()),
        roles: BTreeSet::from([Role::OrgAdmin]),
        org_membership: Some("org-a".into()),
        ..Account::default()
    };
    accounts.put_account(org_admin);
    auth.register_credentials("cardio-study", "oscar@example.com", "password3", "oscar");

    AppState {
        backend: auth.clone(),
        cache: auth,
        accounts,
        studies,
        consents,
    }
}
