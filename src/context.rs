//! Request-scoped caller context.
//!
//! One immutable RequestContext is built per inbound request and travels
//! through the request extensions; it is never stored globally. Outside of
//! any request the canonical empty instance stands in, so attribute reads
//! always succeed.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::json;

use crate::session::{ClientInfo, UserSession};
use crate::types::Role;

/// Immutable snapshot of the caller for one request
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    caller_app_id: Option<String>,
    caller_user_id: Option<String>,
    caller_roles: BTreeSet<Role>,
    caller_org_membership: Option<String>,
    caller_substudy_ids: BTreeSet<String>,
    caller_ip_address: Option<String>,
    caller_client_info: ClientInfo,
    caller_languages: Vec<String>,
    metrics: Metrics,
}

impl RequestContext {
    /// The fixed instance used outside of any request
    pub fn empty() -> RequestContext {
        RequestContext::builder().with_request_id("none").build()
    }

    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Start a fresh builder carrying over every current attribute,
    /// used when the gate absorbs session identity mid-request
    pub fn to_builder(&self) -> RequestContextBuilder {
        RequestContextBuilder {
            request_id: Some(self.request_id.clone()),
            caller_app_id: self.caller_app_id.clone(),
            caller_user_id: self.caller_user_id.clone(),
            caller_roles: self.caller_roles.clone(),
            caller_org_membership: self.caller_org_membership.clone(),
            caller_substudy_ids: self.caller_substudy_ids.clone(),
            caller_ip_address: self.caller_ip_address.clone(),
            caller_client_info: self.caller_client_info.clone(),
            caller_languages: self.caller_languages.clone(),
            metrics: Some(self.metrics.clone()),
        }
    }

    /// Rebuild this context from a freshly authorized session. This is the
    /// only point at which session-derived identity enters the context.
    pub fn with_session(&self, session: &UserSession) -> RequestContext {
        self.metrics.set_session_id(&session.internal_session_id);
        self.metrics.set_user_id(session.user_id());
        self.metrics.set_app_id(&session.app_id);
        self.to_builder()
            .with_caller_app_id(&session.app_id)
            .with_caller_user_id(session.user_id())
            .with_caller_roles(session.participant.roles.clone())
            .with_caller_org_membership(session.participant.org_membership.clone())
            .with_caller_substudy_ids(session.participant.substudy_ids.clone())
            .build()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn caller_app_id(&self) -> Option<&str> {
        self.caller_app_id.as_deref()
    }

    pub fn caller_user_id(&self) -> Option<&str> {
        self.caller_user_id.as_deref()
    }

    pub fn caller_roles(&self) -> &BTreeSet<Role> {
        &self.caller_roles
    }

    pub fn caller_org_membership(&self) -> Option<&str> {
        self.caller_org_membership.as_deref()
    }

    pub fn caller_substudy_ids(&self) -> &BTreeSet<String> {
        &self.caller_substudy_ids
    }

    pub fn caller_ip_address(&self) -> Option<&str> {
        self.caller_ip_address.as_deref()
    }

    pub fn caller_client_info(&self) -> &ClientInfo {
        &self.caller_client_info
    }

    pub fn caller_languages(&self) -> &[String] {
        &self.caller_languages
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// An administrator is any caller holding at least one role
    pub fn is_administrator(&self) -> bool {
        !self.caller_roles.is_empty()
    }

    pub fn is_in_role(&self, roles: &[Role]) -> bool {
        roles.is_empty() || roles.iter().any(|r| self.caller_roles.contains(r))
    }
}

#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    request_id: Option<String>,
    caller_app_id: Option<String>,
    caller_user_id: Option<String>,
    caller_roles: BTreeSet<Role>,
    caller_org_membership: Option<String>,
    caller_substudy_ids: BTreeSet<String>,
    caller_ip_address: Option<String>,
    caller_client_info: ClientInfo,
    caller_languages: Vec<String>,
    metrics: Option<Metrics>,
}

impl RequestContextBuilder {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_caller_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.caller_app_id = Some(app_id.into());
        self
    }

    pub fn with_caller_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.caller_user_id = Some(user_id.into());
        self
    }

    pub fn with_caller_roles(mut self, roles: BTreeSet<Role>) -> Self {
        self.caller_roles = roles;
        self
    }

    pub fn with_caller_org_membership(mut self, org: Option<String>) -> Self {
        self.caller_org_membership = org;
        self
    }

    pub fn with_caller_substudy_ids(mut self, substudy_ids: BTreeSet<String>) -> Self {
        self.caller_substudy_ids = substudy_ids;
        self
    }

    pub fn with_caller_ip_address(mut self, ip: Option<String>) -> Self {
        self.caller_ip_address = ip;
        self
    }

    pub fn with_caller_client_info(mut self, client_info: ClientInfo) -> Self {
        self.caller_client_info = client_info;
        self
    }

    pub fn with_caller_languages(mut self, languages: Vec<String>) -> Self {
        self.caller_languages = languages;
        self
    }

    pub fn build(self) -> RequestContext {
        let request_id = self
            .request_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        RequestContext {
            metrics: self.metrics.unwrap_or_else(|| Metrics::new(&request_id)),
            request_id,
            caller_app_id: self.caller_app_id,
            caller_user_id: self.caller_user_id,
            caller_roles: self.caller_roles,
            caller_org_membership: self.caller_org_membership,
            caller_substudy_ids: self.caller_substudy_ids,
            caller_ip_address: self.caller_ip_address,
            caller_client_info: self.caller_client_info,
            caller_languages: self.caller_languages,
        }
    }
}

/// Per-request telemetry accumulator, shared by handle
///
/// Collects the identifiers resolved during the authorization pass and
/// emits a single structured record when the request finishes.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<Mutex<MetricsRecord>>,
}

#[derive(Debug)]
struct MetricsRecord {
    request_id: String,
    session_id: Option<String>,
    user_id: Option<String>,
    app_id: Option<String>,
    status: Option<u16>,
    start: Instant,
    emitted: bool,
}

impl Metrics {
    pub fn new(request_id: &str) -> Metrics {
        Metrics {
            inner: Arc::new(Mutex::new(MetricsRecord {
                request_id: request_id.to_string(),
                session_id: None,
                user_id: None,
                app_id: None,
                status: None,
                start: Instant::now(),
                emitted: false,
            })),
        }
    }

    pub fn set_session_id(&self, session_id: &str) {
        if let Ok(mut record) = self.inner.lock() {
            record.session_id = Some(session_id.to_string());
        }
    }

    pub fn set_user_id(&self, user_id: &str) {
        if let Ok(mut record) = self.inner.lock() {
            record.user_id = Some(user_id.to_string());
        }
    }

    pub fn set_app_id(&self, app_id: &str) {
        if let Ok(mut record) = self.inner.lock() {
            record.app_id = Some(app_id.to_string());
        }
    }

    pub fn set_status(&self, status: u16) {
        if let Ok(mut record) = self.inner.lock() {
            record.status = Some(status);
        }
    }

    /// Emit the accumulated record once; later calls are no-ops
    pub fn emit(&self) {
        let Ok(mut record) = self.inner.lock() else {
            return;
        };
        if record.emitted {
            return;
        }
        record.emitted = true;
        let payload = json!({
            "request_id": record.request_id,
            "session_id": record.session_id,
            "user_id": record.user_id,
            "app_id": record.app_id,
            "status": record.status,
            "elapsed_ms": record.start.elapsed().as_millis() as u64,
        });
        tracing::info!(target: "cohort_api::metrics", "{}", payload);
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
            internal_session_id: "internal-id".into(),
            authenticated: true,
            ip_address: Some("10.0.0.1".into()),
            app_id: "cardio-study".into(),
            participant: StudyParticipant {
                id: "user-1".into(),
                roles: [Role::Researcher].into(),
                org_membership: Some("org-a".into()),
                substudy_ids: ["substudy-1".to_string()].into(),
                ..StudyParticipant::default()
            },
            consent_statuses: Default::default(),
        }
    }

    #[test]
    fn empty_context_reads_never_fail() {
        let ctx = RequestContext::empty();
        assert_eq!(ctx.request_id(), "none");
        assert_eq!(ctx.caller_user_id(), None);
        assert!(ctx.caller_roles().is_empty());
        assert!(!ctx.is_administrator());
    }

    #[test]
    fn with_session_absorbs_identity_and_keeps_request_attrs() {
        let ctx = RequestContext::builder()
            .with_request_id("req-1")
            .with_caller_ip_address(Some("1.2.3.4".into()))
            .with_caller_languages(vec!["en".into()])
            .build();
        let updated = ctx.with_session(&session());

        assert_eq!(updated.request_id(), "req-1");
        assert_eq!(updated.caller_ip_address(), Some("1.2.3.4"));
        assert_eq!(updated.caller_languages(), ["en".to_string()]);
        assert_eq!(updated.caller_user_id(), Some("user-1"));
        assert_eq!(updated.caller_app_id(), Some("cardio-study"));
        assert_eq!(updated.caller_org_membership(), Some("org-a"));
        assert!(updated.is_administrator());
        assert!(updated.is_in_role(&[Role::Researcher]));
        assert!(!updated.is_in_role(&[Role::Admin]));

        // the original is untouched
        assert_eq!(ctx.caller_user_id(), None);
    }

    #[test]
    fn builder_generates_request_id_when_absent() {
        let ctx = RequestContext::builder().build();
        assert!(!ctx.request_id().is_empty());
        assert_ne!(ctx.request_id(), "none");
    }
}
