//! Organization scoping for elevated-but-scoped callers.

use std::sync::Arc;

use crate::auth::AuthError;
use crate::context::RequestContext;
use crate::stores::{Account, AccountStore, AppState};
use crate::types::Role;

pub struct OrgService {
    accounts: Arc<dyn AccountStore>,
}

impl OrgService {
    pub fn new(state: &AppState) -> Self {
        Self {
            accounts: state.accounts.clone(),
        }
    }

    /// Load a target account on behalf of an elevated caller.
    ///
    /// Unscoped admins (admin, superadmin) may act on any account. An
    /// org-admin may only act on accounts whose organization membership
    /// strictly equals their own; a target with no membership at all is
    /// out of scope. Note the existence leak: a missing target is reported
    /// as not-found before the caller's scope is considered.
    pub async fn verify_acting_on_org_member(
        &self,
        ctx: &RequestContext,
        app_id: &str,
        target_account_id: &str,
    ) -> Result<Account, AuthError> {
        let account = self
            .accounts
            .get_account(app_id, target_account_id)
            .await?
            .ok_or(AuthError::EntityNotFound("Account"))?;

        if ctx.is_in_role(Role::UNSCOPED_ADMIN) {
            return Ok(account);
        }

        if ctx.is_in_role(&[Role::OrgAdmin]) {
            if let (Some(caller_org), Some(target_org)) =
                (ctx.caller_org_membership(), account.org_membership.as_deref())
            {
                if caller_org == target_org {
                    return Ok(account);
                }
            }
        }

        tracing::warn!(
            caller = ctx.caller_user_id().unwrap_or("anonymous"),
            target = target_account_id,
            "org-scoped access refused"
        );
        Err(AuthError::Unauthorized)
    }
}
