pub mod gate;
pub mod token;

use crate::session::UserSession;
use crate::stores::StoreError;

/// Denial outcomes of the authorization pass. These are raised, never
/// retried; the HTTP layer maps each kind to a distinct status code.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing/blank token, unknown token, unauthenticated session, or an
    /// IP-lock violation. All deliberately indistinguishable in the response.
    #[error("not signed in")]
    NotAuthenticated,

    /// Authenticated but lacking a required role or org scope
    #[error("caller does not have permission to access this service")]
    Unauthorized,

    /// An unconsented ordinary participant hit a consent-gated operation;
    /// carries the session so the response can list what remains to sign
    #[error("consent is required before accessing this service")]
    ConsentRequired(Box<UserSession>),

    #[error("{0} not found")]
    EntityNotFound(&'static str),

    /// Client build below the study's minimum for its OS
    #[error("this app version is no longer supported, please update")]
    UnsupportedVersion,

    /// Collaborator round-trip failure, surfaced as a generic server error
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidCredentials => AuthError::NotAuthenticated,
            StoreError::AccountDisabled => AuthError::Unauthorized,
            StoreError::Unavailable(_) => AuthError::Store(err),
        }
    }
}
