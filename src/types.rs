/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Administrative roles a platform account can hold
/// Ordinary study participants hold no roles at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Developer,
    Researcher,
    /// Scoped to a single organization, unlike Admin/Superadmin
    OrgAdmin,
    Worker,
    Admin,
    Superadmin,
}

impl Role {
    /// Roles that may act on any organization's accounts
    pub const UNSCOPED_ADMIN: &'static [Role] = &[Role::Admin, Role::Superadmin];
}

/// How widely a participant has agreed to share their study data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingScope {
    #[default]
    NoSharing,
    SponsorsAndPartners,
    AllQualifiedResearchers,
}

/// Lifecycle state of a durable account record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Unverified,
    #[default]
    Enabled,
    Disabled,
}
