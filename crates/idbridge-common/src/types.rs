//! Principal model shared by all connectors
//!
//! Identities and roles are materialised from a backing store on every read.
//! Their lifecycle status fields are derived values, never authoritative
//! state of their own.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// Anything that can be addressed by name or numeric id in a store
pub trait Principal {
    /// Unique principal name
    fn name(&self) -> &str;

    /// Numeric id (uid or gid)
    fn id(&self) -> u32;
}

/// Derived classification of a password's age
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStatusType {
    /// Password must be changed at next login
    NeedsChange,
    /// Maximum age exceeded
    Expired,
    /// Within the warning period before expiry
    NearExpiry,
    /// Minimum age not yet reached, the password cannot be changed
    Locked,
    #[default]
    UpToDate,
}

/// Password aging state, all dates absolute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordStatus {
    /// Date of the last password change
    pub last_change: Option<NaiveDate>,
    /// Date after which the password is expired
    pub expire: Option<NaiveDate>,
    /// Date from which the user is warned about expiry
    pub warn: Option<NaiveDate>,
    /// Date after which an expired password disables the account
    pub disable: Option<NaiveDate>,
    /// Date until which the password may not be changed
    pub lock_until: Option<NaiveDate>,
    /// Explicit "change at next login" flag
    pub must_change: bool,
    /// Computed classification
    pub status: PasswordStatusType,
}

impl PasswordStatus {
    /// Check whether the password is past its maximum age
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.status == PasswordStatusType::Expired
    }
}

/// Derived classification of an account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatusType {
    #[default]
    Active,
    Locked,
    Disabled,
}

/// Account lock/disable state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    /// Account is locked (`!` prefix or explicit lock date)
    pub locked: bool,
    /// Account is disabled because the password expired past its grace period
    pub disabled: bool,
    /// Date the account was locked, when recorded
    pub locked_since: Option<NaiveDate>,
    /// Date the account became (or becomes) disabled
    pub disabled_after: Option<NaiveDate>,
    /// Computed classification
    pub status: AccountStatusType,
}

impl AccountStatus {
    /// Check if the account can be used for authentication
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatusType::Active
    }
}

/// A user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Login name
    pub name: String,
    /// Numeric user id
    pub uid: u32,
    /// Primary group id
    pub gid: u32,
    /// Free-form comment, usually the full name
    pub gecos: String,
    /// Home directory
    pub home: String,
    /// Login shell
    pub shell: String,
    /// Name of the primary group, when it resolves
    pub primary_group: Option<String>,
    /// Names of supplementary groups
    pub groups: Vec<String>,
    /// Password aging, `None` when the store keeps no aging data
    pub password_status: Option<PasswordStatus>,
    /// Lock and disable state
    pub account_status: AccountStatus,
    /// Most recent login, when known
    pub last_login: Option<DateTime<FixedOffset>>,
}

impl Identity {
    /// Create an identity with default attributes
    pub fn new(name: impl Into<String>, uid: u32, gid: u32) -> Self {
        Self {
            name: name.into(),
            uid,
            gid,
            gecos: String::new(),
            home: String::new(),
            shell: String::new(),
            primary_group: None,
            groups: Vec::new(),
            password_status: None,
            account_status: AccountStatus::default(),
            last_login: None,
        }
    }

    /// Check if the identity is locked
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.account_status.locked
    }

    /// Check membership by group name (primary or supplementary)
    #[must_use]
    pub fn is_member_of(&self, group: &str) -> bool {
        self.primary_group.as_deref() == Some(group) || self.groups.iter().any(|g| g == group)
    }
}

impl Principal for Identity {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u32 {
        self.uid
    }
}

/// A group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Group name
    pub name: String,
    /// Numeric group id
    pub gid: u32,
    /// Supplementary members by login name
    pub members: Vec<String>,
}

impl Role {
    /// Create a role without members
    pub fn new(name: impl Into<String>, gid: u32) -> Self {
        Self {
            name: name.into(),
            gid,
            members: Vec::new(),
        }
    }
}

impl Principal for Role {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u32 {
        self.gid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_membership() {
        let mut identity = Identity::new("alice", 1000, 1000);
        identity.primary_group = Some("alice".to_string());
        identity.groups = vec!["wheel".to_string()];
        assert!(identity.is_member_of("alice"));
        assert!(identity.is_member_of("wheel"));
        assert!(!identity.is_member_of("audio"));
        assert!(!identity.is_locked());
    }

    #[test]
    fn test_principal_ids() {
        let identity = Identity::new("bob", 1001, 100);
        let role = Role::new("users", 100);
        assert_eq!(Principal::id(&identity), 1001);
        assert_eq!(Principal::name(&role), "users");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&PasswordStatusType::NearExpiry).unwrap();
        assert_eq!(json, "\"near_expiry\"");
        assert!(AccountStatus::default().is_active());
    }
}
