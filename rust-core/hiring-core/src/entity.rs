//! # Domain Entities
//!
//! Plain records for users, permissions and their assignments. Actors are
//! referenced by user id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who created, last changed and deleted a record, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditTrail {
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Id of the creating user
    pub created_by: Option<String>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Id of the last modifying user
    pub updated_by: Option<String>,
    /// Deletion time; `None` while the record is live
    pub deleted_at: Option<DateTime<Utc>>,
    /// Id of the deleting user
    pub deleted_by: Option<String>,
}

impl AuditTrail {
    /// Trail for a record created at `at` by `actor`
    #[must_use]
    pub fn created(at: DateTime<Utc>, actor: Option<String>) -> Self {
        Self {
            created_at: at,
            created_by: actor.clone(),
            updated_at: at,
            updated_by: actor,
            deleted_at: None,
            deleted_by: None,
        }
    }

    /// Whether the record has been soft-deleted
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct User {
    /// User id
    pub id: String,
    /// Given name
    pub first_name: String,
    /// Middle name, empty when absent
    pub middle_name: String,
    /// Family name
    pub last_name: String,
    /// Login email
    pub email: String,
    /// Never serialized
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    /// Age in years
    pub age: u8,
    /// Self-reported gender
    pub gender: String,
    /// Preferred language tag
    pub language: String,
    /// Account type (candidate, recruiter, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Account status
    pub status: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Deletion time; `None` while the account is live
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether the account has been soft-deleted
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Single grantable capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Permission {
    /// Permission id (e.g. `vacancy.publish`)
    pub id: String,
    /// Human readable description
    pub description: String,
    /// Change history
    #[serde(flatten)]
    pub audit: AuditTrail,
}

/// Named set of permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PermissionGroup {
    /// Group id
    pub id: String,
    /// Human readable description
    pub description: String,
    /// Change history
    #[serde(flatten)]
    pub audit: AuditTrail,
}

/// Permission granted directly to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PermissionAssignment {
    /// Grantee user id
    pub user_id: String,
    /// Granted permission id
    pub permission_id: String,
    /// Grant time
    pub assigned_at: DateTime<Utc>,
    /// Id of the granting user
    pub assigned_by: Option<String>,
    /// Revocation time
    pub deleted_at: Option<DateTime<Utc>>,
    /// Id of the revoking user
    pub deleted_by: Option<String>,
}

impl PermissionAssignment {
    /// Whether the grant has been revoked
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Membership of a user in a permission group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PermissionGroupAssignment {
    /// Group id
    pub permission_group_id: String,
    /// Member user id
    pub user_id: String,
    /// Change history
    #[serde(flatten)]
    pub audit: AuditTrail,
}
