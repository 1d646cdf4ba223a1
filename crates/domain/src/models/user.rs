//! User domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::jwt::RoleClaim;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Represents a user account in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    /// Cohort (class/section) the user belongs to, if any.
    pub cohort_id: Option<Uuid>,
    /// Opt-in flag for scheduled exports. Defaults to false at creation and
    /// is only ever flipped by the user themselves.
    pub auto_export_consent: bool,
    pub created_at: DateTime<Utc>,
}

/// User role enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Student,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "STUDENT",
            UserRole::Admin => "ADMIN",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STUDENT" => Ok(UserRole::Student),
            "ADMIN" => Ok(UserRole::Admin),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<RoleClaim> for UserRole {
    fn from(claim: RoleClaim) -> Self {
        match claim {
            RoleClaim::Student => UserRole::Student,
            RoleClaim::Admin => UserRole::Admin,
        }
    }
}

/// A user considered for an export run.
///
/// Snapshot of the fields the orchestration layer needs: identity for the
/// worker payload, contact details for the audit ledger, cohort name for
/// batching, and the consent flag for the scheduled-export gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCandidate {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub cohort_name: Option<String>,
    pub auto_export_consent: bool,
}

impl ExportCandidate {
    /// The consent gate: returns the stored opt-in flag.
    ///
    /// Absent consent means ineligible (fail-closed). Only consulted for
    /// scheduled runs; a manual request is its own consent.
    pub fn is_eligible_for_auto_export(&self) -> bool {
        self.auto_export_consent
    }
}
