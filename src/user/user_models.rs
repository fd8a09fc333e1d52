use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::appointment::ParseEnumError;

/// Shown when a teacher lookup fails.
pub const UNKNOWN_TEACHER: &str = "Unknown Teacher";
/// Shown when a student lookup fails.
pub const UNKNOWN_STUDENT: &str = "Student Name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            _ => Err(ParseEnumError {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// Accounts start `NotUpdated` and must finish setup on first login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountStatus {
    #[default]
    NotUpdated,
    Updated,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::NotUpdated => "not-updated",
            AccountStatus::Updated => "updated",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "not-updated" => Ok(AccountStatus::NotUpdated),
            "updated" => Ok(AccountStatus::Updated),
            _ => Err(ParseEnumError {
                kind: "account status",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub grade_level: Option<String>,
    pub account_status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Admin accounts are created complete; everyone else finishes setup once.
    pub fn needs_account_setup(&self) -> bool {
        self.role != Role::Admin && self.account_status == AccountStatus::NotUpdated
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Falls back to `placeholder` when the profile is missing or has no name.
pub fn display_name_or(user: Option<&User>, placeholder: &str) -> String {
    match user.map(User::display_name) {
        Some(name) if !name.is_empty() => name,
        _ => placeholder.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub grade_level: Option<String>,
}
