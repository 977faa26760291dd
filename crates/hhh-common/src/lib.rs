use serde::{Deserialize, Serialize};
use std::fmt;

pub mod logging;

// ============================================================================
// Roles
// ============================================================================

/// Portal role carried on the user record.
///
/// The backend sends roles as lowercase strings. Anything other than the
/// three known roles is kept verbatim in `Other` and never satisfies a
/// role-gated route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Student,
    Hr,
    Admin,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Student => "student",
            Role::Hr => "hr",
            Role::Admin => "admin",
            Role::Other(value) => value,
        }
    }

    /// Parse a role name, case-insensitively for the known roles
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Role::Student,
            "hr" => Role::Hr,
            "admin" => Role::Admin,
            _ => Role::Other(value.to_string()),
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Other(String::new())
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::parse(&value)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::parse(value)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// User Record
// ============================================================================

/// Cached profile of the signed-in user.
///
/// Field names match the backend's camelCase JSON. Fields this client does
/// not interpret are kept in `extra` so a stored record round-trips intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_hr_approved: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserRecord {
    pub fn new(role: Role, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role,
            email: email.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    pub fn with_hr_approved(mut self, approved: bool) -> Self {
        self.is_hr_approved = approved;
        self
    }
}

// ============================================================================
// Dashboards
// ============================================================================

pub const STUDENT_DASHBOARD_PATH: &str = "/portal/student/dashboard";
pub const HR_DASHBOARD_PATH: &str = "/portal/hr/dashboard";
pub const ADMIN_DASHBOARD_PATH: &str = "/portal/admin/dashboard";

/// Landing path for a role. Unrecognized roles land on the student dashboard.
pub fn get_dashboard_path_by_role(role: &Role) -> &'static str {
    match role {
        Role::Admin => ADMIN_DASHBOARD_PATH,
        Role::Hr => HR_DASHBOARD_PATH,
        Role::Student | Role::Other(_) => STUDENT_DASHBOARD_PATH,
    }
}
