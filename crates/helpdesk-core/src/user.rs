//! Authenticated user identity as returned by the help-desk API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::HelpdeskError;

/// Role of a help-desk account.
///
/// The backend has historically stored roles in mixed case (`"ADMIN"`,
/// `"admin"`), so parsing is case-insensitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    /// Full administrative access.
    Admin,
    /// Support staff who work tickets.
    Technician,
    /// End user who opens tickets.
    User,
}

impl Role {
    /// Wire representation (lowercase).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Technician => "technician",
            Self::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = HelpdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "technician" => Ok(Self::Technician),
            "user" => Ok(Self::User),
            other => Err(HelpdeskError::InvalidRole(other.to_owned())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = HelpdeskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_owned()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Backend user ID.
    pub id: u64,
    /// Login name.
    pub username: String,
    /// Account role.
    pub role: Role,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Department the user belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Whether the account is enabled.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl User {
    /// Build a minimal user record.
    #[must_use]
    pub fn new(id: u64, username: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            role,
            full_name: None,
            email: None,
            department: None,
            is_active: true,
        }
    }

    /// Admin accounts.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Technicians and admins (anyone who can work tickets).
    #[must_use]
    pub fn is_technician(&self) -> bool {
        matches!(self.role, Role::Technician | Role::Admin)
    }

    /// Plain end users.
    #[must_use]
    pub fn is_plain_user(&self) -> bool {
        self.role == Role::User
    }

    /// Name to show in the UI: full name when known, else the username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Technician".parse::<Role>().unwrap(), Role::Technician);
        assert_eq!(" user ".parse::<Role>().unwrap(), Role::User);
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert_matches!("guest".parse::<Role>(), Err(HelpdeskError::InvalidRole(r)) if r == "guest");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Technician).unwrap(), "\"technician\"");
    }

    #[test]
    fn user_deserializes_from_auth_me_payload() {
        let json = serde_json::json!({
            "id": 3,
            "username": "maria",
            "email": "maria@example.com",
            "full_name": "Maria Souza",
            "department": "TI",
            "phone": null,
            "role": "ADMIN",
            "is_active": true,
            "is_ldap_user": false,
            "created_at": "2024-01-01T00:00:00"
        });
        let user: User = serde_json::from_value(json).unwrap();
        assert_eq!(user.id, 3);
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.display_name(), "Maria Souza");
    }

    #[test]
    fn user_missing_optional_fields() {
        let user: User =
            serde_json::from_str(r#"{"id":1,"username":"joao","role":"user"}"#).unwrap();
        assert!(user.is_active);
        assert!(user.full_name.is_none());
        assert_eq!(user.display_name(), "joao");
    }

    #[test]
    fn role_helpers() {
        let admin = User::new(1, "a", Role::Admin);
        let tech = User::new(2, "t", Role::Technician);
        let user = User::new(3, "u", Role::User);

        assert!(admin.is_admin() && admin.is_technician() && !admin.is_plain_user());
        assert!(!tech.is_admin() && tech.is_technician() && !tech.is_plain_user());
        assert!(!user.is_admin() && !user.is_technician() && user.is_plain_user());
    }
}
