//! Role codes and the downstream masking levels they imply.

use serde::{Deserialize, Serialize};

/// Fixed role set. Permission mappings live in `services::policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Dispatcher,
    Finance,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Dispatcher => "dispatcher",
            Role::Finance => "finance",
            Role::Viewer => "viewer",
        }
    }

    /// Roles allowed on privileged `/admin` routes at all.
    pub fn is_admin_grade(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "dispatcher" => Ok(Role::Dispatcher),
            "finance" => Ok(Role::Finance),
            "viewer" => Ok(Role::Viewer),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-level redaction applied by response serialization downstream.
/// The resolver only answers the question; it never masks anything itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskingLevel {
    None,
    Partial,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [
            Role::Owner,
            Role::Admin,
            Role::Dispatcher,
            Role::Finance,
            Role::Viewer,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn only_owner_and_admin_are_admin_grade() {
        assert!(Role::Owner.is_admin_grade());
        assert!(Role::Admin.is_admin_grade());
        assert!(!Role::Dispatcher.is_admin_grade());
        assert!(!Role::Finance.is_admin_grade());
        assert!(!Role::Viewer.is_admin_grade());
    }
}
