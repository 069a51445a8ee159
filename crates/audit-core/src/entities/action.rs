//! Action type - what kind of operation an audit event records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Create,
    Read,
    Update,
    Delete,
    LoginSuccess,
    LoginFailed,
    Logout,
    Export,
    AccessDenied,
    Purge,
}

impl ActionType {
    /// Every action type, in declaration order
    pub const ALL: [ActionType; 10] = [
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::LoginSuccess,
        Self::LoginFailed,
        Self::Logout,
        Self::Export,
        Self::AccessDenied,
        Self::Purge,
    ];

    /// Wire / column representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::Logout => "LOGOUT",
            Self::Export => "EXPORT",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::Purge => "PURGE",
        }
    }

    /// Record-level actions must name the entity type they touched
    pub const fn requires_target(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Read | Self::Update | Self::Delete | Self::Export
        )
    }

    /// Check if this action mutates a watched entity
    pub const fn is_mutation(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownActionType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_str() {
        for action in ActionType::ALL {
            assert_eq!(action.as_str().parse::<ActionType>().unwrap(), action);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("login_failed".parse::<ActionType>().unwrap(), ActionType::LoginFailed);
        assert!("TELEPORT".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&ActionType::AccessDenied).unwrap();
        assert_eq!(json, "\"ACCESS_DENIED\"");
    }

    #[test]
    fn test_requires_target() {
        assert!(ActionType::Export.requires_target());
        assert!(ActionType::Read.requires_target());
        assert!(!ActionType::LoginFailed.requires_target());
        assert!(!ActionType::Purge.requires_target());
    }
}
