//! Tenant-scoped role hierarchy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// A user's role within one tenant. Ordered by privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Manager,
    Cashier,
    Waiter,
    Kitchen,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Owner,
        Role::Admin,
        Role::Manager,
        Role::Cashier,
        Role::Waiter,
        Role::Kitchen,
        Role::Viewer,
    ];

    pub fn level(&self) -> u8 {
        match self {
            Role::Owner => 100,
            Role::Admin => 90,
            Role::Manager => 70,
            Role::Cashier => 50,
            Role::Waiter => 40,
            Role::Kitchen => 30,
            Role::Viewer => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Cashier => "cashier",
            Role::Waiter => "waiter",
            Role::Kitchen => "kitchen",
            Role::Viewer => "viewer",
        }
    }

    /// Strictly higher level only: peers cannot manage each other.
    pub fn can_manage(&self, other: Role) -> bool {
        self.level() > other.level()
    }

    pub fn can_assign(&self, other: Role) -> bool {
        self.level() > other.level()
    }

    /// Whether this role meets a minimum requirement (inclusive).
    pub fn is_at_least(&self, minimum: Role) -> bool {
        self.level() >= minimum.level()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_strictly_ordered() {
        let levels: Vec<u8> = Role::ALL.iter().map(Role::level).collect();
        assert!(levels.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_can_manage_matches_level_comparison() {
        for a in Role::ALL {
            for b in Role::ALL {
                assert_eq!(a.can_manage(b), a.level() > b.level(), "{} vs {}", a, b);
                assert_eq!(a.can_assign(b), a.can_manage(b));
            }
            assert!(!a.can_manage(a));
        }
    }

    #[test]
    fn test_manager_cannot_assign_manager_or_above() {
        assert!(Role::Manager.can_assign(Role::Waiter));
        assert!(!Role::Manager.can_assign(Role::Manager));
        assert!(!Role::Manager.can_assign(Role::Admin));
        assert!(!Role::Owner.can_manage(Role::Owner));
    }

    #[test]
    fn test_parse_round_trips_and_rejects_unknown() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!(
            "superuser".parse::<Role>(),
            Err(UnknownRole("superuser".to_string()))
        );
        assert!("Owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_serde_rejects_unknown_role() {
        assert_eq!(serde_json::to_string(&Role::Kitchen).unwrap(), "\"kitchen\"");
        assert!(serde_json::from_str::<Role>("\"janitor\"").is_err());
    }
}
