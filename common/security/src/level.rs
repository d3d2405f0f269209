use serde::{Serialize, Serializer};
use tracing::warn;

use crate::SecurityError;

/// Ordered authorization tiers. Comparisons follow declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AccessLevel {
    #[default]
    NoAccess,
    LimitedVolunteer,
    FullMember,
    Staff,
    Admin,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 5] = [
        AccessLevel::NoAccess,
        AccessLevel::LimitedVolunteer,
        AccessLevel::FullMember,
        AccessLevel::Staff,
        AccessLevel::Admin,
    ];

    /// Parse a level name as written in the group mapping file.
    ///
    /// Matching is exact. Anything unrecognized maps to `NoAccess` so that a typo in
    /// configuration can never grant access.
    pub fn from_config_name(name: &str) -> Self {
        match name {
            "NoAccess" => AccessLevel::NoAccess,
            "LimitedVolunteer" => AccessLevel::LimitedVolunteer,
            "FullMember" => AccessLevel::FullMember,
            "Staff" => AccessLevel::Staff,
            "Admin" => AccessLevel::Admin,
            _ => AccessLevel::NoAccess,
        }
    }

    /// Like [`AccessLevel::from_config_name`] but reports whether the name was known.
    pub fn recognize(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.config_name() == name)
    }

    pub fn config_name(&self) -> &'static str {
        match self {
            AccessLevel::NoAccess => "NoAccess",
            AccessLevel::LimitedVolunteer => "LimitedVolunteer",
            AccessLevel::FullMember => "FullMember",
            AccessLevel::Staff => "Staff",
            AccessLevel::Admin => "Admin",
        }
    }

    pub fn at_least(&self, required: AccessLevel) -> bool {
        *self >= required
    }

    pub fn description(&self) -> &'static str {
        match self {
            AccessLevel::NoAccess => "No access",
            AccessLevel::LimitedVolunteer => "Basic workspace access, supervised equipment use",
            AccessLevel::FullMember => "Full workspace access, independent equipment use",
            AccessLevel::Staff => "Staff privileges, equipment training, administrative access",
            AccessLevel::Admin => "Full administrative access",
        }
    }

    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            AccessLevel::NoAccess => &["No access"],
            AccessLevel::LimitedVolunteer => &[
                "Basic workspace access",
                "Supervised 3D printer use",
                "Hand tools access",
                "Common area access",
            ],
            AccessLevel::FullMember => &[
                "Full workspace access",
                "Independent equipment use",
                "3D printer access",
                "Laser cutter access",
                "Electronics workbench",
                "Woodworking tools",
                "24/7 access",
            ],
            AccessLevel::Staff => &[
                "All member permissions",
                "Equipment training authorization",
                "New member orientation",
                "Maintenance access",
                "Administrative tools",
            ],
            AccessLevel::Admin => &[
                "Full administrative access",
                "System configuration",
                "User management",
                "Equipment management",
                "Financial access",
            ],
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AccessLevel::NoAccess => "No Access",
            AccessLevel::LimitedVolunteer => "Limited Volunteer",
            AccessLevel::FullMember => "Full Member",
            AccessLevel::Staff => "Staff",
            AccessLevel::Admin => "Admin",
        };
        f.write_str(label)
    }
}

impl Serialize for AccessLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.config_name())
    }
}

pub fn ensure_level(actual: AccessLevel, required: AccessLevel) -> Result<(), SecurityError> {
    if actual.at_least(required) {
        return Ok(());
    }
    warn!(actual = %actual, required = %required, "access_level_check_failed");
    Err(SecurityError::InsufficientLevel { required, actual })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_totally_ordered() {
        assert!(AccessLevel::NoAccess < AccessLevel::LimitedVolunteer);
        assert!(AccessLevel::LimitedVolunteer < AccessLevel::FullMember);
        assert!(AccessLevel::FullMember < AccessLevel::Staff);
        assert!(AccessLevel::Staff < AccessLevel::Admin);
    }

    #[test]
    fn unknown_names_fail_closed() {
        assert_eq!(AccessLevel::from_config_name("Admin"), AccessLevel::Admin);
        assert_eq!(AccessLevel::from_config_name("admin"), AccessLevel::NoAccess);
        assert_eq!(AccessLevel::from_config_name("SuperAdmin"), AccessLevel::NoAccess);
        assert_eq!(AccessLevel::from_config_name(""), AccessLevel::NoAccess);
        assert_eq!(AccessLevel::recognize("superuser"), None);
    }

    #[test]
    fn config_names_round_trip() {
        for level in AccessLevel::ALL {
            assert_eq!(AccessLevel::from_config_name(level.config_name()), level);
            assert_eq!(AccessLevel::recognize(level.config_name()), Some(level));
        }
    }

    #[test]
    fn ensure_level_checks_at_least() {
        assert!(ensure_level(AccessLevel::Staff, AccessLevel::FullMember).is_ok());
        assert!(ensure_level(AccessLevel::FullMember, AccessLevel::FullMember).is_ok());
        let err = ensure_level(AccessLevel::LimitedVolunteer, AccessLevel::Staff)
            .expect_err("below required");
        assert!(matches!(
            err,
            SecurityError::InsufficientLevel {
                required: AccessLevel::Staff,
                actual: AccessLevel::LimitedVolunteer
            }
        ));
    }

    #[test]
    fn display_uses_human_labels() {
        assert_eq!(AccessLevel::LimitedVolunteer.to_string(), "Limited Volunteer");
        assert_eq!(AccessLevel::default(), AccessLevel::NoAccess);
    }
}
