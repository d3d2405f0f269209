use tracing::trace;

use crate::level::AccessLevel;
use crate::policy::GroupMappingPolicy;

/// Reduce a subject's groups to a single access level.
///
/// Groups are checked in the order given and the first one present in the policy decides
/// the level, even if a later group maps higher. The caller controls precedence by how it
/// orders the groups. Names are compared exactly (case-sensitive, untrimmed). When nothing
/// matches, including for an empty list, the policy default applies.
pub fn resolve<G: AsRef<str>>(groups: &[G], policy: &GroupMappingPolicy) -> AccessLevel {
    for group in groups {
        let group = group.as_ref();
        if let Some(level) = policy.level_for_group(group) {
            trace!(group, level = %level, "group matched access policy");
            return level;
        }
    }
    policy.default_level()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(default_level: AccessLevel) -> GroupMappingPolicy {
        GroupMappingPolicy::new(
            [
                ("staff-group", AccessLevel::Staff),
                ("member-group", AccessLevel::FullMember),
                ("admin-group", AccessLevel::Admin),
                ("volunteers", AccessLevel::LimitedVolunteer),
            ],
            default_level,
        )
        .expect("policy")
    }

    #[test]
    fn empty_groups_resolve_to_default() {
        for default_level in AccessLevel::ALL {
            let groups: [&str; 0] = [];
            assert_eq!(resolve(&groups, &policy(default_level)), default_level);
        }
    }

    #[test]
    fn unmapped_group_resolves_to_default() {
        let policy = policy(AccessLevel::LimitedVolunteer);
        assert_eq!(
            resolve(&["unmapped-group"], &policy),
            AccessLevel::LimitedVolunteer
        );
    }

    #[test]
    fn first_match_wins_over_higher_privilege() {
        let policy = policy(AccessLevel::NoAccess);
        assert_eq!(
            resolve(&["staff-group", "member-group"], &policy),
            AccessLevel::Staff
        );
        assert_eq!(
            resolve(&["member-group", "admin-group"], &policy),
            AccessLevel::FullMember
        );
        assert_eq!(
            resolve(&["unmapped", "volunteers", "admin-group"], &policy),
            AccessLevel::LimitedVolunteer
        );
    }

    #[test]
    fn matching_is_exact() {
        let policy = policy(AccessLevel::NoAccess);
        assert_eq!(resolve(&["Staff-Group"], &policy), AccessLevel::NoAccess);
        assert_eq!(resolve(&[" staff-group"], &policy), AccessLevel::NoAccess);
        assert_eq!(
            resolve(&[String::from("staff-group")], &policy),
            AccessLevel::Staff
        );
    }

    #[test]
    fn policy_resolve_delegates() {
        let policy = policy(AccessLevel::NoAccess);
        assert_eq!(policy.resolve(&["admin-group"]), AccessLevel::Admin);
    }
}
