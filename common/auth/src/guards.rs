use common_security::{ensure_level, AccessLevel};

use crate::authenticator::AuthenticatedMember;
use crate::error::AuthResult;

/// Reject members whose resolved level is below `required`.
pub fn ensure_member_level(member: &AuthenticatedMember, required: AccessLevel) -> AuthResult<()> {
    ensure_level(member.level, required)?;
    Ok(())
}
