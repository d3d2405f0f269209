pub mod authentik;
pub mod authenticator;
pub mod cache;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod identity;

pub use authentik::AuthentikClient;
pub use authenticator::{AuthMethod, AuthenticatedMember, Authenticator};
pub use cache::{CachedIdentityLookup, DEFAULT_IDENTITY_TTL};
pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use extractors::{parse_groups, ProxyAuth, ProxyIdentity, TokenAuth};
pub use guards::ensure_member_level;
pub use identity::{
    member_id_from_email, IdentityLookup, IdentityRecord, LookupError, MembershipMetadata,
    SubjectId,
};
