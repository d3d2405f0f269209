use std::sync::Arc;

use chrono::{DateTime, Utc};
use common_security::{ensure_level, AccessLevel, GroupMappingPolicy};
use common_token::{TokenClaims, TokenCodec};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::extractors::ProxyIdentity;
use crate::identity::{member_id_from_email, IdentityLookup, IdentityRecord, SubjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Proxy,
    Token,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Proxy => "proxy",
            AuthMethod::Token => "token",
        }
    }
}

/// A member whose identity and access level have been established for this request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedMember {
    pub record: IdentityRecord,
    pub level: AccessLevel,
    pub method: AuthMethod,
}

impl AuthenticatedMember {
    pub fn require(&self, required: AccessLevel) -> AuthResult<()> {
        ensure_level(self.level, required).map_err(AuthError::from)
    }
}

/// Ties the token codec, group policy and identity provider together.
pub struct Authenticator {
    codec: TokenCodec,
    policy: Arc<GroupMappingPolicy>,
    lookup: Arc<dyn IdentityLookup>,
    config: AuthConfig,
}

impl Authenticator {
    pub fn new(
        codec: TokenCodec,
        policy: Arc<GroupMappingPolicy>,
        lookup: Arc<dyn IdentityLookup>,
    ) -> Self {
        Self {
            codec,
            policy,
            lookup,
            config: AuthConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AuthConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn policy(&self) -> &GroupMappingPolicy {
        &self.policy
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn issue_access_token(&self, record: &IdentityRecord) -> AuthResult<String> {
        self.issue_access_token_at(record, Utc::now())
    }

    pub fn issue_access_token_at(
        &self,
        record: &IdentityRecord,
        issued_at: DateTime<Utc>,
    ) -> AuthResult<String> {
        let subject = if record.subject_id.is_empty() {
            record.email.as_str()
        } else {
            record.subject_id.as_str()
        };
        let token = self
            .codec
            .issue_at(subject, &record.email, issued_at)
            .map_err(AuthError::Issue)?;
        info!(subject_id = %subject, "access_token_issued");
        Ok(token)
    }

    /// Verify `token`, look its subject up at the provider and resolve the level from the
    /// provider's current groups.
    pub async fn authenticate_by_token(
        &self,
        token: &str,
    ) -> AuthResult<(TokenClaims, AuthenticatedMember)> {
        self.authenticate_by_token_at(token, Utc::now()).await
    }

    pub async fn authenticate_by_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<(TokenClaims, AuthenticatedMember)> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = self.codec.verify_at(token, now).map_err(|err| {
            warn!(error = %err, "access_token_rejected");
            AuthError::from(err)
        })?;

        let subject_id = SubjectId::new(claims.subject_id());
        let record = if subject_id.is_numeric() {
            match self.lookup.lookup_by_id(&subject_id).await {
                Ok(record) => record,
                Err(err) => {
                    debug!(subject_id = %subject_id, error = %err, "id_lookup_failed_trying_email");
                    self.lookup.lookup_by_email(claims.email()).await?
                }
            }
        } else {
            self.lookup.lookup_by_email(claims.email()).await?
        };

        let level = self.policy.resolve(record.groups.as_slice());
        debug!(subject_id = %record.subject_id, level = %level, "token_authenticated");
        let member = AuthenticatedMember {
            record,
            level,
            method: AuthMethod::Token,
        };
        Ok((claims, member))
    }

    /// Re-read `record` from the identity provider, keeping it as-is when the provider
    /// cannot answer.
    pub async fn refresh_identity(&self, record: &IdentityRecord) -> IdentityRecord {
        let refreshed = if record.subject_id.is_numeric() {
            self.lookup.lookup_by_id(&record.subject_id).await
        } else {
            self.lookup.lookup_by_email(&record.email).await
        };
        match refreshed {
            Ok(fresh) => fresh,
            Err(err) => {
                debug!(subject_id = %record.subject_id, error = %err, "identity_refresh_failed");
                record.clone()
            }
        }
    }

    pub fn authenticate_proxy(&self, identity: ProxyIdentity) -> AuthResult<AuthenticatedMember> {
        if !self.config.trusted_proxy_headers {
            return Err(AuthError::UntrustedProxy);
        }

        let subject_id = match identity.uid {
            Some(uid) => SubjectId::new(uid),
            None => member_id_from_email(&self.config.member_id_prefix, &identity.email),
        };
        let display_name = identity
            .name
            .clone()
            .or_else(|| identity.username.clone())
            .unwrap_or_else(|| identity.email.clone());

        let level = self.policy.resolve(identity.groups.as_slice());
        let record = IdentityRecord {
            subject_id,
            email: identity.email,
            display_name,
            username: identity.username,
            groups: identity.groups,
            avatar: None,
            membership: Default::default(),
        };
        debug!(subject_id = %record.subject_id, level = %level, "proxy_authenticated");
        Ok(AuthenticatedMember {
            record,
            level,
            method: AuthMethod::Proxy,
        })
    }
}
