use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts, Query};
use axum::http::{request::Parts, HeaderMap};
use common_token::TokenClaims;
use serde::Deserialize;

use crate::authenticator::{AuthenticatedMember, Authenticator};
use crate::error::{AuthError, AuthResult};

pub const EMAIL_HEADER: &str = "X-Authentik-Email";
pub const NAME_HEADER: &str = "X-Authentik-Name";
pub const USERNAME_HEADER: &str = "X-Authentik-Username";
pub const UID_HEADER: &str = "X-Authentik-Uid";
pub const GROUPS_HEADER: &str = "X-Authentik-Groups";

/// Identity asserted by the forward-auth proxy in front of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyIdentity {
    pub email: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub uid: Option<String>,
    pub groups: Vec<String>,
}

impl ProxyIdentity {
    pub fn from_headers(headers: &HeaderMap) -> AuthResult<Self> {
        let email = header_str(headers, EMAIL_HEADER).ok_or(AuthError::MissingIdentity)?;
        Ok(Self {
            email,
            name: header_str(headers, NAME_HEADER),
            username: header_str(headers, USERNAME_HEADER),
            uid: header_str(headers, UID_HEADER),
            groups: header_str(headers, GROUPS_HEADER)
                .map(|raw| parse_groups(&raw))
                .unwrap_or_default(),
        })
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Split a group header, keeping the order the proxy sent.
///
/// Authentik joins groups with `|`; comma separation is accepted when no `|` is present.
pub fn parse_groups(raw: &str) -> Vec<String> {
    let separator = if raw.contains('|') { '|' } else { ',' };
    raw.split(separator)
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Member authenticated from trusted proxy headers.
#[derive(Debug, Clone)]
pub struct ProxyAuth(pub AuthenticatedMember);

#[async_trait]
impl<S> FromRequestParts<S> for ProxyAuth
where
    Arc<Authenticator>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticator = Arc::<Authenticator>::from_ref(state);
        if !authenticator.config().trusted_proxy_headers {
            return Err(AuthError::UntrustedProxy);
        }

        let identity = ProxyIdentity::from_headers(&parts.headers)?;
        authenticator.authenticate_proxy(identity).map(Self)
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Member authenticated from a `token` query parameter.
#[derive(Debug, Clone)]
pub struct TokenAuth {
    pub claims: TokenClaims,
    pub member: AuthenticatedMember,
}

#[async_trait]
impl<S> FromRequestParts<S> for TokenAuth
where
    Arc<Authenticator>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticator = Arc::<Authenticator>::from_ref(state);
        let token = token_from_query(parts)?;
        let (claims, member) = authenticator.authenticate_by_token(&token).await?;
        Ok(Self { claims, member })
    }
}

fn token_from_query(parts: &Parts) -> AuthResult<String> {
    let Query(query) =
        Query::<TokenQuery>::try_from_uri(&parts.uri).map_err(|_| AuthError::MissingToken)?;
    query
        .token
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}
