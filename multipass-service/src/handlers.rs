use axum::extract::State;
use axum::http::{header::HOST, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use common_auth::{
    ensure_member_level, AuthError, AuthMethod, AuthenticatedMember, IdentityRecord, ProxyAuth,
    TokenAuth,
};
use common_security::AccessLevel;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::membership::{derive_membership, MembershipInfo};
use crate::metrics::ServiceMetrics;
use crate::AppState;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

#[derive(Debug, Serialize)]
pub struct MemberProfile {
    pub member_id: String,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub initials: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub groups: Vec<String>,
    pub access_level: AccessLevel,
}

impl MemberProfile {
    fn new(record: &IdentityRecord, level: AccessLevel) -> Self {
        Self {
            member_id: record.subject_id.to_string(),
            email: record.email.clone(),
            display_name: record.display_name.clone(),
            username: record.username.clone(),
            initials: record.initials(),
            avatar: record.avatar.clone(),
            groups: record.groups.clone(),
            access_level: level,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: MemberProfile,
    pub membership: MembershipInfo,
}

#[derive(Debug, Serialize)]
pub struct TokenLinkResponse {
    pub token: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct CardResponse {
    pub makerspace_name: String,
    pub logo_url: String,
    pub member: MemberProfile,
    pub membership: MembershipInfo,
    pub qr_data: String,
    pub generated_at: DateTime<Utc>,
    /// Set when the card was opened through a shared link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_expires_at: Option<DateTime<Utc>>,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn current_user(
    State(state): State<AppState>,
    auth: Result<ProxyAuth, AuthError>,
) -> Result<Json<UserResponse>, AuthError> {
    let ProxyAuth(member) = observe(&state.metrics, AuthMethod::Proxy, auth)?;
    let record = state.authenticator.refresh_identity(&member.record).await;
    let level = state.authenticator.policy().resolve(record.groups.as_slice());
    let membership = derive_membership(&record, level, Utc::now());
    Ok(Json(UserResponse {
        user: MemberProfile::new(&member.record, member.level),
        membership,
    }))
}

pub async fn generate_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    auth: Result<ProxyAuth, AuthError>,
) -> Result<Json<TokenLinkResponse>, AuthError> {
    let ProxyAuth(member) = observe(&state.metrics, AuthMethod::Proxy, auth)?;
    let token = state
        .authenticator
        .issue_access_token(&member.record)
        .inspect_err(|err| error!(error = %err, "token_issue_failed"))?;
    state.metrics.token_issued();

    let base = public_base_url(state.config.public_base_url.as_deref(), &headers);
    let url = format!("{base}/public/card?token={}", urlencoding::encode(&token));
    info!(subject_id = %member.record.subject_id, "card_link_generated");
    Ok(Json(TokenLinkResponse { token, url }))
}

pub async fn public_card(
    State(state): State<AppState>,
    auth: Result<TokenAuth, AuthError>,
) -> Result<Json<CardResponse>, AuthError> {
    let TokenAuth { claims, member } = observe(&state.metrics, AuthMethod::Token, auth)?;
    let mut response = card(&state, &member.record, member.level, &member);
    response.link_expires_at = Some(state.authenticator.codec().expires_at(&claims));
    Ok(Json(response))
}

pub async fn member_card(
    State(state): State<AppState>,
    auth: Result<ProxyAuth, AuthError>,
) -> Result<Json<CardResponse>, AuthError> {
    let ProxyAuth(member) = observe(&state.metrics, AuthMethod::Proxy, auth)?;
    ensure_member_level(&member, AccessLevel::LimitedVolunteer)?;
    let record = state.authenticator.refresh_identity(&member.record).await;
    let level = state.authenticator.policy().resolve(record.groups.as_slice());
    Ok(Json(card(&state, &record, level, &member)))
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "metrics_render_failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// `record` and `membership_level` describe the membership; the profile comes from `member`.
fn card(
    state: &AppState,
    record: &IdentityRecord,
    membership_level: AccessLevel,
    member: &AuthenticatedMember,
) -> CardResponse {
    let now = Utc::now();
    CardResponse {
        makerspace_name: state.config.makerspace_name.clone(),
        logo_url: state.config.makerspace_logo_url.clone(),
        member: MemberProfile::new(&member.record, member.level),
        membership: derive_membership(record, membership_level, now),
        qr_data: format!(
            "MEMBER:{}:{}",
            member.record.subject_id, member.record.email
        ),
        generated_at: now,
        link_expires_at: None,
    }
}

fn observe<T>(
    metrics: &ServiceMetrics,
    method: AuthMethod,
    result: Result<T, AuthError>,
) -> Result<T, AuthError> {
    match &result {
        Ok(_) => metrics.auth_attempt(method.as_str(), "success"),
        Err(err) => {
            warn!(method = method.as_str(), code = err.code(), "authentication_failed");
            metrics.auth_attempt(method.as_str(), &err.code().to_ascii_lowercase());
        }
    }
    result
}

fn public_base_url(configured: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(base) = configured {
        return base.to_string();
    }
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let Some(host) = host else {
        return String::new();
    };
    let scheme = headers
        .get(FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| *value == "https" || *value == "http")
        .unwrap_or("http");
    format!("{scheme}://{host}")
}
