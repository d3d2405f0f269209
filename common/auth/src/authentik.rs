use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::identity::{IdentityLookup, IdentityRecord, LookupError, MembershipMetadata, SubjectId};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity lookups against the Authentik core API.
#[derive(Clone)]
pub struct AuthentikClient {
    client: Client,
    base_url: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct AuthentikUser {
    pk: i64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    attributes: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserListResponse {
    Paginated { results: Vec<AuthentikUser> },
    Bare(Vec<AuthentikUser>),
}

impl UserListResponse {
    fn into_first(self) -> Option<AuthentikUser> {
        match self {
            UserListResponse::Paginated { results } => results.into_iter().next(),
            UserListResponse::Bare(users) => users.into_iter().next(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GroupListResponse {
    #[serde(default)]
    results: Vec<AuthentikGroup>,
}

#[derive(Debug, Deserialize)]
struct AuthentikGroup {
    name: String,
}

impl AuthentikClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url, api_token))
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            api_token: api_token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, LookupError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query);
        if !self.api_token.is_empty() {
            request = request.bearer_auth(&self.api_token);
        }

        let response = request.send().await.map_err(|err| {
            warn!(url = %url, error = %err, "authentik_request_failed");
            LookupError::Transient(err.to_string())
        })?;

        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "authentik_response");
        if status == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound);
        }
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "authentik_unexpected_status");
            return Err(LookupError::Transient(format!("HTTP {status} from {url}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| LookupError::Transient(format!("failed to decode {url}: {err}")))
    }

    async fn groups_for(&self, pk: i64) -> Result<Vec<String>, LookupError> {
        let user = pk.to_string();
        let response: GroupListResponse = self
            .get_json("/api/v3/core/groups/", &[("user", user.as_str())])
            .await
            .map_err(|err| match err {
                // The user exists; a missing group listing is a provider fault.
                LookupError::NotFound => {
                    LookupError::Transient(format!("group listing for user {pk} not found"))
                }
                other => other,
            })?;
        Ok(response.results.into_iter().map(|group| group.name).collect())
    }

    async fn build_record(&self, user: AuthentikUser) -> Result<IdentityRecord, LookupError> {
        let groups = self.groups_for(user.pk).await?;
        let attributes = user.attributes.unwrap_or_default();
        let attr = |key: &str| {
            attributes
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
        };

        let membership = MembershipMetadata {
            member_since: attr("member_since"),
            expiry_date: attr("expiry_date"),
            membership_type: attr("membership_type"),
            status: attr("membership_status"),
        };

        Ok(IdentityRecord {
            subject_id: SubjectId::new(user.pk.to_string()),
            email: user.email,
            display_name: user.name,
            username: Some(user.username).filter(|value| !value.is_empty()),
            groups,
            avatar: user.avatar.filter(|value| !value.is_empty()),
            membership,
        })
    }
}

#[async_trait]
impl IdentityLookup for AuthentikClient {
    async fn lookup_by_id(&self, subject_id: &SubjectId) -> Result<IdentityRecord, LookupError> {
        let path = format!("/api/v3/core/users/{}/", subject_id.as_str());
        let user: AuthentikUser = self.get_json(&path, &[]).await?;
        self.build_record(user).await
    }

    async fn lookup_by_email(&self, email: &str) -> Result<IdentityRecord, LookupError> {
        let response: UserListResponse = self
            .get_json("/api/v3/core/users/", &[("email", email)])
            .await?;
        let user = response.into_first().ok_or(LookupError::NotFound)?;
        self.build_record(user).await
    }
}
