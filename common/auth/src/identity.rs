use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a subject at the identity provider.
///
/// Kept distinct from email addresses so cache keys and lookups cannot mix the two.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Provider primary keys are numeric; anything else was minted locally.
    pub fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.parse::<i64>().is_ok()
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Stable member id for identities that arrive without a provider id.
///
/// `{prefix}-` followed by the first four bytes of MD5(email) in upper-case hex.
pub fn member_id_from_email(prefix: &str, email: &str) -> SubjectId {
    let digest = Md5::digest(email.as_bytes());
    SubjectId(format!("{prefix}-{}", hex::encode_upper(&digest[..4])))
}

/// Free-form membership attributes; parsed by whoever renders them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Profile returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub subject_id: SubjectId,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// In the order the provider returned them; resolution depends on it.
    pub groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub membership: MembershipMetadata,
}

impl IdentityRecord {
    pub fn new(subject_id: impl Into<SubjectId>, email: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            email: email.into(),
            display_name: String::new(),
            username: None,
            groups: Vec::new(),
            avatar: None,
            membership: MembershipMetadata::default(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_membership(mut self, membership: MembershipMetadata) -> Self {
        self.membership = membership;
        self
    }

    /// First letter of the first and last name, upper-cased.
    pub fn initials(&self) -> String {
        let parts: Vec<&str> = self.display_name.split_whitespace().collect();
        let mut initials = String::new();
        if let Some(first) = parts.first().and_then(|p| p.chars().next()) {
            initials.push(first);
        }
        if parts.len() > 1 {
            if let Some(last) = parts.last().and_then(|p| p.chars().next()) {
                initials.push(last);
            }
        }
        initials.to_uppercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("identity not found")]
    NotFound,
    #[error("identity provider unavailable: {0}")]
    Transient(String),
}

/// Read access to the identity provider.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn lookup_by_id(&self, subject_id: &SubjectId) -> Result<IdentityRecord, LookupError>;

    async fn lookup_by_email(&self, email: &str) -> Result<IdentityRecord, LookupError>;
}
