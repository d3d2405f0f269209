use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use common_auth::{
    AuthConfig, Authenticator, IdentityLookup, IdentityRecord, LookupError, MembershipMetadata,
    SubjectId,
};
use common_security::GroupMappingPolicy;
use common_token::{TokenCodec, TokenSecret};
use multipass_service::config::ServiceConfig;
use multipass_service::metrics::ServiceMetrics;
use multipass_service::AppState;
use tempfile::NamedTempFile;

pub const TEST_SECRET: &str = "integration-test-secret";

const POLICY_YAML: &str = r#"
mappings:
  admins: Admin
  staff: Staff
  members: FullMember
  volunteers: LimitedVolunteer
default_level: NoAccess
"#;

#[derive(Default)]
pub struct StubDirectory {
    records: HashMap<String, IdentityRecord>,
    offline: bool,
}

impl StubDirectory {
    pub fn with_record(mut self, record: IdentityRecord) -> Self {
        self.records.insert(record.subject_id.to_string(), record);
        self
    }

    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl IdentityLookup for StubDirectory {
    async fn lookup_by_id(&self, subject_id: &SubjectId) -> Result<IdentityRecord, LookupError> {
        if self.offline {
            return Err(LookupError::Transient("directory offline".into()));
        }
        self.records
            .get(subject_id.as_str())
            .cloned()
            .ok_or(LookupError::NotFound)
    }

    async fn lookup_by_email(&self, email: &str) -> Result<IdentityRecord, LookupError> {
        if self.offline {
            return Err(LookupError::Transient("directory offline".into()));
        }
        self.records
            .values()
            .find(|record| record.email == email)
            .cloned()
            .ok_or(LookupError::NotFound)
    }
}

pub fn ada() -> IdentityRecord {
    IdentityRecord::new("42", "ada@example.com")
        .with_display_name("Ada Lovelace")
        .with_groups(["members", "annual-members"])
        .with_membership(MembershipMetadata {
            member_since: Some("2020-01-15".into()),
            membership_type: Some("Founding Member".into()),
            ..Default::default()
        })
}

pub fn codec() -> TokenCodec {
    TokenCodec::new(TokenSecret::new(TEST_SECRET).expect("secret"))
}

pub fn build_state(directory: StubDirectory, trusted_proxy_headers: bool) -> Result<AppState> {
    let mut file = NamedTempFile::new()?;
    file.write_all(POLICY_YAML.as_bytes())?;
    let policy = GroupMappingPolicy::load(file.path())?;

    let authenticator = Authenticator::new(codec(), Arc::new(policy), Arc::new(directory))
        .with_config(AuthConfig::new().with_trusted_proxy_headers(trusted_proxy_headers));

    let config = ServiceConfig {
        token_secret: TEST_SECRET.to_string(),
        public_base_url: Some("https://card.example.com".to_string()),
        trusted_proxy_headers,
        ..ServiceConfig::default()
    };

    Ok(AppState {
        authenticator: Arc::new(authenticator),
        config: Arc::new(config),
        metrics: Arc::new(ServiceMetrics::new()?),
    })
}
