use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::PolicyError;
use crate::level::AccessLevel;
use crate::resolver::resolve;

/// On-disk shape of the group mapping file.
///
/// ```yaml
/// mappings:
///   admins: Admin
///   members: FullMember
/// default_level: NoAccess
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupMappingDocument {
    #[serde(default)]
    pub mappings: HashMap<String, String>,
    #[serde(default)]
    pub default_level: Option<String>,
}

/// Group name to access level table, loaded once at start-up and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMappingPolicy {
    mappings: HashMap<String, AccessLevel>,
    default_level: AccessLevel,
}

impl GroupMappingPolicy {
    pub fn new<I, G>(mappings: I, default_level: AccessLevel) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = (G, AccessLevel)>,
        G: Into<String>,
    {
        let mappings: HashMap<String, AccessLevel> = mappings
            .into_iter()
            .map(|(group, level)| (group.into(), level))
            .collect();
        if mappings.is_empty() {
            return Err(PolicyError::EmptyMappings);
        }
        Ok(Self {
            mappings,
            default_level,
        })
    }

    pub fn from_document(document: GroupMappingDocument) -> Result<Self, PolicyError> {
        let mappings = document
            .mappings
            .into_iter()
            .map(|(group, level_name)| {
                let level = parse_level_name(&level_name, &group);
                (group, level)
            })
            .collect::<Vec<_>>();

        let default_level = match document.default_level.as_deref() {
            None | Some("") => AccessLevel::NoAccess,
            Some(name) => parse_level_name(name, "default_level"),
        };

        Self::new(mappings, default_level)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, PolicyError> {
        let document: GroupMappingDocument = serde_yaml::from_str(raw)?;
        Self::from_document(document)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let policy = Self::from_yaml_str(&raw)?;
        info!(
            path = %path.display(),
            mappings = policy.len(),
            default_level = %policy.default_level,
            "loaded group mapping policy"
        );
        Ok(policy)
    }

    pub fn level_for_group(&self, group: &str) -> Option<AccessLevel> {
        self.mappings.get(group).copied()
    }

    pub fn default_level(&self) -> AccessLevel {
        self.default_level
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn resolve<G: AsRef<str>>(&self, groups: &[G]) -> AccessLevel {
        resolve(groups, self)
    }
}

fn parse_level_name(name: &str, context: &str) -> AccessLevel {
    match AccessLevel::recognize(name) {
        Some(level) => level,
        None => {
            warn!(level = name, entry = context, "unknown access level in group mapping; treating as NoAccess");
            AccessLevel::from_config_name(name)
        }
    }
}
