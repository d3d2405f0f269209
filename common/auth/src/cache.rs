use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::identity::{IdentityLookup, IdentityRecord, LookupError, SubjectId};

pub const DEFAULT_IDENTITY_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    record: IdentityRecord,
    expires_at: Instant,
}

/// Read-through TTL cache in front of an [`IdentityLookup`].
///
/// Only successful lookups are stored. Email lookups are stored under the subject id of
/// the record they returned, so a later id lookup for the same member is served locally.
pub struct CachedIdentityLookup<L> {
    inner: L,
    ttl: Duration,
    entries: RwLock<HashMap<SubjectId, CacheEntry>>,
}

impl<L> CachedIdentityLookup<L> {
    pub fn new(inner: L) -> Self {
        Self::with_ttl(inner, DEFAULT_IDENTITY_TTL)
    }

    pub fn with_ttl(inner: L, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, subject_id: &SubjectId) -> Option<IdentityRecord> {
        self.get_at(subject_id, Instant::now())
    }

    fn get_at(&self, subject_id: &SubjectId, now: Instant) -> Option<IdentityRecord> {
        let guard = self.entries.read().expect("rwlock poisoned");
        guard
            .get(subject_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.record.clone())
    }

    pub fn insert(&self, subject_id: SubjectId, record: IdentityRecord) {
        let entry = CacheEntry {
            record,
            expires_at: Instant::now() + self.ttl,
        };
        let mut guard = self.entries.write().expect("rwlock poisoned");
        guard.insert(subject_id, entry);
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.entries.write().expect("rwlock poisoned");
        let before = guard.len();
        guard.retain(|_, entry| entry.expires_at > now);
        before - guard.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("rwlock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<L> IdentityLookup for CachedIdentityLookup<L>
where
    L: IdentityLookup,
{
    async fn lookup_by_id(&self, subject_id: &SubjectId) -> Result<IdentityRecord, LookupError> {
        if let Some(record) = self.get(subject_id) {
            debug!(subject_id = %subject_id, "identity_cache_hit");
            return Ok(record);
        }

        let record = self.inner.lookup_by_id(subject_id).await?;
        self.insert(subject_id.clone(), record.clone());
        Ok(record)
    }

    async fn lookup_by_email(&self, email: &str) -> Result<IdentityRecord, LookupError> {
        let record = self.inner.lookup_by_email(email).await?;
        if !record.subject_id.is_empty() {
            self.insert(record.subject_id.clone(), record.clone());
        }
        Ok(record)
    }
}
