use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use crate::errors::StoreError;
use crate::inquiry::types::{Inquiry, InquiryFilter, InquiryStatus, Resolution, Transition};

/// Durable home of inquiry records.
///
/// `resolve` is the only state-changing operation after creation and must be
/// an atomic compare-and-set from `pending`: of any number of concurrent
/// callers, at most one observes [`Transition::Applied`].
#[async_trait]
pub trait InquiryStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Inquiry>, StoreError>;

    async fn list(&self, filter: &InquiryFilter) -> Result<Vec<Inquiry>, StoreError>;

    /// Pending inquiries whose TTL has elapsed at `now`.
    async fn pending_expired(&self, now: i64) -> Result<Vec<Inquiry>, StoreError>;

    /// Store a freshly created inquiry. Returns false without writing when
    /// the id is already taken; an existing record is never overwritten.
    async fn insert(&self, inquiry: Inquiry) -> Result<bool, StoreError>;

    async fn resolve(&self, id: &str, resolution: Resolution) -> Result<Transition, StoreError>;
}

/// In-memory inquiry store.
///
/// The map lock is only held to find or insert an entry; the per-inquiry
/// mutex serializes check-and-set on a single record, so unrelated inquiries
/// never contend.
#[derive(Debug, Default)]
pub struct MemoryInquiryStore {
    entries: RwLock<HashMap<String, Arc<Mutex<Inquiry>>>>,
}

impl MemoryInquiryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &str) -> Option<Arc<Mutex<Inquiry>>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    async fn snapshot(&self) -> Vec<Inquiry> {
        let entries: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(entry.lock().await.clone());
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

#[async_trait]
impl InquiryStore for MemoryInquiryStore {
    async fn get(&self, id: &str) -> Result<Option<Inquiry>, StoreError> {
        match self.entry(id) {
            Some(entry) => Ok(Some(entry.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &InquiryFilter) -> Result<Vec<Inquiry>, StoreError> {
        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(self
            .snapshot()
            .await
            .into_iter()
            .filter(|i| filter.matches(i))
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn pending_expired(&self, now: i64) -> Result<Vec<Inquiry>, StoreError> {
        Ok(self
            .snapshot()
            .await
            .into_iter()
            .filter(|i| i.is_pending() && i.is_expired(now))
            .collect())
    }

    async fn insert(&self, inquiry: Inquiry) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.entry(inquiry.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(inquiry)));
                Ok(true)
            }
        }
    }

    async fn resolve(&self, id: &str, resolution: Resolution) -> Result<Transition, StoreError> {
        let Some(entry) = self.entry(id) else {
            return Ok(Transition::Missing);
        };

        let mut inquiry = entry.lock().await;
        if inquiry.status != InquiryStatus::Pending {
            return Ok(Transition::Rejected(inquiry.status));
        }
        resolution.apply(&mut inquiry);
        Ok(Transition::Applied(inquiry.clone()))
    }
}
