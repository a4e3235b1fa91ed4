//! Per-(company, user) assignment mapping cache
//!
//! Keyed `companyKey::emailKey`. Each entry carries its own TTL window and
//! single-flight gate, so a burst for one user collapses into one fetch while
//! different users load in parallel. Entries expire faster than the reference
//! collections: assignments churn when admins re-map brands, and a stale
//! mapping mis-populates task type pickers.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::api::TaskApi;
use crate::error::Result;
use crate::normalize;
use crate::refcache::slot::CacheSlot;
use crate::types::AssignmentMap;
use crate::util;

pub struct MappingCache {
    api: Arc<dyn TaskApi>,
    entries: DashMap<String, Arc<CacheSlot<AssignmentMap>>>,
    ttl: Duration,
}

impl MappingCache {
    pub fn new(api: Arc<dyn TaskApi>, ttl: Duration) -> Self {
        MappingCache {
            api,
            entries: DashMap::new(),
            ttl,
        }
    }

    fn slot(&self, key: String) -> Arc<CacheSlot<AssignmentMap>> {
        self.entries
            .entry(key)
            .or_insert_with(|| Arc::new(CacheSlot::new(self.ttl)))
            .value()
            .clone()
    }

    /// Mapping for one (company, user) pair. `email` keys the cache entry,
    /// `user_id` is what the authority's fetch wants.
    pub async fn ensure(
        &self,
        company_name: &str,
        email: &str,
        user_id: &str,
        force: bool,
    ) -> Result<AssignmentMap> {
        let slot = self.slot(util::mapping_key(company_name, email));
        let api = self.api.clone();
        let company = company_name.to_string();
        let user = user_id.to_string();
        slot.ensure(force, move || async move {
            let raw = api.fetch_assignments(&company, &user).await?;
            Ok(normalize::assignment(&raw))
        })
        .await
    }

    /// Snapshot without loading.
    pub fn peek(&self, company_name: &str, email: &str) -> Option<AssignmentMap> {
        self.entries
            .get(&util::mapping_key(company_name, email))
            .and_then(|slot| slot.peek())
    }

    /// Drop one entry; the next `ensure` for that pair refetches.
    pub fn invalidate(&self, company_name: &str, email: &str) {
        let key = util::mapping_key(company_name, email);
        if self.entries.remove(&key).is_some() {
            log::debug!("RefCache: invalidated mapping {}", key);
        }
    }

    /// Drop every entry. Used on actor switch and bulk assignment updates.
    pub fn invalidate_all(&self) {
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            log::debug!("RefCache: cleared {} mapping entr(ies)", count);
        }
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
