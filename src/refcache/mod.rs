//! Reference data caches
//!
//! Users, brands, companies and task types change rarely; assignment mappings
//! change on admin action. Each collection sits behind a `CacheSlot` (TTL +
//! single-flight), mappings behind a per-key `MappingCache`. Consumers either
//! `ensure_*` (may load) or `*_snapshot` (never loads — pure read paths like
//! visibility resolution use these).
//!
//! Push deltas land through the `apply_*` methods, which mutate a loaded
//! cache in place and re-stamp its freshness instead of throwing the whole
//! collection away.

pub mod mappings;
pub mod slot;

use std::sync::Arc;

use crate::api::TaskApi;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::normalize;
use crate::types::{AssignmentMap, Brand, Company, TaskTypeRecord, UserRecord};
use crate::util;

use mappings::MappingCache;
use slot::CacheSlot;

pub struct ReferenceCaches {
    api: Arc<dyn TaskApi>,
    users: CacheSlot<Vec<UserRecord>>,
    brands: CacheSlot<Vec<Brand>>,
    companies: CacheSlot<Vec<Company>>,
    task_types: CacheSlot<Vec<TaskTypeRecord>>,
    mappings: MappingCache,
}

impl ReferenceCaches {
    pub fn new(api: Arc<dyn TaskApi>, config: &EngineConfig) -> Self {
        let ttl = config.reference_ttl();
        ReferenceCaches {
            api: api.clone(),
            users: CacheSlot::new(ttl),
            brands: CacheSlot::new(ttl),
            companies: CacheSlot::new(ttl),
            task_types: CacheSlot::new(ttl),
            mappings: MappingCache::new(api, config.mapping_ttl()),
        }
    }

    // ------------------------------------------------------------------
    // Collection loads (TTL + single-flight per collection)
    // ------------------------------------------------------------------

    pub async fn ensure_users(&self, force: bool) -> Result<Vec<UserRecord>> {
        let api = self.api.clone();
        self.users
            .ensure(force, move || async move {
                let raw = api.fetch_users().await?;
                Ok(normalize::users(&raw))
            })
            .await
    }

    pub async fn ensure_brands(&self, force: bool) -> Result<Vec<Brand>> {
        let api = self.api.clone();
        self.brands
            .ensure(force, move || async move {
                let raw = api.fetch_brands().await?;
                Ok(normalize::brands(&raw))
            })
            .await
    }

    pub async fn ensure_companies(&self, force: bool) -> Result<Vec<Company>> {
        let api = self.api.clone();
        self.companies
            .ensure(force, move || async move {
                let raw = api.fetch_companies().await?;
                Ok(normalize::companies(&raw))
            })
            .await
    }

    pub async fn ensure_task_types(&self, force: bool) -> Result<Vec<TaskTypeRecord>> {
        let api = self.api.clone();
        self.task_types
            .ensure(force, move || async move {
                let raw = api.fetch_task_types().await?;
                Ok(normalize::task_types(&raw))
            })
            .await
    }

    // ------------------------------------------------------------------
    // Snapshots (no loading — safe on pure read paths)
    // ------------------------------------------------------------------

    pub fn users_snapshot(&self) -> Vec<UserRecord> {
        self.users.peek().unwrap_or_default()
    }

    /// Commit count of the user directory (full loads and applied deltas).
    /// Scoping resolves roles through the directory, so derived results key
    /// on this to pick up reloads from any path.
    pub fn users_generation(&self) -> u64 {
        self.users.generation()
    }

    pub fn brands_snapshot(&self) -> Vec<Brand> {
        self.brands.peek().unwrap_or_default()
    }

    pub fn companies_snapshot(&self) -> Vec<Company> {
        self.companies.peek().unwrap_or_default()
    }

    pub fn task_types_snapshot(&self) -> Vec<TaskTypeRecord> {
        self.task_types.peek().unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Push deltas
    // ------------------------------------------------------------------

    /// Upsert one user into a loaded cache. Returns false when the cache has
    /// never loaded (the next full load will include the record anyway).
    pub fn apply_user_upserted(&self, user: UserRecord) -> bool {
        self.users
            .apply_update(|list| upsert_by_id(list, user, |u| &u.id))
    }

    pub fn apply_user_deleted(&self, user_id: &str) -> bool {
        let mut removed = false;
        self.users.apply_update(|list| {
            removed = remove_by_id(list, user_id, |u| &u.id);
        });
        removed
    }

    pub fn apply_brand_upserted(&self, brand: Brand) -> bool {
        self.brands
            .apply_update(|list| upsert_by_id(list, brand, |b| &b.id))
    }

    pub fn apply_brand_deleted(&self, brand_id: &str) -> bool {
        let mut removed = false;
        self.brands.apply_update(|list| {
            removed = remove_by_id(list, brand_id, |b| &b.id);
        });
        removed
    }

    /// Assignment change for one (company, user): drop that mapping entry so
    /// the next resolution refetches.
    pub fn apply_assignment_changed(&self, company_name: &str, email: &str) {
        self.mappings.invalidate(company_name, email);
    }

    /// Bulk assignment change: scope is unknown, drop every mapping entry.
    pub fn apply_assignment_bulk_changed(&self) {
        self.mappings.invalidate_all();
    }

    /// Full reset on actor switch: nothing cached survives a login change.
    pub fn invalidate_all(&self) {
        self.users.invalidate();
        self.brands.invalidate();
        self.companies.invalidate();
        self.task_types.invalidate();
        self.mappings.invalidate_all();
        log::debug!("RefCache: all collections invalidated");
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Brand names a user handles within a company, display-sorted. Total:
    /// transport failures resolve to an empty list and a warning.
    pub async fn brands_for(&self, company_name: &str, email: &str) -> Vec<String> {
        let Some(user) = self.resolve_user(email).await else {
            return Vec::new();
        };
        match self
            .mappings
            .ensure(company_name, &user.email, &user.id, false)
            .await
        {
            Ok(mapping) => util::dedup_sorted_ci(mapping.brand_names),
            Err(e) => {
                log::warn!("RefCache: brand resolution failed for {}: {}", email, e);
                Vec::new()
            }
        }
    }

    /// Task type names applicable to (company, assignee, brand), resolved
    /// through the mapping fallback chain:
    ///
    /// 1. person + brand entry
    /// 2. brand-wide entry
    /// 3. company-wide entry
    /// 4. empty
    ///
    /// Total: every miss falls through to the next source.
    pub async fn task_types_for(
        &self,
        company_name: &str,
        assignee_email: &str,
        brand_name: &str,
    ) -> Vec<String> {
        let task_types = self.ensure_task_types(false).await.unwrap_or_else(|e| {
            log::warn!("RefCache: task type load failed: {}", e);
            Vec::new()
        });
        let brands = self.ensure_brands(false).await.unwrap_or_else(|e| {
            log::warn!("RefCache: brand load failed: {}", e);
            Vec::new()
        });

        let user = self.resolve_user(assignee_email).await;
        let brand_id = resolve_brand_id(&brands, company_name, brand_name);

        let mapping = match &user {
            Some(user) => self
                .mappings
                .ensure(company_name, &user.email, &user.id, false)
                .await
                .unwrap_or_else(|e| {
                    log::warn!("RefCache: mapping load failed for {}: {}", user.email, e);
                    AssignmentMap::default()
                }),
            None => AssignmentMap::default(),
        };

        let ids = resolve_type_ids(
            &mapping,
            company_name,
            user.as_ref().map(|u| u.id.as_str()),
            brand_id.as_deref(),
        );
        util::dedup_sorted_ci(type_names(&task_types, &ids))
    }

    async fn resolve_user(&self, email: &str) -> Option<UserRecord> {
        let users = self.ensure_users(false).await.unwrap_or_else(|e| {
            log::warn!("RefCache: user load failed: {}", e);
            Vec::new()
        });
        let key = util::email_key(email);
        users.into_iter().find(|u| u.email == key)
    }
}

// ---------------------------------------------------------------------------
// Pure resolution helpers
// ---------------------------------------------------------------------------

fn upsert_by_id<T, F: Fn(&T) -> &str>(list: &mut Vec<T>, item: T, id_of: F) {
    let target = id_of(&item).to_string();
    match list.iter().position(|existing| id_of(existing) == target) {
        Some(idx) => list[idx] = item,
        None => list.push(item),
    }
}

fn remove_by_id<T, F: Fn(&T) -> &str>(list: &mut Vec<T>, id: &str, id_of: F) -> bool {
    let before = list.len();
    list.retain(|existing| id_of(existing) != id);
    list.len() != before
}

/// Brand name → id, scoped to a company when one is given. Matches either the
/// bare name or the grouped display label ("Northside (Group 2)").
pub(crate) fn resolve_brand_id(
    brands: &[Brand],
    company_name: &str,
    brand_name: &str,
) -> Option<String> {
    let brand_key = util::name_key(brand_name);
    if brand_key.is_empty() {
        return None;
    }
    let company_key = util::name_key(company_name);
    brands
        .iter()
        .find(|b| {
            let name_matches = util::name_key(&b.name) == brand_key
                || util::name_key(&b.display_label()) == brand_key;
            let company_matches =
                company_key.is_empty() || util::name_key(&b.company_name) == company_key;
            name_matches && company_matches
        })
        .map(|b| b.id.clone())
}

/// Fallback chain over one user's assignment map.
pub(crate) fn resolve_type_ids(
    mapping: &AssignmentMap,
    company_name: &str,
    user_id: Option<&str>,
    brand_id: Option<&str>,
) -> Vec<String> {
    if let (Some(user_id), Some(brand_id)) = (user_id, brand_id) {
        let key = util::assignment_key(company_name, user_id, brand_id);
        if let Some(ids) = mapping.task_type_ids_by_company_user_brand.get(&key) {
            if !ids.is_empty() {
                return ids.clone();
            }
        }
    }
    if let Some(brand_id) = brand_id {
        if let Some(ids) = mapping.task_type_ids_by_brand.get(brand_id) {
            if !ids.is_empty() {
                return ids.clone();
            }
        }
    }
    mapping.company_task_type_ids.clone()
}

fn type_names(task_types: &[TaskTypeRecord], ids: &[String]) -> Vec<String> {
    ids.iter()
        .filter_map(|id| task_types.iter().find(|t| &t.id == id))
        .map(|t| t.name.clone())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockApi;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    fn make_brand(id: &str, name: &str, company: &str, group: Option<u32>) -> Brand {
        Brand {
            id: id.to_string(),
            name: name.to_string(),
            company_name: company.to_string(),
            group_number: group,
        }
    }

    fn make_mapping() -> AssignmentMap {
        let mut by_user_brand = HashMap::new();
        by_user_brand.insert(
            util::assignment_key("Acme Corp", "u1", "b1"),
            vec!["tt-specific".to_string()],
        );
        let mut by_brand = HashMap::new();
        by_brand.insert("b1".to_string(), vec!["tt-brand".to_string()]);
        by_brand.insert("b2".to_string(), vec!["tt-brand2".to_string()]);
        AssignmentMap {
            brand_names: vec!["Northside".to_string(), "Southside".to_string()],
            task_type_ids_by_company_user_brand: by_user_brand,
            task_type_ids_by_brand: by_brand,
            company_task_type_ids: vec!["tt-company".to_string()],
        }
    }

    #[test]
    fn test_resolve_brand_id_scoped_to_company() {
        let brands = vec![
            make_brand("b1", "Northside", "Acme Corp", None),
            make_brand("b2", "Northside", "Globex", None),
        ];
        assert_eq!(
            resolve_brand_id(&brands, "globex", "northside"),
            Some("b2".to_string())
        );
        assert_eq!(
            resolve_brand_id(&brands, "Acme  Corp", " NORTHSIDE "),
            Some("b1".to_string())
        );
        assert_eq!(resolve_brand_id(&brands, "Initech", "Northside"), None);
    }

    #[test]
    fn test_resolve_brand_id_accepts_group_label() {
        let brands = vec![make_brand("b3", "Northside", "Acme Corp", Some(2))];
        assert_eq!(
            resolve_brand_id(&brands, "Acme Corp", "Northside (Group 2)"),
            Some("b3".to_string())
        );
    }

    #[test]
    fn test_type_id_fallback_chain() {
        let mapping = make_mapping();

        // Most specific: person + brand.
        assert_eq!(
            resolve_type_ids(&mapping, "Acme Corp", Some("u1"), Some("b1")),
            vec!["tt-specific"]
        );
        // Different user, same brand: brand-wide.
        assert_eq!(
            resolve_type_ids(&mapping, "Acme Corp", Some("u2"), Some("b1")),
            vec!["tt-brand"]
        );
        // Unknown brand: company-wide.
        assert_eq!(
            resolve_type_ids(&mapping, "Acme Corp", Some("u1"), Some("b9")),
            vec!["tt-company"]
        );
        // No brand resolved at all: company-wide.
        assert_eq!(
            resolve_type_ids(&mapping, "Acme Corp", Some("u1"), None),
            vec!["tt-company"]
        );
        // Nothing anywhere: empty.
        let empty = AssignmentMap::default();
        assert!(resolve_type_ids(&empty, "Acme Corp", Some("u1"), Some("b1")).is_empty());
    }

    #[test]
    fn test_upsert_by_id_replaces_in_place() {
        let mut brands = vec![make_brand("b1", "North", "Acme", None)];
        upsert_by_id(
            &mut brands,
            make_brand("b1", "North Renamed", "Acme", None),
            |b| &b.id,
        );
        upsert_by_id(&mut brands, make_brand("b2", "South", "Acme", None), |b| {
            &b.id
        });
        assert_eq!(brands.len(), 2);
        assert_eq!(brands[0].name, "North Renamed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_types_for_resolves_through_mapping() {
        let api = Arc::new(MockApi::default());
        api.push_user("u1", "sarah@acme.com", "assistant", "Acme Corp");
        api.push_brand("b1", "Northside", "Acme Corp");
        api.push_task_type("tt-specific", "Store Audit", "Acme Corp");
        api.push_task_type("tt-company", "Other Work", "Acme Corp");
        api.set_assignment(
            "Acme Corp",
            "u1",
            crate::normalize::RawAssignment {
                brands: vec!["Northside".to_string()],
                task_type_ids_by_company_user_brand_key: [(
                    util::assignment_key("Acme Corp", "u1", "b1"),
                    vec!["tt-specific".to_string()],
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            },
        );

        let caches = ReferenceCaches::new(api.clone(), &EngineConfig::default());
        let names = caches
            .task_types_for("Acme Corp", "Sarah@Acme.com", "Northside")
            .await;
        assert_eq!(names, vec!["Store Audit"]);

        // Unknown assignee falls through to the company-wide list — which is
        // empty here, so no names come back and no mapping fetch happens.
        let none = caches
            .task_types_for("Acme Corp", "ghost@acme.com", "Northside")
            .await;
        assert!(none.is_empty());
        assert_eq!(api.assignment_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_brands_for_sorted_and_total() {
        let api = Arc::new(MockApi::default());
        api.push_user("u1", "sarah@acme.com", "assistant", "Acme Corp");
        api.set_assignment(
            "Acme Corp",
            "u1",
            crate::normalize::RawAssignment {
                brands: vec!["Southside".to_string(), "Northside".to_string()],
                ..Default::default()
            },
        );
        let caches = ReferenceCaches::new(api.clone(), &EngineConfig::default());

        let brands = caches.brands_for("Acme Corp", "sarah@acme.com").await;
        assert_eq!(brands, vec!["Northside", "Southside"]);

        // Transport failure resolves to empty, not an error.
        api.fail_assignments.store(true, Ordering::SeqCst);
        tokio::time::advance(std::time::Duration::from_secs(61)).await;
        let after_failure = caches.brands_for("Acme Corp", "sarah@acme.com").await;
        assert!(after_failure.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_upsert_only_touches_loaded_cache() {
        let api = Arc::new(MockApi::default());
        api.push_user("u1", "sarah@acme.com", "assistant", "Acme Corp");
        let caches = ReferenceCaches::new(api.clone(), &EngineConfig::default());

        // Not loaded yet: delta is skipped.
        let user = UserRecord {
            id: "u2".to_string(),
            email: "new@acme.com".to_string(),
            name: String::new(),
            role: crate::types::Role::Assistant,
            company_name: "Acme Corp".to_string(),
            manager_id: None,
        };
        assert!(!caches.apply_user_upserted(user.clone()));
        assert!(caches.users_snapshot().is_empty());

        caches.ensure_users(false).await.unwrap();
        assert!(caches.apply_user_upserted(user));
        let snapshot = caches.users_snapshot();
        assert_eq!(snapshot.len(), 2);

        // And the delta re-stamped freshness: no network on the next ensure.
        caches.ensure_users(false).await.unwrap();
        assert_eq!(api.user_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_user_load_is_not_cached() {
        let api = Arc::new(MockApi::default());
        api.push_user("u1", "sarah@acme.com", "assistant", "Acme Corp");
        api.fail_users.store(true, Ordering::SeqCst);
        let caches = ReferenceCaches::new(api.clone(), &EngineConfig::default());

        let result = caches.ensure_users(false).await;
        assert!(result.is_err());
        assert!(caches.users_snapshot().is_empty());

        // Failures earn no TTL credit: the next ensure goes back out.
        api.fail_users.store(false, Ordering::SeqCst);
        let users = caches.ensure_users(false).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(api.user_calls.load(Ordering::SeqCst), 2);
    }
}
