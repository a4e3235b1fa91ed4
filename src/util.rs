/// Canonical identity key for an email address: trimmed and lowercased.
///
/// Every email comparison in the engine goes through this, so "  Sarah@Acme.COM "
/// and "sarah@acme.com" resolve to the same actor.
pub fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Canonical key for a company or brand name: trimmed, lowercased, inner
/// whitespace collapsed to single spaces.
///
/// Example: "  Acme   Corp " → "acme corp"
pub fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Composite key for the per-(company, user) assignment mapping cache.
pub fn mapping_key(company_name: &str, email: &str) -> String {
    format!("{}::{}", name_key(company_name), email_key(email))
}

/// Lookup key into an assignment map's company::user::brand table.
pub fn assignment_key(company_name: &str, user_id: &str, brand_id: &str) -> String {
    format!("{}::{}::{}", name_key(company_name), user_id.trim(), brand_id.trim())
}

/// Strip the literal `deleted` suffix historical records carry on emails of
/// removed users. Applied before identity comparison, never at storage.
///
/// Example: "old.manager@acme.comdeleted" → "old.manager@acme.com"
pub fn strip_deleted_suffix(email: &str) -> &str {
    email.strip_suffix("deleted").unwrap_or(email)
}

/// Convert an email to a filesystem-safe slug for per-actor state files.
///
/// Example: "sarah.chen@acme.com" → "sarah-chen-acme-com"
pub fn email_slug(email: &str) -> String {
    email_key(email)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Case-insensitive sort + dedup for user-facing option lists (brand names,
/// task type names, assignee labels). Case-variants collapse to the
/// first-seen spelling.
pub fn dedup_sorted_ci(mut values: Vec<String>) -> Vec<String> {
    // The sort is stable: equal keys keep input order, so dedup retains the
    // first-seen spelling of each case-variant run.
    values.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
    values.dedup_by(|a, b| a.to_lowercase() == b.to_lowercase());
    values
}
