//! Brand find-or-create against the document store.

use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::info;

use crate::store::ContentStore;

/// Curated set of well-known makes; membership drives the `isPopular` flag
/// the storefront uses for its brand selector.
pub const POPULAR_BRANDS: [&str; 8] = [
    "BMW",
    "Audi",
    "Volkswagen",
    "Mercedes",
    "Ford",
    "Opel",
    "Škoda",
    "Skoda",
];

/// Look up a Brand document by exact name, creating it on first sight.
/// Returns the document id either way.
///
/// Creation failures propagate to the caller so the enclosing record is the
/// unit of failure; no partial Brand is ever left behind (create is atomic).
pub async fn resolve_brand(store: &dyn ContentStore, mark_name: &str) -> Result<String> {
    // The one multi-word make in the legacy export is preserved verbatim
    // instead of being token-split. Not generalizable.
    let normalized = match mark_name {
        "Alfa Romeo" => "Alfa Romeo",
        other => other,
    };

    let existing = store
        .query_first(
            r#"*[_type == "brand" && name == $name][0]"#,
            &[("name", normalized)],
        )
        .await?;
    if let Some(brand) = existing {
        return brand
            .get("_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("brand document for {normalized} has no _id"));
    }

    info!(brand = %normalized, "creating new brand");
    let slug = brand_slug(normalized);
    let is_popular = POPULAR_BRANDS.contains(&normalized);
    store
        .create(json!({
            "_type": "brand",
            "name": normalized,
            "slug": { "_type": "slug", "current": slug },
            "isPopular": is_popular,
        }))
        .await
}

/// Slug derivation: lowercase, strip anything outside `[a-z0-9\s-]`, collapse
/// whitespace runs to single hyphens, collapse repeated hyphens, trim.
pub fn brand_slug(name: &str) -> String {
    let lowered = name.to_lowercase();
    let kept: String = lowered
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ' || *c == '-')
        .collect();

    let mut out = String::with_capacity(kept.len());
    for ch in kept.chars() {
        let mapped = if ch == ' ' { '-' } else { ch };
        if mapped == '-' && out.ends_with('-') {
            continue;
        }
        out.push(mapped);
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_lowercases_and_hyphenates() {
        assert_eq!(brand_slug("Alfa Romeo"), "alfa-romeo");
        assert_eq!(brand_slug("BMW"), "bmw");
    }

    #[test]
    fn slug_drops_non_ascii_and_collapses() {
        // 'Š' has no ascii slug representation; it is stripped, not mangled.
        assert_eq!(brand_slug("Škoda"), "koda");
        assert_eq!(brand_slug("  Land -- Rover  "), "land-rover");
    }

    #[test]
    fn popularity_is_allow_list_membership() {
        assert!(POPULAR_BRANDS.contains(&"BMW"));
        assert!(!POPULAR_BRANDS.contains(&"Dacia"));
    }
}
