//! Resolves merchant-table slugs ("groceries", "food.groceries") to the ids of
//! a user's actual categories, tolerating renamed and nested categories.

use std::collections::{HashMap, HashSet};

use crate::models::Category;

/// Lowercase, keep only ASCII letters and digits: "Food & Drink" -> "fooddrink".
pub fn simple_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Lowercase, collapse every run of other characters to one '.':
/// "Food > Groceries" -> "food.groceries". Leading/trailing dots are dropped.
pub fn dotted_name(name: &str) -> String {
    let mut out = String::new();
    let mut pending_dot = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dot && !out.is_empty() {
                out.push('.');
            }
            pending_dot = false;
            out.push(c);
        } else {
            pending_dot = true;
        }
    }
    out
}

/// Query form of a slug: lowercase, letters and '.' only.
fn normalize_query(slug: &str) -> String {
    slug.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || *c == '.')
        .collect()
}

/// Key -> category id lookup built from one snapshot of the category tree.
///
/// Category ids always resolve to themselves and are never repointed by a
/// name key. Other keys keep their first-registration order; re-registering
/// a key points it at the newer id without moving it. The fuzzy scan walks
/// keys in that order, so it finds *a* plausible category, not necessarily
/// the best one.
#[derive(Debug, Clone, Default)]
pub struct SlugResolver {
    ids: HashSet<String>,
    keys: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl SlugResolver {
    pub fn build(categories: &[Category]) -> Self {
        let by_id: HashMap<&str, &Category> =
            categories.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut resolver = Self {
            ids: categories.iter().map(|c| c.id.clone()).collect(),
            ..Self::default()
        };
        for cat in categories {
            let simple = simple_name(&cat.name);
            resolver.register(cat.id.clone(), &cat.id);
            resolver.register(simple.clone(), &cat.id);
            resolver.register(dotted_name(&cat.name), &cat.id);

            let parent = cat.parent_id.as_deref().and_then(|p| by_id.get(p));
            if let Some(parent) = parent {
                let parent_simple = simple_name(&parent.name);
                if !parent_simple.is_empty() && !simple.is_empty() {
                    resolver.register(format!("{parent_simple}.{simple}"), &cat.id);
                }
                resolver.register(simple, &cat.id);
            }
        }
        resolver
    }

    fn register(&mut self, key: String, category_id: &str) {
        if key.is_empty() || (self.ids.contains(&key) && key != category_id) {
            return;
        }
        match self.index.get(&key) {
            Some(&i) => self.keys[i].1 = category_id.to_string(),
            None => {
                self.index.insert(key.clone(), self.keys.len());
                self.keys.push((key, category_id.to_string()));
            }
        }
    }

    pub fn resolve(&self, slug: &str) -> Option<&str> {
        if let Some(id) = self.ids.get(slug) {
            return Some(id.as_str());
        }
        if let Some(&i) = self.index.get(slug) {
            return Some(self.keys[i].1.as_str());
        }
        let query = normalize_query(slug);
        if query.is_empty() {
            return None;
        }
        self.keys
            .iter()
            .find(|(key, _)| key.contains(&query) || query.contains(key.as_str()))
            .map(|(_, id)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: &str, name: &str, parent: Option<&str>) -> Category {
        Category {
            id: id.into(),
            name: name.into(),
            parent_id: parent.map(Into::into),
            color: "#999999".into(),
            icon: "tag".into(),
            order: 0,
            is_system: false,
        }
    }

    fn tree() -> Vec<Category> {
        vec![
            cat("c1", "Food", None),
            cat("c2", "Groceries", Some("c1")),
            cat("c3", "Public Transport", None),
            cat("c4", "Eating Out!", Some("c1")),
        ]
    }

    #[test]
    fn test_name_normalization() {
        assert_eq!(simple_name("Food & Drink"), "fooddrink");
        assert_eq!(dotted_name("Food  &  Drink"), "food.drink");
        assert_eq!(dotted_name("Eating Out!"), "eating.out");
        assert_eq!(dotted_name("--Rent--"), "rent");
    }

    #[test]
    fn test_trimmed_dots_resolve_like_plain_name() {
        let padded = SlugResolver::build(&[cat("h", "Housing", None), cat("r", "(Rent)", Some("h"))]);
        let plain = SlugResolver::build(&[cat("h", "Housing", None), cat("r", "Rent", Some("h"))]);
        assert_eq!(dotted_name("(Rent)"), dotted_name("Rent"));
        for slug in ["rent", "housing.rent", "Rent!"] {
            assert_eq!(padded.resolve(slug), Some("r"), "slug {slug}");
            assert_eq!(padded.resolve(slug), plain.resolve(slug), "slug {slug}");
        }
    }

    #[test]
    fn test_resolving_own_id_returns_it() {
        let r = SlugResolver::build(&tree());
        for c in tree() {
            assert_eq!(r.resolve(&c.id), Some(c.id.as_str()));
        }
    }

    #[test]
    fn test_child_named_like_root_keeps_root_id() {
        let cats = vec![
            cat("income", "Income", None),
            cat("transfers", "Transfers", None),
            cat("income.transfers", "Transfers", Some("income")),
        ];
        let r = SlugResolver::build(&cats);
        for c in &cats {
            assert_eq!(r.resolve(&c.id), Some(c.id.as_str()));
        }
        assert_eq!(r.resolve("income.transfers"), Some("income.transfers"));
    }

    #[test]
    fn test_exact_keys() {
        let r = SlugResolver::build(&tree());
        assert_eq!(r.resolve("groceries"), Some("c2"));
        assert_eq!(r.resolve("food.groceries"), Some("c2"));
        assert_eq!(r.resolve("public.transport"), Some("c3"));
        assert_eq!(r.resolve("publictransport"), Some("c3"));
        assert_eq!(r.resolve("food.eatingout"), Some("c4"));
    }

    #[test]
    fn test_renamed_category_still_resolves() {
        let r = SlugResolver::build(&[cat("x9", "Food > Groceries", None)]);
        assert_eq!(r.resolve("groceries"), Some("x9"));
    }

    #[test]
    fn test_query_containing_key_resolves() {
        let r = SlugResolver::build(&tree());
        // "transport.publictransport" contains the stored key "publictransport"
        assert_eq!(r.resolve("transport.publictransport"), Some("c3"));
    }

    #[test]
    fn test_digits_and_symbols_stripped_from_query() {
        let r = SlugResolver::build(&tree());
        assert_eq!(r.resolve("Groceries-2"), Some("c2"));
    }

    #[test]
    fn test_unresolvable_slug_is_none() {
        let r = SlugResolver::build(&tree());
        assert_eq!(r.resolve("subscriptions"), None);
        assert_eq!(r.resolve("1234"), None);
        assert_eq!(SlugResolver::build(&[]).resolve("groceries"), None);
    }

    #[test]
    fn test_missing_parent_skips_compound_key() {
        let r = SlugResolver::build(&[cat("c7", "Fuel", Some("gone"))]);
        assert_eq!(r.resolve("fuel"), Some("c7"));
        assert_eq!(r.len(), 2);
    }
}
