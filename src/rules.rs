use crate::models::{CategorySource, MatchType, Rule};

/// A rule that matched, with everything the categorizer reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub category_id: String,
    pub confidence: f64,
    pub source: CategorySource,
    pub matched_pattern: String,
}

pub fn matches(text: &str, pattern: &str, match_type: MatchType) -> bool {
    if pattern.is_empty() {
        return false;
    }
    let text_lower = text.to_lowercase();
    let pat_lower = pattern.to_lowercase();
    match match_type {
        MatchType::Contains => text_lower.contains(&pat_lower),
        MatchType::Exact => text_lower == pat_lower,
    }
}

/// First rule in list order whose pattern matches `text`.
///
/// `rules` must already be ordered by descending priority; ties keep list
/// order, so the caller's ordering is the whole tie-break.
pub fn match_rules(text: &str, rules: &[Rule], source: CategorySource) -> Option<RuleMatch> {
    rules
        .iter()
        .find(|rule| matches(text, &rule.pattern, rule.match_type))
        .map(|rule| RuleMatch {
            category_id: rule.category_id.clone(),
            confidence: 1.0,
            source,
            matched_pattern: rule.pattern.clone(),
        })
}

/// Stable sort by descending priority, keeping insertion order among equals.
pub fn sort_by_priority(rules: &mut [Rule]) {
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
}
