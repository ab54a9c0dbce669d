//! Static table of well-known payees mapped to category slugs.
//!
//! The table is data, not code: the built-in set ships with the binary and a
//! CSV file can replace it wholesale (`merchant_db` in settings). Either way it
//! is loaded once and handed to the categorizer by reference.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, TallyError};
use crate::models::MatchType;
use crate::rules::matches;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MerchantMapping {
    pub pattern: String,
    pub category_slug: String,
    pub confidence: f64,
}

// (pattern, category slug, confidence)
const BUILTIN: &[(&str, &str, f64)] = &[
    // Groceries
    ("ALBERT HEIJN", "groceries", 0.9),
    ("JUMBO", "groceries", 0.85),
    ("LIDL", "groceries", 0.9),
    ("ALDI", "groceries", 0.9),
    ("TESCO", "groceries", 0.9),
    ("SAINSBURY", "food.groceries", 0.9),
    ("WHOLE FOODS", "food.groceries", 0.9),
    ("TRADER JOE", "food.groceries", 0.9),
    ("REWE", "groceries", 0.85),
    ("CARREFOUR", "groceries", 0.85),
    // Eating out
    ("MCDONALD", "restaurants", 0.9),
    ("BURGER KING", "restaurants", 0.9),
    ("DOMINOS", "restaurants", 0.85),
    ("THUISBEZORGD", "food.restaurants", 0.85),
    ("UBER EATS", "food.restaurants", 0.85),
    ("DELIVEROO", "food.restaurants", 0.85),
    ("STARBUCKS", "coffee", 0.9),
    ("COSTA COFFEE", "coffee", 0.9),
    // Transport
    ("SHELL", "fuel", 0.8),
    ("ESSO", "fuel", 0.85),
    ("BP ", "transport.fuel", 0.7),
    ("NS GROEP", "publictransport", 0.9),
    ("OV-CHIPKAART", "publictransport", 0.9),
    ("TFL", "transport.publictransport", 0.85),
    ("UBER", "taxi", 0.75),
    ("LYFT", "taxi", 0.8),
    // Housing
    ("VATTENFALL", "utilities", 0.9),
    ("ENECO", "utilities", 0.9),
    ("ZIGGO", "housing.utilities", 0.85),
    ("KPN", "housing.utilities", 0.8),
    // Subscriptions
    ("NETFLIX", "subscriptions", 0.95),
    ("SPOTIFY", "subscriptions", 0.95),
    ("DISNEY PLUS", "entertainment.subscriptions", 0.9),
    ("YOUTUBE PREMIUM", "entertainment.subscriptions", 0.9),
    ("APPLE.COM/BILL", "subscriptions", 0.8),
    // Shopping
    ("BOL.COM", "shopping", 0.8),
    ("AMAZON", "shopping", 0.75),
    ("ZALANDO", "clothing", 0.85),
    ("H&M", "shopping.clothing", 0.8),
    ("MEDIAMARKT", "electronics", 0.85),
    ("COOLBLUE", "shopping.electronics", 0.85),
    // Health
    ("ETOS", "pharmacy", 0.85),
    ("KRUIDVAT", "health.pharmacy", 0.75),
    ("BOOTS", "pharmacy", 0.8),
    // Income
    ("SALARIS", "salary", 0.8),
    ("PAYROLL", "income.salary", 0.8),
];

#[derive(Debug, Clone, Default)]
pub struct MerchantDatabase {
    mappings: Vec<MerchantMapping>,
}

impl MerchantDatabase {
    pub fn new(mappings: Vec<MerchantMapping>) -> Self {
        Self { mappings }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(pattern, slug, confidence)| MerchantMapping {
                    pattern: pattern.to_string(),
                    category_slug: slug.to_string(),
                    confidence: *confidence,
                })
                .collect(),
        )
    }

    /// Load a replacement table from CSV with the header
    /// `pattern,category_slug,confidence`.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut mappings = Vec::new();
        for (i, record) in reader.deserialize::<MerchantMapping>().enumerate() {
            let mapping = record?;
            if mapping.pattern.trim().is_empty() {
                return Err(TallyError::InvalidInput(format!(
                    "merchant table row {}: empty pattern",
                    i + 1
                )));
            }
            if !(mapping.confidence > 0.0 && mapping.confidence < 1.0) {
                return Err(TallyError::InvalidInput(format!(
                    "merchant table row {}: confidence {} must be between 0 and 1",
                    i + 1,
                    mapping.confidence
                )));
            }
            mappings.push(mapping);
        }
        let db = Self::new(mappings);
        if db.is_empty() {
            return Err(TallyError::InvalidInput(format!(
                "merchant table {} has no rows",
                path.display()
            )));
        }
        log::info!("loaded {} merchant patterns from {}", db.len(), path.display());
        Ok(db)
    }

    /// Built-in table unless a replacement file is configured.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_csv(p),
            None => Ok(Self::builtin()),
        }
    }

    /// First mapping whose pattern occurs in `text`, case-insensitively.
    pub fn match_merchant(&self, text: &str) -> Option<&MerchantMapping> {
        self.mappings
            .iter()
            .find(|m| matches(text, &m.pattern, MatchType::Contains))
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_confidences_below_one() {
        let db = MerchantDatabase::builtin();
        assert!(!db.is_empty());
        assert!(db.mappings.iter().all(|m| m.confidence > 0.0 && m.confidence < 1.0));
    }

    #[test]
    fn test_match_merchant_contains_case_insensitive() {
        let db = MerchantDatabase::builtin();
        let hit = db.match_merchant("Albert Heijn 1234 Amsterdam").unwrap();
        assert_eq!(hit.category_slug, "groceries");
        assert_eq!(hit.pattern, "ALBERT HEIJN");
        assert_eq!(hit.confidence, 0.9);
        assert!(db.match_merchant("Corner shop").is_none());
    }

    #[test]
    fn test_first_table_entry_wins() {
        let db = MerchantDatabase::new(vec![
            MerchantMapping { pattern: "UBER".into(), category_slug: "taxi".into(), confidence: 0.7 },
            MerchantMapping { pattern: "UBER EATS".into(), category_slug: "restaurants".into(), confidence: 0.8 },
        ]);
        assert_eq!(db.match_merchant("UBER EATS AMSTERDAM").unwrap().category_slug, "taxi");
    }

    #[test]
    fn test_from_csv_loads_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merchants.csv");
        std::fs::write(
            &path,
            "pattern,category_slug,confidence\nCORNER SHOP,groceries,0.6\nGYM,health,0.8\n",
        )
        .unwrap();
        let db = MerchantDatabase::from_csv(&path).unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(db.match_merchant("corner shop 12").unwrap().category_slug, "groceries");
        assert!(db.match_merchant("ALBERT HEIJN").is_none());
    }

    #[test]
    fn test_from_csv_rejects_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merchants.csv");
        std::fs::write(&path, "pattern,category_slug,confidence\n").unwrap();
        let err = MerchantDatabase::from_csv(&path).unwrap_err();
        assert!(err.to_string().contains("has no rows"), "got: {err}");
    }

    #[test]
    fn test_from_csv_rejects_bad_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merchants.csv");
        std::fs::write(&path, "pattern,category_slug,confidence\nX,groceries,1.0\n").unwrap();
        let err = MerchantDatabase::from_csv(&path).unwrap_err();
        assert!(err.to_string().contains("row 1"), "got: {err}");
    }
}
