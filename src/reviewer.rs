use rusqlite::{Connection, OptionalExtension};

use crate::db::{fresh_id, get_transaction, load_transactions, require_category};
use crate::error::{Result, TallyError};
use crate::models::{CategorySource, MatchType, Split, Transaction};

pub fn get_uncategorized(conn: &Connection) -> Result<Vec<Transaction>> {
    Ok(load_transactions(conn, None)?
        .into_iter()
        .filter(|t| t.category_id.is_none())
        .collect())
}

/// Pin a category by hand. Later bulk runs leave it alone unless told otherwise.
pub fn set_manual_category(conn: &Connection, txn_id: &str, category_id: &str) -> Result<()> {
    require_category(conn, category_id)?;
    let changed = conn.execute(
        "UPDATE transactions SET category_id = ?1, category_source = ?2, category_confidence = 1.0 \
         WHERE id = ?3",
        rusqlite::params![category_id, CategorySource::Manual, txn_id],
    )?;
    if changed == 0 {
        return Err(TallyError::UnknownTransaction(txn_id.to_string()));
    }
    Ok(())
}

/// The text a learned rule keys on: counterparty if present, else description.
pub fn learning_pattern(txn: &Transaction) -> Option<String> {
    txn.counterparty
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| Some(txn.description.trim()).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

/// Create a learned rule from a correction, or repoint the existing learned
/// rule with the same pattern. Returns the rule id.
pub fn learn_rule(conn: &Connection, txn: &Transaction, category_id: &str) -> Result<String> {
    require_category(conn, category_id)?;
    let pattern = learning_pattern(txn).ok_or_else(|| {
        TallyError::InvalidInput(format!("transaction {} has no text to learn from", txn.id))
    })?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM rules WHERE is_learned = 1 AND lower(pattern) = lower(?1)",
            [&pattern],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        conn.execute("UPDATE rules SET category_id = ?1 WHERE id = ?2", rusqlite::params![category_id, id])?;
        log::info!("learned rule {id} now maps '{pattern}' to {category_id}");
        return Ok(id);
    }

    let id = fresh_id("rule", &[&pattern, category_id]);
    conn.execute(
        "INSERT INTO rules (id, pattern, match_type, category_id, priority, is_learned) \
         VALUES (?1, ?2, ?3, ?4, 0, 1)",
        rusqlite::params![id, pattern, MatchType::Contains, category_id],
    )?;
    log::info!("learned rule {id}: '{pattern}' -> {category_id}");
    Ok(id)
}

/// Manual categorization, optionally remembered as a learned rule.
pub fn apply_review(conn: &Connection, txn_id: &str, category_id: &str, learn: bool) -> Result<Option<String>> {
    set_manual_category(conn, txn_id, category_id)?;
    if !learn {
        return Ok(None);
    }
    let txn = get_transaction(conn, txn_id)?;
    learn_rule(conn, &txn, category_id).map(Some)
}

/// Replace a transaction's splits. The parts must share the transaction's
/// sign and add up to its amount (to the cent); an empty list unsplits it.
pub fn split_transaction(conn: &Connection, txn_id: &str, splits: Vec<Split>) -> Result<()> {
    let txn = get_transaction(conn, txn_id)?;
    if splits.is_empty() {
        conn.execute("UPDATE transactions SET is_split = 0, splits = NULL WHERE id = ?1", [txn_id])?;
        return Ok(());
    }
    if splits.len() < 2 {
        return Err(TallyError::InvalidInput("a split needs at least two parts".to_string()));
    }
    for s in &splits {
        if let Some(id) = &s.category_id {
            require_category(conn, id)?;
        }
        if s.amount == 0.0 || s.amount.signum() != txn.amount.signum() {
            return Err(TallyError::InvalidInput(format!(
                "split amount {} does not match the sign of {}",
                s.amount, txn.amount
            )));
        }
    }
    let total: f64 = splits.iter().map(|s| s.amount).sum();
    if (total - txn.amount).abs() >= 0.005 {
        return Err(TallyError::InvalidInput(format!(
            "splits add up to {total:.2}, transaction is {:.2}",
            txn.amount
        )));
    }
    conn.execute(
        "UPDATE transactions SET is_split = 1, splits = ?1 WHERE id = ?2",
        rusqlite::params![serde_json::to_string(&splits)?, txn_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{test_db, txn};
    use crate::db::{insert_transaction, load_rules};

    #[test]
    fn test_get_uncategorized() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, &txn("a", "2025-01-15", -50.0, "ADOBE CREATIVE"), None).unwrap();
        let mut done = txn("b", "2025-01-16", -5.0, "DONE");
        done.category_id = Some("shopping".into());
        done.category_source = CategorySource::Rule;
        insert_transaction(&conn, &done, None).unwrap();
        let open = get_uncategorized(&conn).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].description, "ADOBE CREATIVE");
    }

    #[test]
    fn test_apply_review_sets_manual() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, &txn("a", "2025-01-15", -50.0, "ADOBE CREATIVE"), None).unwrap();
        assert!(apply_review(&conn, "a", "entertainment.subscriptions", false).unwrap().is_none());
        let t = get_transaction(&conn, "a").unwrap();
        assert_eq!(t.category_source, CategorySource::Manual);
        assert_eq!(t.category_confidence, 1.0);
        assert!(load_rules(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_apply_review_learns_from_counterparty() {
        let (_dir, conn) = test_db();
        let mut t = txn("a", "2025-01-15", -50.0, "SEPA 0042");
        t.counterparty = Some("  Gym Company  ".into());
        insert_transaction(&conn, &t, None).unwrap();
        let id = apply_review(&conn, "a", "health", true).unwrap().unwrap();
        let rules = load_rules(&conn).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, id);
        assert_eq!(rules[0].pattern, "Gym Company");
        assert!(rules[0].is_learned);
    }

    #[test]
    fn test_learning_same_pattern_repoints_rule() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, &txn("a", "2025-01-15", -50.0, "ADOBE"), None).unwrap();
        insert_transaction(&conn, &txn("b", "2025-02-15", -50.0, "adobe"), None).unwrap();
        let first = apply_review(&conn, "a", "shopping", true).unwrap();
        let second = apply_review(&conn, "b", "entertainment", true).unwrap();
        assert_eq!(first, second);
        let rules = load_rules(&conn).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].category_id, "entertainment");
    }

    #[test]
    fn test_unknown_category_and_transaction() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, &txn("a", "2025-01-15", -50.0, "X"), None).unwrap();
        assert!(matches!(
            set_manual_category(&conn, "a", "nope"),
            Err(TallyError::UnknownCategory(_))
        ));
        assert!(matches!(
            set_manual_category(&conn, "zz", "food"),
            Err(TallyError::UnknownTransaction(_))
        ));
    }

    fn part(category: &str, amount: f64) -> Split {
        Split {
            category_id: Some(category.into()),
            amount,
            description: None,
        }
    }

    #[test]
    fn test_split_transaction() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, &txn("a", "2025-01-15", -100.0, "HEMA"), None).unwrap();
        split_transaction(&conn, "a", vec![part("food.groceries", -60.0), part("shopping.clothing", -40.0)]).unwrap();
        let t = get_transaction(&conn, "a").unwrap();
        assert!(t.is_split);
        assert_eq!(t.splits.len(), 2);
        assert_eq!(t.splits[1].category_id.as_deref(), Some("shopping.clothing"));

        split_transaction(&conn, "a", vec![]).unwrap();
        let t = get_transaction(&conn, "a").unwrap();
        assert!(!t.is_split);
        assert!(t.splits.is_empty());
    }

    #[test]
    fn test_split_must_balance() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, &txn("a", "2025-01-15", -100.0, "HEMA"), None).unwrap();
        let err = split_transaction(&conn, "a", vec![part("food", -60.0), part("shopping", -30.0)]).unwrap_err();
        assert!(err.to_string().contains("add up to -90.00"), "got: {err}");
        assert!(split_transaction(&conn, "a", vec![part("food", -160.0), part("shopping", 60.0)]).is_err());
        assert!(split_transaction(&conn, "a", vec![part("food", -100.0)]).is_err());
        assert!(matches!(
            split_transaction(&conn, "a", vec![part("nope", -50.0), part("food", -50.0)]),
            Err(TallyError::UnknownCategory(_))
        ));
    }
}
