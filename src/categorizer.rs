use std::collections::HashSet;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::db::{load_categories, load_rules, load_transactions};
use crate::error::{Result, TallyError};
use crate::merchants::MerchantDatabase;
use crate::models::{Category, CategorySource, Rule, Transaction};
use crate::rules::{match_rules, sort_by_priority};
use crate::slugs::SlugResolver;

/// Upper bound on writes committed together during bulk recategorization.
pub const BATCH_SIZE: usize = 400;

/// One categorization decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    pub category_id: Option<String>,
    pub confidence: f64,
    pub source: CategorySource,
    pub matched_pattern: Option<String>,
}

impl Categorization {
    pub fn none() -> Self {
        Self {
            category_id: None,
            confidence: 0.0,
            source: CategorySource::None,
            matched_pattern: None,
        }
    }

    fn same_as_stored(&self, txn: &Transaction) -> bool {
        self.category_id == txn.category_id
            && self.source == txn.category_source
            && self.confidence == txn.category_confidence
    }
}

/// Everything the cascade needs, loaded once and never mutated.
#[derive(Debug, Clone)]
pub struct CategorizerSnapshot<'m> {
    user_rules: Vec<Rule>,
    learned_rules: Vec<Rule>,
    categories: Vec<Category>,
    resolver: SlugResolver,
    merchants: &'m MerchantDatabase,
}

impl<'m> CategorizerSnapshot<'m> {
    /// Rules pointing at categories that no longer exist are dropped so the
    /// cascade can only ever return known ids.
    pub fn new(rules: Vec<Rule>, categories: Vec<Category>, merchants: &'m MerchantDatabase) -> Self {
        let known: HashSet<&str> = categories.iter().map(|c| c.id.as_str()).collect();
        let (mut learned_rules, mut user_rules): (Vec<Rule>, Vec<Rule>) = rules
            .into_iter()
            .filter(|r| {
                let ok = known.contains(r.category_id.as_str());
                if !ok {
                    log::warn!("rule {} points at unknown category {}, ignoring", r.id, r.category_id);
                }
                ok
            })
            .partition(|r| r.is_learned);
        sort_by_priority(&mut user_rules);
        sort_by_priority(&mut learned_rules);
        let resolver = SlugResolver::build(&categories);
        Self {
            user_rules,
            learned_rules,
            categories,
            resolver,
            merchants,
        }
    }

    pub fn load(conn: &Connection, merchants: &'m MerchantDatabase) -> Result<Self> {
        let rules = load_rules(conn)?;
        let categories = load_categories(conn)?;
        let snapshot = Self::new(rules, categories, merchants);
        log::debug!(
            "categorizer loaded: {} rules, {} learned, {} categories, {} slug keys",
            snapshot.user_rules.len(),
            snapshot.learned_rules.len(),
            snapshot.categories.len(),
            snapshot.resolver.len()
        );
        if snapshot.resolver.is_empty() {
            log::warn!("no categories defined; merchant matches cannot be resolved");
        }
        Ok(snapshot)
    }

    /// Rules, then merchant table, then learned rules; first hit wins.
    pub fn categorize(&self, description: &str, counterparty: Option<&str>) -> Categorization {
        let text = match counterparty {
            Some(cp) => format!("{description} {cp}"),
            None => description.to_string(),
        };

        if let Some(m) = match_rules(&text, &self.user_rules, CategorySource::Rule) {
            log::debug!("'{text}' -> {} (rule '{}')", m.category_id, m.matched_pattern);
            return Categorization {
                category_id: Some(m.category_id),
                confidence: m.confidence,
                source: m.source,
                matched_pattern: Some(m.matched_pattern),
            };
        }

        if let Some(hit) = self.merchants.match_merchant(&text) {
            match self.resolver.resolve(&hit.category_slug) {
                Some(category_id) => {
                    log::debug!("'{text}' -> {category_id} (merchant '{}')", hit.pattern);
                    return Categorization {
                        category_id: Some(category_id.to_string()),
                        confidence: hit.confidence,
                        source: CategorySource::Merchant,
                        matched_pattern: Some(hit.pattern.clone()),
                    };
                }
                None => log::debug!("merchant slug '{}' resolves to no category", hit.category_slug),
            }
        }

        if let Some(m) = match_rules(&text, &self.learned_rules, CategorySource::Learned) {
            log::debug!("'{text}' -> {} (learned '{}')", m.category_id, m.matched_pattern);
            return Categorization {
                category_id: Some(m.category_id),
                confidence: m.confidence,
                source: m.source,
                matched_pattern: Some(m.matched_pattern),
            };
        }

        Categorization::none()
    }
}

/// Load-once session over a snapshot: `initialize` before `categorize`.
pub struct Categorizer<'m> {
    merchants: &'m MerchantDatabase,
    snapshot: Option<CategorizerSnapshot<'m>>,
}

impl<'m> Categorizer<'m> {
    pub fn new(merchants: &'m MerchantDatabase) -> Self {
        Self {
            merchants,
            snapshot: None,
        }
    }

    /// Loads rules and categories. A second call is a no-op.
    pub fn initialize(&mut self, conn: &Connection) -> Result<()> {
        if self.snapshot.is_none() {
            self.snapshot = Some(CategorizerSnapshot::load(conn, self.merchants)?);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Result<&CategorizerSnapshot<'m>> {
        self.snapshot.as_ref().ok_or(TallyError::NotInitialized)
    }

    pub fn categorize(&self, description: &str, counterparty: Option<&str>) -> Result<Categorization> {
        Ok(self.snapshot()?.categorize(description, counterparty))
    }
}

// ---------------------------------------------------------------------------
// Bulk jobs
// ---------------------------------------------------------------------------

fn write_categorization(conn: &Connection, txn_id: &str, c: &Categorization) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE transactions SET category_id = ?1, category_source = ?2, category_confidence = ?3 \
         WHERE id = ?4",
        rusqlite::params![c.category_id, c.source, c.confidence, txn_id],
    )
}

fn bump_hit_count(conn: &Connection, c: &Categorization, rules_by_pattern: &[Rule]) -> rusqlite::Result<()> {
    if !matches!(c.source, CategorySource::Rule | CategorySource::Learned) {
        return Ok(());
    }
    let (Some(pattern), Some(category)) = (&c.matched_pattern, &c.category_id) else {
        return Ok(());
    };
    let learned = c.source == CategorySource::Learned;
    if let Some(rule) = rules_by_pattern
        .iter()
        .find(|r| &r.pattern == pattern && &r.category_id == category && r.is_learned == learned)
    {
        conn.execute("UPDATE rules SET hit_count = hit_count + 1 WHERE id = ?1", [&rule.id])?;
    }
    Ok(())
}

pub struct CategorizeResult {
    pub categorized: usize,
    pub still_uncategorized: usize,
}

/// Run the cascade over every transaction that has no category source yet.
pub fn categorize_uncategorized(conn: &Connection, snapshot: &CategorizerSnapshot<'_>) -> Result<CategorizeResult> {
    let rules: Vec<Rule> = snapshot
        .user_rules
        .iter()
        .chain(snapshot.learned_rules.iter())
        .cloned()
        .collect();
    let pending: Vec<Transaction> = load_transactions(conn, None)?
        .into_iter()
        .filter(|t| t.category_source == CategorySource::None)
        .collect();

    let mut categorized = 0usize;
    let mut still_uncategorized = 0usize;
    let tx = conn.unchecked_transaction()?;
    for txn in &pending {
        let decision = snapshot.categorize(&txn.description, txn.counterparty.as_deref());
        if decision.source == CategorySource::None {
            still_uncategorized += 1;
            continue;
        }
        write_categorization(&tx, &txn.id, &decision)?;
        bump_hit_count(&tx, &decision, &rules)?;
        categorized += 1;
    }
    tx.commit()?;

    Ok(CategorizeResult {
        categorized,
        still_uncategorized,
    })
}

#[derive(Debug, Clone, Default)]
pub struct RecategorizeOptions {
    /// Also overwrite transactions the user categorized by hand.
    pub include_manual: bool,
    /// Stop starting new batches once this much time has passed.
    pub time_budget: Option<Duration>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Default)]
pub struct RecategorizeReport {
    pub processed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_manual: usize,
    pub batches_committed: usize,
    pub stopped_early: bool,
    /// (transaction id, message) for rows whose update failed.
    pub errors: Vec<(String, String)>,
}

/// Recompute the category of every transaction in fixed-size batches.
///
/// Each batch commits on its own: a failed commit aborts that batch and is
/// returned as `BatchCommit`, earlier batches stay written. A failed row
/// update is recorded in `errors` and the batch carries on.
pub fn recategorize_all(
    conn: &Connection,
    snapshot: &CategorizerSnapshot<'_>,
    opts: &RecategorizeOptions,
) -> Result<RecategorizeReport> {
    let started = Instant::now();
    let batch_size = opts.batch_size.unwrap_or(BATCH_SIZE).max(1);
    let transactions = load_transactions(conn, None)?;
    let mut report = RecategorizeReport::default();

    for (batch_no, batch) in transactions.chunks(batch_size).enumerate() {
        if let Some(budget) = opts.time_budget {
            if started.elapsed() >= budget {
                log::info!("time budget spent after {} batches, stopping", report.batches_committed);
                report.stopped_early = true;
                break;
            }
        }

        let tx = conn.unchecked_transaction()?;
        for txn in batch {
            report.processed += 1;
            if txn.category_source == CategorySource::Manual && !opts.include_manual {
                report.skipped_manual += 1;
                continue;
            }
            let decision = snapshot.categorize(&txn.description, txn.counterparty.as_deref());
            if decision.same_as_stored(txn) {
                report.unchanged += 1;
                continue;
            }
            match write_categorization(&tx, &txn.id, &decision) {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    log::warn!("recategorize {} failed: {e}", txn.id);
                    report.errors.push((txn.id.clone(), e.to_string()));
                }
            }
        }
        tx.commit().map_err(|source| TallyError::BatchCommit {
            batch: batch_no + 1,
            committed: report.batches_committed,
            source,
        })?;
        report.batches_committed += 1;
        log::info!("batch {} committed ({} rows)", batch_no + 1, batch.len());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::get_transaction;
    use crate::db::insert_transaction;
    use crate::db::test_support::{add_rule, test_db, txn};
    use crate::merchants::MerchantMapping;
    use crate::models::MatchType;

    fn category(id: &str, name: &str, parent: Option<&str>) -> Category {
        Category {
            id: id.into(),
            name: name.into(),
            parent_id: parent.map(Into::into),
            color: "#000".into(),
            icon: "tag".into(),
            order: 0,
            is_system: false,
        }
    }

    fn rule(pattern: &str, category: &str, priority: i64, learned: bool) -> Rule {
        Rule {
            id: format!("{pattern}-{priority}"),
            pattern: pattern.into(),
            match_type: MatchType::Contains,
            category_id: category.into(),
            priority,
            is_learned: learned,
        }
    }

    fn merchants() -> MerchantDatabase {
        MerchantDatabase::new(vec![
            MerchantMapping { pattern: "ALBERT HEIJN".into(), category_slug: "groceries".into(), confidence: 0.9 },
            MerchantMapping { pattern: "SPOTIFY".into(), category_slug: "subscriptions".into(), confidence: 0.95 },
            MerchantMapping { pattern: "SHELL".into(), category_slug: "fuel".into(), confidence: 0.8 },
        ])
    }

    fn categories() -> Vec<Category> {
        vec![
            category("groceries", "Groceries", None),
            category("car", "Car", None),
            category("music", "Music", None),
        ]
    }

    #[test]
    fn test_rule_preempts_merchant() {
        let db = merchants();
        let snap = CategorizerSnapshot::new(
            vec![rule("Albert Heijn", "groceries", 10, false)],
            categories(),
            &db,
        );
        let c = snap.categorize("ALBERT HEIJN 1234", None);
        assert_eq!(c.category_id.as_deref(), Some("groceries"));
        assert_eq!(c.confidence, 1.0);
        assert_eq!(c.source, CategorySource::Rule);
        assert_eq!(c.matched_pattern.as_deref(), Some("Albert Heijn"));
    }

    #[test]
    fn test_user_rule_beats_learned_and_merchant() {
        let db = merchants();
        let snap = CategorizerSnapshot::new(
            vec![rule("heijn", "car", 100, true), rule("albert", "music", 0, false)],
            categories(),
            &db,
        );
        let c = snap.categorize("ALBERT HEIJN", None);
        assert_eq!(c.source, CategorySource::Rule);
        assert_eq!(c.category_id.as_deref(), Some("music"));
    }

    #[test]
    fn test_merchant_used_when_no_rule() {
        let db = merchants();
        let snap = CategorizerSnapshot::new(vec![], categories(), &db);
        let c = snap.categorize("albert heijn 1234", None);
        assert_eq!(c.source, CategorySource::Merchant);
        assert_eq!(c.category_id.as_deref(), Some("groceries"));
        assert_eq!(c.confidence, 0.9);
        assert_eq!(c.matched_pattern.as_deref(), Some("ALBERT HEIJN"));
    }

    #[test]
    fn test_unresolved_merchant_falls_through_to_learned() {
        let db = merchants();
        let snap = CategorizerSnapshot::new(vec![rule("spotify", "music", 0, true)], categories(), &db);
        let c = snap.categorize("SPOTIFY P0123", None);
        assert_eq!(c.source, CategorySource::Learned);
        assert_eq!(c.category_id.as_deref(), Some("music"));
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_merchant_beats_learned() {
        let db = merchants();
        let snap = CategorizerSnapshot::new(vec![rule("shell", "groceries", 50, true)], {
            let mut c = categories();
            c.push(category("fuel", "Fuel", Some("car")));
            c
        }, &db);
        let c = snap.categorize("SHELL 0042", None);
        assert_eq!(c.source, CategorySource::Merchant);
        assert_eq!(c.category_id.as_deref(), Some("fuel"));
    }

    #[test]
    fn test_no_match_is_none_result() {
        let db = merchants();
        let snap = CategorizerSnapshot::new(vec![], categories(), &db);
        let c = snap.categorize("CORNER SHOP", Some("Mr. Smith"));
        assert_eq!(c, Categorization::none());
        assert_eq!(c.confidence, 0.0);
        assert!(c.category_id.is_none());
    }

    #[test]
    fn test_counterparty_is_searched() {
        let db = merchants();
        let snap = CategorizerSnapshot::new(vec![rule("landlord bv", "car", 0, false)], categories(), &db);
        let c = snap.categorize("SEPA TRANSFER", Some("Landlord BV"));
        assert_eq!(c.category_id.as_deref(), Some("car"));
    }

    #[test]
    fn test_rule_for_unknown_category_is_dropped() {
        let db = merchants();
        let snap = CategorizerSnapshot::new(vec![rule("corner", "deleted", 5, false)], categories(), &db);
        assert_eq!(snap.categorize("CORNER SHOP", None).source, CategorySource::None);
    }

    #[test]
    fn test_equal_priority_keeps_list_order() {
        let db = merchants();
        let snap = CategorizerSnapshot::new(
            vec![rule("shop", "music", 3, false), rule("shop", "car", 3, false)],
            categories(),
            &db,
        );
        assert_eq!(snap.categorize("SHOP", None).category_id.as_deref(), Some("music"));
    }

    #[test]
    fn test_session_requires_initialize() {
        let (_dir, conn) = test_db();
        let db = merchants();
        let mut session = Categorizer::new(&db);
        let err = session.categorize("ALBERT HEIJN", None).unwrap_err();
        assert!(matches!(err, TallyError::NotInitialized));

        session.initialize(&conn).unwrap();
        assert!(session.snapshot().is_ok());
        let c = session.categorize("ALBERT HEIJN", None).unwrap();
        assert_eq!(c.category_id.as_deref(), Some("food.groceries"));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (_dir, conn) = test_db();
        let db = merchants();
        let mut session = Categorizer::new(&db);
        session.initialize(&conn).unwrap();
        add_rule(&conn, "r1", "albert", "shopping", 1, false);
        session.initialize(&conn).unwrap();
        // second call did not reload, so the new rule is not seen
        let c = session.categorize("ALBERT HEIJN", None).unwrap();
        assert_eq!(c.source, CategorySource::Merchant);
    }

    #[test]
    fn test_categorize_uncategorized_updates_store() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, &txn("t1", "2025-01-02", -30.0, "ALBERT HEIJN 12"), None).unwrap();
        insert_transaction(&conn, &txn("t2", "2025-01-03", -9.0, "RANDOM VENDOR"), None).unwrap();
        add_rule(&conn, "r1", "random", "shopping", 0, false);
        let db = merchants();
        let snap = CategorizerSnapshot::load(&conn, &db).unwrap();
        let result = categorize_uncategorized(&conn, &snap).unwrap();
        assert_eq!(result.categorized, 2);
        assert_eq!(result.still_uncategorized, 0);

        let t2 = get_transaction(&conn, "t2").unwrap();
        assert_eq!(t2.category_id.as_deref(), Some("shopping"));
        assert_eq!(t2.category_source, CategorySource::Rule);
        let hits: i64 = conn.query_row("SELECT hit_count FROM rules WHERE id = 'r1'", [], |r| r.get(0)).unwrap();
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_recategorize_skips_manual_and_counts_unchanged() {
        let (_dir, conn) = test_db();
        let mut manual = txn("m", "2025-01-01", -5.0, "ALBERT HEIJN");
        manual.category_id = Some("shopping".into());
        manual.category_source = CategorySource::Manual;
        manual.category_confidence = 1.0;
        insert_transaction(&conn, &manual, None).unwrap();
        insert_transaction(&conn, &txn("a", "2025-01-02", -5.0, "ALBERT HEIJN"), None).unwrap();
        insert_transaction(&conn, &txn("b", "2025-01-03", -5.0, "NOTHING"), None).unwrap();

        let db = merchants();
        let snap = CategorizerSnapshot::load(&conn, &db).unwrap();
        let report = recategorize_all(&conn, &snap, &RecategorizeOptions::default()).unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.skipped_manual, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.unchanged, 1);
        assert!(report.errors.is_empty());
        assert_eq!(get_transaction(&conn, "m").unwrap().category_id.as_deref(), Some("shopping"));

        // running again writes nothing
        let again = recategorize_all(&conn, &snap, &RecategorizeOptions::default()).unwrap();
        assert_eq!(again.updated, 0);
        assert_eq!(again.unchanged, 2);
    }

    #[test]
    fn test_recategorize_include_manual_overwrites() {
        let (_dir, conn) = test_db();
        let mut manual = txn("m", "2025-01-01", -5.0, "ALBERT HEIJN");
        manual.category_id = Some("shopping".into());
        manual.category_source = CategorySource::Manual;
        manual.category_confidence = 1.0;
        insert_transaction(&conn, &manual, None).unwrap();
        let db = merchants();
        let snap = CategorizerSnapshot::load(&conn, &db).unwrap();
        let opts = RecategorizeOptions { include_manual: true, ..Default::default() };
        let report = recategorize_all(&conn, &snap, &opts).unwrap();
        assert_eq!(report.updated, 1);
        let t = get_transaction(&conn, "m").unwrap();
        assert_eq!(t.category_source, CategorySource::Merchant);
        assert_eq!(t.category_id.as_deref(), Some("food.groceries"));
    }

    #[test]
    fn test_recategorize_runs_in_batches() {
        let (_dir, conn) = test_db();
        for i in 0..7 {
            insert_transaction(&conn, &txn(&format!("t{i}"), "2025-01-01", -1.0, "SHELL"), None).unwrap();
        }
        let db = merchants();
        let snap = CategorizerSnapshot::load(&conn, &db).unwrap();
        let opts = RecategorizeOptions { batch_size: Some(3), ..Default::default() };
        let report = recategorize_all(&conn, &snap, &opts).unwrap();
        assert_eq!(report.batches_committed, 3);
        assert_eq!(report.updated, 7);
        assert!(!report.stopped_early);
    }

    #[test]
    fn test_failed_row_is_recorded_and_batch_continues() {
        let (_dir, conn) = test_db();
        for (i, date) in ["2025-01-01", "2025-01-02", "2025-01-03"].iter().enumerate() {
            insert_transaction(&conn, &txn(&format!("t{i}"), date, -1.0, "SHELL"), None).unwrap();
        }
        conn.execute_batch(
            "CREATE TRIGGER reject_t1 BEFORE UPDATE ON transactions WHEN OLD.id = 't1'
             BEGIN SELECT RAISE(ABORT, 'nope'); END;",
        )
        .unwrap();
        let db = merchants();
        let snap = CategorizerSnapshot::load(&conn, &db).unwrap();
        let report = recategorize_all(&conn, &snap, &RecategorizeOptions::default()).unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(report.batches_committed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "t1");
        assert!(report.errors[0].1.contains("nope"), "got: {}", report.errors[0].1);
        assert_eq!(get_transaction(&conn, "t0").unwrap().category_source, CategorySource::Merchant);
        assert_eq!(get_transaction(&conn, "t1").unwrap().category_source, CategorySource::None);
        assert_eq!(get_transaction(&conn, "t2").unwrap().category_source, CategorySource::Merchant);
    }

    #[test]
    fn test_failed_commit_keeps_earlier_batches() {
        let (_dir, conn) = test_db();
        for (i, date) in ["2025-01-01", "2025-01-02", "2025-01-03", "2025-01-04"].iter().enumerate() {
            insert_transaction(&conn, &txn(&format!("t{}", i + 1), date, -1.0, "SHELL"), None).unwrap();
        }
        // deferred foreign key: the bad row is only caught at COMMIT
        conn.execute_batch(
            "CREATE TABLE audit (category_id TEXT REFERENCES categories(id) DEFERRABLE INITIALLY DEFERRED);
             CREATE TRIGGER audit_t3 AFTER UPDATE ON transactions WHEN NEW.id = 't3'
             BEGIN INSERT INTO audit VALUES ('missing'); END;",
        )
        .unwrap();
        let db = merchants();
        let snap = CategorizerSnapshot::load(&conn, &db).unwrap();
        let opts = RecategorizeOptions { batch_size: Some(2), ..Default::default() };
        match recategorize_all(&conn, &snap, &opts) {
            Err(TallyError::BatchCommit { batch, committed, .. }) => {
                assert_eq!(batch, 2);
                assert_eq!(committed, 1);
            }
            other => panic!("expected BatchCommit, got {other:?}"),
        }
        for id in ["t1", "t2"] {
            let t = get_transaction(&conn, id).unwrap();
            assert_eq!(t.category_source, CategorySource::Merchant);
            assert_eq!(t.category_id.as_deref(), Some("transport.fuel"));
        }
        for id in ["t3", "t4"] {
            assert_eq!(get_transaction(&conn, id).unwrap().category_source, CategorySource::None);
        }
        let audit: i64 = conn.query_row("SELECT COUNT(*) FROM audit", [], |r| r.get(0)).unwrap();
        assert_eq!(audit, 0);
    }

    #[test]
    fn test_zero_time_budget_attempts_nothing() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, &txn("t", "2025-01-01", -1.0, "SHELL"), None).unwrap();
        let db = merchants();
        let snap = CategorizerSnapshot::load(&conn, &db).unwrap();
        let opts = RecategorizeOptions { time_budget: Some(Duration::ZERO), ..Default::default() };
        let report = recategorize_all(&conn, &snap, &opts).unwrap();
        assert!(report.stopped_early);
        assert_eq!(report.batches_committed, 0);
        assert_eq!(get_transaction(&conn, "t").unwrap().category_source, CategorySource::None);
    }
}
