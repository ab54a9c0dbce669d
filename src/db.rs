use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};

use crate::error::{Result, TallyError};
use crate::models::{
    Budget, Category, DateRange, Reimbursement, ReimbursementKind, ReimbursementStatus, Rule,
    Split, Transaction,
};
use crate::slugs::simple_name;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    parent_id TEXT,
    color TEXT NOT NULL DEFAULT '#9e9e9e',
    icon TEXT NOT NULL DEFAULT 'tag',
    sort_order INTEGER NOT NULL DEFAULT 0,
    is_system INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (parent_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    record_count INTEGER,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT
);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    date TEXT NOT NULL,
    amount REAL NOT NULL,
    description TEXT NOT NULL,
    counterparty TEXT,
    category_id TEXT,
    category_source TEXT NOT NULL DEFAULT 'none',
    category_confidence REAL NOT NULL DEFAULT 0,
    is_split INTEGER NOT NULL DEFAULT 0,
    splits TEXT,
    currency TEXT NOT NULL DEFAULT 'EUR',
    reimbursement_status TEXT,
    reimbursement_type TEXT,
    reimbursement_note TEXT,
    reimbursement_cleared_at TEXT,
    import_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id),
    FOREIGN KEY (import_id) REFERENCES imports(id)
);

CREATE TABLE IF NOT EXISTS rules (
    id TEXT PRIMARY KEY,
    pattern TEXT NOT NULL,
    match_type TEXT NOT NULL DEFAULT 'contains',
    category_id TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    is_learned INTEGER NOT NULL DEFAULT 0,
    hit_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS budgets (
    id TEXT PRIMARY KEY,
    category_id TEXT NOT NULL,
    monthly_limit REAL NOT NULL,
    alert_threshold REAL NOT NULL DEFAULT 80,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);
";

// (name, parent name, color, icon)
const DEFAULT_CATEGORIES: &[(&str, Option<&str>, &str, &str)] = &[
    ("Food", None, "#4caf50", "utensils"),
    ("Groceries", Some("Food"), "#66bb6a", "shopping-basket"),
    ("Restaurants", Some("Food"), "#81c784", "utensils"),
    ("Coffee", Some("Food"), "#a5d6a7", "coffee"),
    ("Transport", None, "#2196f3", "car"),
    ("Fuel", Some("Transport"), "#42a5f5", "gas-pump"),
    ("Public Transport", Some("Transport"), "#64b5f6", "train"),
    ("Taxi", Some("Transport"), "#90caf9", "taxi"),
    ("Housing", None, "#795548", "home"),
    ("Rent", Some("Housing"), "#8d6e63", "key"),
    ("Utilities", Some("Housing"), "#a1887f", "bolt"),
    ("Shopping", None, "#e91e63", "bag"),
    ("Clothing", Some("Shopping"), "#ec407a", "shirt"),
    ("Electronics", Some("Shopping"), "#f06292", "laptop"),
    ("Entertainment", None, "#9c27b0", "film"),
    ("Subscriptions", Some("Entertainment"), "#ab47bc", "repeat"),
    ("Health", None, "#f44336", "heart"),
    ("Pharmacy", Some("Health"), "#ef5350", "pills"),
    ("Income", None, "#009688", "wallet"),
    ("Salary", Some("Income"), "#26a69a", "briefcase"),
    ("Transfers", None, "#607d8b", "exchange"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |row| row.get(0))?;
    if count == 0 {
        for (order, (name, parent, color, icon)) in DEFAULT_CATEGORIES.iter().enumerate() {
            let parent_id = parent.map(|p| category_id_for(p, None));
            conn.execute(
                "INSERT INTO categories (id, name, parent_id, color, icon, sort_order, is_system) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
                rusqlite::params![
                    category_id_for(name, parent_id.as_deref()),
                    name,
                    parent_id,
                    color,
                    icon,
                    order as i64
                ],
            )?;
        }
    }
    Ok(())
}

/// Category ids are readable paths: "food", "food.groceries".
pub fn category_id_for(name: &str, parent_id: Option<&str>) -> String {
    match parent_id {
        Some(parent) => format!("{parent}.{}", simple_name(name)),
        None => simple_name(name),
    }
}

/// Short content-derived id: `prefix_` + 16 hex chars of SHA-256 over `parts`.
pub fn hash_id(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hex::encode(hasher.finalize());
    format!("{prefix}_{}", &digest[..16])
}

/// Id for rows the user creates (rules, budgets): unique per call.
pub fn fresh_id(prefix: &str, parts: &[&str]) -> String {
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
    let mut all: Vec<&str> = parts.to_vec();
    all.push(&now);
    hash_id(prefix, &all)
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

pub fn load_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, parent_id, color, icon, sort_order, is_system \
         FROM categories ORDER BY sort_order, rowid",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                parent_id: row.get(2)?,
                color: row.get(3)?,
                icon: row.get(4)?,
                order: row.get(5)?,
                is_system: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// All rules, highest priority first; equal priorities keep creation order.
pub fn load_rules(conn: &Connection) -> Result<Vec<Rule>> {
    let mut stmt = conn.prepare(
        "SELECT id, pattern, match_type, category_id, priority, is_learned \
         FROM rules ORDER BY priority DESC, rowid ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Rule {
                id: row.get(0)?,
                pattern: row.get(1)?,
                match_type: row.get(2)?,
                category_id: row.get(3)?,
                priority: row.get(4)?,
                is_learned: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_budgets(conn: &Connection) -> Result<Vec<Budget>> {
    let mut stmt = conn.prepare(
        "SELECT id, category_id, monthly_limit, alert_threshold, is_active \
         FROM budgets ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Budget {
                id: row.get(0)?,
                category_id: row.get(1)?,
                monthly_limit: row.get(2)?,
                alert_threshold: row.get(3)?,
                is_active: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

const TXN_COLUMNS: &str = "id, date, amount, description, counterparty, category_id, \
     category_source, category_confidence, is_split, splits, currency, \
     reimbursement_status, reimbursement_type, reimbursement_note, reimbursement_cleared_at";

fn txn_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let splits_json: Option<String> = row.get(9)?;
    let splits: Vec<Split> = match splits_json {
        Some(json) if !json.is_empty() => {
            serde_json::from_str(&json).map_err(|e| conversion_error(9, e))?
        }
        _ => Vec::new(),
    };
    let status: Option<ReimbursementStatus> = row.get(11)?;
    let kind: Option<ReimbursementKind> = row.get(12)?;
    let reimbursement = match (status, kind) {
        (Some(status), Some(kind)) => Some(Reimbursement {
            status,
            kind,
            note: row.get(13)?,
            cleared_at: row.get(14)?,
        }),
        _ => None,
    };
    Ok(Transaction {
        id: row.get(0)?,
        date: date_column(row, 1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        counterparty: row.get(4)?,
        category_id: row.get(5)?,
        category_source: row.get(6)?,
        category_confidence: row.get(7)?,
        is_split: row.get(8)?,
        splits,
        reimbursement,
        currency: row.get(10)?,
    })
}

/// Transactions in `range` (all when `None`), oldest first.
pub fn load_transactions(conn: &Connection, range: Option<&DateRange>) -> Result<Vec<Transaction>> {
    let rows = match range {
        Some(r) => {
            let sql = format!(
                "SELECT {TXN_COLUMNS} FROM transactions \
                 WHERE date BETWEEN ?1 AND ?2 ORDER BY date, rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    [r.start.format("%Y-%m-%d").to_string(), r.end.format("%Y-%m-%d").to_string()],
                    txn_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("SELECT {TXN_COLUMNS} FROM transactions ORDER BY date, rowid");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], txn_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn get_transaction(conn: &Connection, id: &str) -> Result<Transaction> {
    let sql = format!("SELECT {TXN_COLUMNS} FROM transactions WHERE id = ?1");
    conn.query_row(&sql, [id], txn_from_row)
        .optional()?
        .ok_or_else(|| TallyError::UnknownTransaction(id.to_string()))
}

pub fn insert_transaction(conn: &Connection, txn: &Transaction, import_id: Option<i64>) -> Result<()> {
    let splits = if txn.splits.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&txn.splits)?)
    };
    let r = txn.reimbursement.as_ref();
    conn.execute(
        "INSERT INTO transactions (id, date, amount, description, counterparty, category_id, \
         category_source, category_confidence, is_split, splits, currency, reimbursement_status, \
         reimbursement_type, reimbursement_note, reimbursement_cleared_at, import_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        rusqlite::params![
            txn.id,
            txn.date.format("%Y-%m-%d").to_string(),
            txn.amount,
            txn.description,
            txn.counterparty,
            txn.category_id,
            txn.category_source,
            txn.category_confidence,
            txn.is_split,
            splits,
            txn.currency,
            r.map(|r| r.status),
            r.map(|r| r.kind),
            r.and_then(|r| r.note.clone()),
            r.and_then(|r| r.cleared_at.clone()),
            import_id,
        ],
    )?;
    Ok(())
}

pub fn category_exists(conn: &Connection, id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn require_category(conn: &Connection, id: &str) -> Result<()> {
    if category_exists(conn, id)? {
        Ok(())
    } else {
        Err(TallyError::UnknownCategory(id.to_string()))
    }
}
