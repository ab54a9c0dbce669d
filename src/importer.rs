use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::db::{hash_id, insert_transaction};
use crate::error::{Result, TallyError};
use crate::models::{CategorySource, Transaction};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// "1,234.50", "$12", "(40.00)" -> signed amount. Parentheses mean negative.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace([',', '"', '$', '€', '£'], "");
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    s.parse().ok().filter(|v: &f64| v.is_finite())
}

/// ISO dates first, then US-style M/D/YYYY.
pub fn parse_date_flexible(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let m: u32 = parts[0].parse().ok()?;
    let d: u32 = parts[1].parse().ok()?;
    let y: i32 = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn transaction_exists(conn: &Connection, id: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM transactions WHERE id = ?1")?;
    Ok(stmt.exists([id])?)
}

// ---------------------------------------------------------------------------
// Normalized CSV
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    description: String,
    amount: String,
    #[serde(default)]
    counterparty: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}

/// Parse a normalized CSV (`date,description,amount[,counterparty][,currency]`)
/// into uncategorized transactions.
///
/// Ids hash the row content plus its occurrence number within the file, so
/// two identical rows stay distinct while a re-import maps onto the same ids.
pub fn parse_csv(file_path: &Path, default_currency: &str) -> Result<Vec<Transaction>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(file_path)?;

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();
    for (i, record) in reader.deserialize::<CsvRow>().enumerate() {
        let line = i + 2;
        let row = record?;
        let date = parse_date_flexible(&row.date)
            .ok_or_else(|| TallyError::InvalidInput(format!("line {line}: bad date '{}'", row.date)))?;
        let amount = parse_amount(&row.amount)
            .ok_or_else(|| TallyError::InvalidInput(format!("line {line}: bad amount '{}'", row.amount)))?;
        if row.description.is_empty() {
            return Err(TallyError::InvalidInput(format!("line {line}: empty description")));
        }
        let counterparty = row.counterparty.filter(|c| !c.is_empty());
        let currency = row
            .currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| default_currency.to_string());

        let date_s = date.format("%Y-%m-%d").to_string();
        let amount_s = format!("{amount:.2}");
        let key = format!("{date_s}|{amount_s}|{}|{}", row.description, counterparty.as_deref().unwrap_or(""));
        let occurrence = seen.entry(key).or_insert(0);
        *occurrence += 1;
        let id = hash_id(
            "txn",
            &[
                &date_s,
                &amount_s,
                &row.description,
                counterparty.as_deref().unwrap_or(""),
                &occurrence.to_string(),
            ],
        );

        out.push(Transaction {
            id,
            date,
            amount,
            description: row.description,
            counterparty,
            category_id: None,
            category_source: CategorySource::None,
            category_confidence: 0.0,
            is_split: false,
            splits: Vec::new(),
            reimbursement: None,
            currency,
        });
    }
    Ok(out)
}

pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub duplicate_file: bool,
}

pub fn import_csv(conn: &Connection, file_path: &Path, default_currency: &str) -> Result<ImportResult> {
    let checksum = compute_checksum(file_path)?;
    {
        let mut stmt = conn.prepare("SELECT 1 FROM imports WHERE checksum = ?1")?;
        if stmt.exists([&checksum])? {
            return Ok(ImportResult {
                imported: 0,
                skipped: 0,
                duplicate_file: true,
            });
        }
    }

    let parsed = parse_csv(file_path, default_currency)?;

    let tx = conn.unchecked_transaction()?;
    let min_date = parsed.iter().map(|t| t.date).min();
    let max_date = parsed.iter().map(|t| t.date).max();
    tx.execute(
        "INSERT INTO imports (filename, record_count, date_range_start, date_range_end, checksum) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            file_path.file_name().and_then(|n| n.to_str()).unwrap_or(""),
            parsed.len() as i64,
            min_date.map(|d| d.format("%Y-%m-%d").to_string()),
            max_date.map(|d| d.format("%Y-%m-%d").to_string()),
            checksum,
        ],
    )?;
    let import_id = tx.last_insert_rowid();

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for txn in &parsed {
        if transaction_exists(&tx, &txn.id)? {
            log::debug!("skipping duplicate {} ({} {})", txn.id, txn.date, txn.description);
            skipped += 1;
            continue;
        }
        insert_transaction(&tx, txn, Some(import_id))?;
        imported += 1;
    }
    tx.commit()?;

    log::info!("imported {imported} rows from {}, {skipped} duplicates", file_path.display());
    Ok(ImportResult {
        imported,
        skipped,
        duplicate_file: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::load_transactions;
    use crate::db::test_support::test_db;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.50"), Some(1234.5));
        assert_eq!(parse_amount("(40.00)"), Some(-40.0));
        assert_eq!(parse_amount("-$12"), Some(-12.0));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("NaN"), None);
    }

    #[test]
    fn test_parse_date_flexible() {
        assert_eq!(parse_date_flexible("2025-01-15"), NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(parse_date_flexible("1/15/2025"), NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(parse_date_flexible("15.01.2025"), None);
        assert_eq!(parse_date_flexible("2/30/2025"), None);
    }

    #[test]
    fn test_parse_csv_optional_columns_and_identical_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "a.csv",
            "date,description,amount,counterparty\n\
             2025-01-02,COFFEE,-3.50,\n\
             2025-01-02,COFFEE,-3.50,\n\
             2025-01-03,SALARY,2500,ACME BV\n",
        );
        let rows = parse_csv(&path, "EUR").unwrap();
        assert_eq!(rows.len(), 3);
        assert_ne!(rows[0].id, rows[1].id);
        assert!(rows[0].counterparty.is_none());
        assert_eq!(rows[2].counterparty.as_deref(), Some("ACME BV"));
        assert_eq!(rows[2].currency, "EUR");
    }

    #[test]
    fn test_parse_csv_rejects_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bad.csv", "date,description,amount\n2025-01-02,X,lots\n");
        let err = parse_csv(&path, "EUR").unwrap_err();
        assert!(err.to_string().contains("line 2: bad amount"), "got: {err}");
    }

    #[test]
    fn test_import_is_idempotent() {
        let (dir, conn) = test_db();
        let first = write(&dir, "jan.csv", "date,description,amount\n2025-01-02,LIDL,-20\n2025-01-05,NS GROEP,-4.2\n");
        let r = import_csv(&conn, &first, "EUR").unwrap();
        assert_eq!(r.imported, 2);
        assert!(!r.duplicate_file);

        let again = import_csv(&conn, &first, "EUR").unwrap();
        assert!(again.duplicate_file);

        // a different file overlapping the first only adds the new row
        let overlap = write(
            &dir,
            "jan2.csv",
            "date,description,amount\n2025-01-02,LIDL,-20\n2025-01-09,ETOS,-7\n",
        );
        let r = import_csv(&conn, &overlap, "EUR").unwrap();
        assert_eq!(r.imported, 1);
        assert_eq!(r.skipped, 1);
        assert_eq!(load_transactions(&conn, None).unwrap().len(), 3);
    }
}
