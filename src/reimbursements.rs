use rusqlite::Connection;

use crate::db::get_transaction;
use crate::error::{Result, TallyError};
use crate::models::{parse_date, ReimbursementKind, ReimbursementStatus};

/// Flag an expense as money to be paid back. Income cannot be reimbursable.
pub fn mark_reimbursable(
    conn: &Connection,
    txn_id: &str,
    kind: ReimbursementKind,
    note: Option<&str>,
) -> Result<()> {
    let txn = get_transaction(conn, txn_id)?;
    if !txn.is_expense() {
        return Err(TallyError::InvalidInput(format!(
            "transaction {txn_id} is not an expense (amount {})",
            txn.amount
        )));
    }
    conn.execute(
        "UPDATE transactions SET reimbursement_status = ?1, reimbursement_type = ?2, \
         reimbursement_note = ?3, reimbursement_cleared_at = NULL WHERE id = ?4",
        rusqlite::params![ReimbursementStatus::Pending, kind, note, txn_id],
    )?;
    Ok(())
}

/// Mark a pending reimbursement as paid back on `cleared_at` (YYYY-MM-DD).
pub fn clear_reimbursement(conn: &Connection, txn_id: &str, cleared_at: &str) -> Result<()> {
    parse_date(cleared_at)?;
    let txn = get_transaction(conn, txn_id)?;
    match txn.reimbursable().map(|r| r.status) {
        Some(ReimbursementStatus::Pending) => {}
        Some(ReimbursementStatus::Cleared) => {
            return Err(TallyError::InvalidInput(format!("reimbursement {txn_id} is already cleared")));
        }
        None => {
            return Err(TallyError::InvalidInput(format!("transaction {txn_id} is not reimbursable")));
        }
    }
    conn.execute(
        "UPDATE transactions SET reimbursement_status = ?1, reimbursement_cleared_at = ?2 WHERE id = ?3",
        rusqlite::params![ReimbursementStatus::Cleared, cleared_at, txn_id],
    )?;
    Ok(())
}

/// Drop the reimbursement flag entirely.
pub fn unmark_reimbursable(conn: &Connection, txn_id: &str) -> Result<()> {
    get_transaction(conn, txn_id)?;
    conn.execute(
        "UPDATE transactions SET reimbursement_status = NULL, reimbursement_type = NULL, \
         reimbursement_note = NULL, reimbursement_cleared_at = NULL WHERE id = ?1",
        [txn_id],
    )?;
    Ok(())
}
