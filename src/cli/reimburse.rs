use colored::Colorize;
use comfy_table::{Cell, Table};
use serde_json::json;

use crate::cli::open;
use crate::error::Result;
use crate::fmt::money;
use crate::models::ReimbursementKind;
use crate::reimbursements::{clear_reimbursement, mark_reimbursable, unmark_reimbursable};
use crate::reports;

pub fn mark(txn_id: &str, kind: &str, note: Option<&str>) -> Result<()> {
    let (_, conn) = open()?;
    let kind: ReimbursementKind = kind.parse()?;
    mark_reimbursable(&conn, txn_id, kind, note)?;
    println!("{txn_id} marked reimbursable ({kind})");
    Ok(())
}

pub fn clear(txn_id: &str, date: Option<String>) -> Result<()> {
    let (_, conn) = open()?;
    let date = date.unwrap_or_else(|| chrono::Local::now().date_naive().format("%Y-%m-%d").to_string());
    clear_reimbursement(&conn, txn_id, &date)?;
    println!("{txn_id} reimbursed on {date}");
    Ok(())
}

pub fn unmark(txn_id: &str) -> Result<()> {
    let (_, conn) = open()?;
    unmark_reimbursable(&conn, txn_id)?;
    println!("{txn_id} is no longer reimbursable");
    Ok(())
}

pub fn summary(as_json: bool) -> Result<()> {
    let (settings, conn) = open()?;
    let report = reports::get_reimbursements(&conn, None)?;
    let s = &report.summary;

    if as_json {
        let pending: Vec<_> = report
            .pending
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "date": t.date.format("%Y-%m-%d").to_string(),
                    "description": t.description,
                    "amount": t.amount.abs(),
                    "type": t.reimbursement.as_ref().map(|r| r.kind),
                    "note": t.reimbursement.as_ref().and_then(|r| r.note.clone()),
                })
            })
            .collect();
        let out = json!({ "summary": s, "pending": pending });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let cur = settings.currency.as_str();
    println!("Pending:  {} ({} items)", money(s.pending_total, cur).yellow(), s.pending_count);
    println!("  work:     {}", money(s.pending_work_total, cur));
    println!("  personal: {}", money(s.pending_personal_total, cur));
    println!("Cleared:  {} ({} items)", money(s.cleared_total, cur).green(), s.cleared_count);

    if !report.pending.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["ID", "Date", "Description", "Type", "Amount", "Note"]);
        for t in &report.pending {
            let r = t.reimbursement.as_ref();
            table.add_row(vec![
                Cell::new(&t.id),
                Cell::new(t.date),
                Cell::new(&t.description),
                Cell::new(r.map(|r| r.kind.as_str()).unwrap_or("")),
                Cell::new(money(t.amount.abs(), cur)),
                Cell::new(r.and_then(|r| r.note.as_deref()).unwrap_or("")),
            ]);
        }
        println!("\nPending reimbursements\n{table}");
    }
    Ok(())
}
