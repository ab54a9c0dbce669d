use std::time::Duration;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::categorizer::{categorize_uncategorized, recategorize_all, Categorizer, RecategorizeOptions};
use crate::cli::open;
use crate::error::{Result, TallyError};
use crate::fmt::money;
use crate::importer::parse_amount;
use crate::models::Split;
use crate::reviewer::{apply_review, get_uncategorized, split_transaction};

pub fn run() -> Result<()> {
    let (settings, conn) = open()?;
    let merchants = settings.merchants()?;
    let mut categorizer = Categorizer::new(&merchants);
    categorizer.initialize(&conn)?;

    let result = categorize_uncategorized(&conn, categorizer.snapshot()?)?;
    println!(
        "{} categorized, {} still uncategorized",
        result.categorized, result.still_uncategorized
    );
    Ok(())
}

pub fn all(include_manual: bool, time_budget: Option<u64>) -> Result<()> {
    let (settings, conn) = open()?;
    let merchants = settings.merchants()?;
    let mut categorizer = Categorizer::new(&merchants);
    categorizer.initialize(&conn)?;

    let opts = RecategorizeOptions {
        include_manual,
        time_budget: time_budget.map(Duration::from_secs),
        batch_size: None,
    };
    let report = recategorize_all(&conn, categorizer.snapshot()?, &opts)?;

    println!(
        "{} processed: {} updated, {} unchanged, {} manual kept ({} batches)",
        report.processed, report.updated, report.unchanged, report.skipped_manual, report.batches_committed
    );
    if report.stopped_early {
        println!("{}", "Time budget reached; run again to finish.".yellow());
    }
    for (id, message) in &report.errors {
        println!("{} {id}: {message}", "failed".red());
    }
    Ok(())
}

pub fn set(txn_id: &str, category_id: &str, learn: bool) -> Result<()> {
    let (_, conn) = open()?;
    let learned = apply_review(&conn, txn_id, category_id, learn)?;
    println!("{txn_id} \u{2192} {category_id}");
    if let Some(rule_id) = learned {
        println!("Learned rule {rule_id}");
    }
    Ok(())
}

pub fn explain(description: &str, counterparty: Option<&str>) -> Result<()> {
    let (settings, conn) = open()?;
    let merchants = settings.merchants()?;
    let mut categorizer = Categorizer::new(&merchants);
    categorizer.initialize(&conn)?;

    let c = categorizer.categorize(description, counterparty)?;
    match &c.category_id {
        Some(id) => println!(
            "{id} via {} ({:.2}){}",
            c.source,
            c.confidence,
            c.matched_pattern
                .as_deref()
                .map(|p| format!(", pattern '{p}'"))
                .unwrap_or_default()
        ),
        None => println!("{}", "No match".yellow()),
    }
    Ok(())
}

/// "food.groceries=-60" or "food=-12.50=lunch" -> split part.
fn parse_split_part(raw: &str) -> Result<Split> {
    let mut fields = raw.splitn(3, '=');
    let category = fields.next().unwrap_or("").trim();
    let amount = fields
        .next()
        .and_then(parse_amount)
        .ok_or_else(|| TallyError::InvalidInput(format!("bad split part '{raw}', expected CATEGORY=AMOUNT")))?;
    Ok(Split {
        category_id: Some(category.to_string()).filter(|c| !c.is_empty()),
        amount,
        description: fields.next().map(str::to_string),
    })
}

pub fn split(txn_id: &str, parts: &[String]) -> Result<()> {
    let (_, conn) = open()?;
    let splits = parts
        .iter()
        .map(|p| parse_split_part(p))
        .collect::<Result<Vec<_>>>()?;
    let count = splits.len();
    split_transaction(&conn, txn_id, splits)?;
    if count == 0 {
        println!("Removed split from {txn_id}");
    } else {
        println!("Split {txn_id} into {count} parts");
    }
    Ok(())
}

pub fn pending() -> Result<()> {
    let (settings, conn) = open()?;
    let txns = get_uncategorized(&conn)?;
    if txns.is_empty() {
        println!("No uncategorized transactions.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Description", "Counterparty", "Amount"]);
    for t in &txns {
        table.add_row(vec![
            Cell::new(&t.id),
            Cell::new(t.date),
            Cell::new(&t.description),
            Cell::new(t.counterparty.as_deref().unwrap_or("")),
            Cell::new(money(t.amount, &settings.currency)),
        ]);
    }
    println!("Uncategorized ({})\n{table}", txns.len());
    Ok(())
}
