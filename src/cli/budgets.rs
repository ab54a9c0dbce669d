use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::aggregator::BudgetStatus;
use crate::budgets::add_budget;
use crate::cli::open;
use crate::db::load_budgets;
use crate::error::Result;
use crate::fmt::{bar, money, percent};
use crate::reports::{self, month_label, period};

pub fn add(category: &str, limit: f64, threshold: Option<f64>) -> Result<()> {
    let (settings, conn) = open()?;
    let threshold = threshold.unwrap_or(settings.default_alert_threshold);
    let budget = add_budget(&conn, category, limit, threshold)?;
    println!(
        "Added budget {}: {} per month for {} (warn at {})",
        budget.id,
        money(budget.monthly_limit, &settings.currency),
        budget.category_id,
        percent(budget.alert_threshold)
    );
    Ok(())
}

pub fn list() -> Result<()> {
    let (settings, conn) = open()?;
    let budgets = load_budgets(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Category", "Monthly Limit", "Alert At", "Active"]);
    for b in &budgets {
        table.add_row(vec![
            Cell::new(&b.id),
            Cell::new(&b.category_id),
            Cell::new(money(b.monthly_limit, &settings.currency)),
            Cell::new(percent(b.alert_threshold)),
            Cell::new(if b.is_active { "yes" } else { "paused" }),
        ]);
    }
    println!("Budgets\n{table}");
    Ok(())
}

pub fn set_active(id: &str, active: bool) -> Result<()> {
    let (_, conn) = open()?;
    crate::budgets::set_active(&conn, id, active)?;
    println!("Budget {id} {}", if active { "resumed" } else { "paused" });
    Ok(())
}

fn status_label(status: BudgetStatus) -> String {
    match status {
        BudgetStatus::Safe => status.as_str().green().to_string(),
        BudgetStatus::Warning => status.as_str().yellow().to_string(),
        BudgetStatus::Exceeded => status.as_str().red().bold().to_string(),
    }
}

pub fn status(month: Option<String>, json: bool) -> Result<()> {
    let (settings, conn) = open()?;
    let range = period(month.as_deref(), None, None)?;
    let lines = reports::get_budget_status(&conn, &range, settings.budget_rollup)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
        return Ok(());
    }
    if lines.is_empty() {
        println!("No active budgets. Add one with `tally budgets add <category> <limit>`.");
        return Ok(());
    }

    let cur = settings.currency.as_str();
    let mut table = Table::new();
    table.set_header(vec!["Category", "Limit", "Spent", "Remaining", "Used", "", "Status", "3-mo Avg"]);
    for line in &lines {
        let p = &line.progress;
        table.add_row(vec![
            Cell::new(&line.category_name),
            Cell::new(money(p.monthly_limit, cur)),
            Cell::new(money(p.spent, cur)),
            Cell::new(money(p.remaining, cur)),
            Cell::new(percent(p.percentage)),
            Cell::new(bar(p.percentage, 20)),
            Cell::new(status_label(p.status)),
            Cell::new(money(line.suggested_limit, cur)),
        ]);
    }
    println!("Budgets for {}\n{table}", month_label(range.start));
    Ok(())
}
