use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::aggregator::CategorySpending;
use crate::cli::open;
use crate::error::Result;
use crate::fmt::{bar, money, percent};
use crate::reports::{self, period};

/// Rows shown before the rest fold into "Other".
const TOP_CATEGORIES: usize = 7;

/// Keep the first `keep` entries and sum the rest into one "Other" row.
pub fn fold_other(entries: Vec<CategorySpending>, keep: usize) -> Vec<CategorySpending> {
    if entries.len() <= keep {
        return entries;
    }
    let mut entries = entries;
    let rest = entries.split_off(keep);
    let other = CategorySpending {
        category_id: None,
        category_name: "Other".to_string(),
        category_icon: "ellipsis".to_string(),
        category_color: "#bdbdbd".to_string(),
        amount: rest.iter().map(|e| e.amount).sum(),
        percentage: rest.iter().map(|e| e.percentage).sum(),
        transaction_count: rest.iter().map(|e| e.transaction_count).sum(),
    };
    entries.push(other);
    entries
}

pub fn summary(
    month: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    json: bool,
) -> Result<()> {
    let (settings, conn) = open()?;
    let range = period(month.as_deref(), from_date.as_deref(), to_date.as_deref())?;
    let s = reports::get_summary(&conn, &range)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&s)?);
        return Ok(());
    }

    let cur = settings.currency.as_str();
    let mut table = Table::new();
    table.set_header(vec!["", "Amount"]);
    table.add_row(vec![Cell::new("Income".green().bold()), Cell::new(money(s.total_income, cur))]);
    table.add_row(vec![Cell::new("Expenses".red().bold()), Cell::new(money(s.total_expenses, cur))]);
    let net_label = if s.net_balance >= 0.0 {
        "Net".green().bold()
    } else {
        "Net".red().bold()
    };
    table.add_row(vec![Cell::new(net_label), Cell::new(money(s.net_balance, cur))]);
    table.add_row(vec![
        Cell::new("Pending reimbursements"),
        Cell::new(money(s.pending_reimbursements, cur)),
    ]);
    table.add_row(vec![Cell::new("Transactions"), Cell::new(s.transaction_count)]);

    println!("Summary {} to {}\n{table}", range.start, range.end);
    Ok(())
}

pub fn categories(
    month: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    parent: Option<String>,
    json: bool,
) -> Result<()> {
    let (settings, conn) = open()?;
    let range = period(month.as_deref(), from_date.as_deref(), to_date.as_deref())?;
    let data = reports::get_category_spending(&conn, &range, parent.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }
    if data.is_empty() {
        println!("No expenses found.");
        return Ok(());
    }

    let cur = settings.currency.as_str();
    let total: f64 = data.iter().map(|e| e.amount).sum();
    let mut table = Table::new();
    table.set_header(vec!["Category", "Amount", "%", "", "Count"]);
    for item in fold_other(data, TOP_CATEGORIES) {
        table.add_row(vec![
            Cell::new(&item.category_name),
            Cell::new(money(item.amount, cur)),
            Cell::new(percent(item.percentage)),
            Cell::new(bar(item.percentage, 20)),
            Cell::new(item.transaction_count),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total".bold()),
        Cell::new(money(total, cur)),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
    ]);
    let title = match &parent {
        Some(p) => format!("Spending in {p}"),
        None => "Spending by Category".to_string(),
    };
    println!("{title}\n{table}");
    Ok(())
}

pub fn timeline(
    month: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    json: bool,
) -> Result<()> {
    let (settings, conn) = open()?;
    let range = period(month.as_deref(), from_date.as_deref(), to_date.as_deref())?;
    let days = reports::get_timeline(&conn, &range)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&days)?);
        return Ok(());
    }

    let cur = settings.currency.as_str();
    let mut table = Table::new();
    table.set_header(vec!["Date", "Income", "Expenses", "Net"]);
    for d in days.iter().filter(|d| d.income != 0.0 || d.expenses != 0.0) {
        let net = d.income - d.expenses;
        let net_str = if net >= 0.0 {
            money(net, cur).green().to_string()
        } else {
            money(net, cur).red().to_string()
        };
        table.add_row(vec![
            Cell::new(d.date),
            Cell::new(money(d.income, cur)),
            Cell::new(money(d.expenses, cur)),
            Cell::new(net_str),
        ]);
    }
    println!("Timeline {} to {}\n{table}", range.start, range.end);
    Ok(())
}
