use std::collections::HashMap;

use chrono::{Datelike, Months, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::aggregator::{
    budget_progress, category_map, category_spending, reimbursement_summary, spending_by_category,
    suggest_limit, summarize, timeline, BudgetProgress, BudgetRollup, CategoryMap, CategorySpending,
    ReimbursementSummary, Summary, TimelineData,
};
use crate::db::{load_budgets, load_categories, load_transactions, require_category};
use crate::error::{Result, TallyError};
use crate::models::{DateRange, Transaction};

// ---------------------------------------------------------------------------
// Period helper
// ---------------------------------------------------------------------------

/// Resolve CLI period flags: `--from/--to` together, else `--month YYYY-MM`,
/// else the current calendar month.
pub fn period(month: Option<&str>, from_date: Option<&str>, to_date: Option<&str>) -> Result<DateRange> {
    match (from_date, to_date) {
        (Some(from), Some(to)) => return DateRange::parse(from, to),
        (Some(_), None) => {
            return Err(TallyError::InvalidInput(
                "--from requires --to (both date boundaries must be specified)".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(TallyError::InvalidInput(
                "--to requires --from (both date boundaries must be specified)".to_string(),
            ));
        }
        (None, None) => {}
    }
    match month {
        Some(m) => DateRange::month(m),
        None => {
            let today = chrono::Local::now().date_naive();
            DateRange::month(&format!("{:04}-{:02}", today.year(), today.month()))
        }
    }
}

/// The three full calendar months before `month` starts.
pub fn trailing_quarter(month: &DateRange) -> Result<DateRange> {
    let start = month
        .start
        .with_day(1)
        .and_then(|d| d.checked_sub_months(Months::new(3)))
        .ok_or_else(|| TallyError::InvalidInput(format!("no three months before {}", month.start)))?;
    let end = month
        .start
        .with_day(1)
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| TallyError::InvalidInput(format!("no month before {}", month.start)))?;
    DateRange::new(start, end)
}

fn load_period(conn: &Connection, range: &DateRange) -> Result<(Vec<Transaction>, CategoryMap)> {
    let txns = load_transactions(conn, Some(range))?;
    let categories = category_map(&load_categories(conn)?);
    Ok((txns, categories))
}

// ---------------------------------------------------------------------------
// Summary / categories / timeline
// ---------------------------------------------------------------------------

pub fn get_summary(conn: &Connection, range: &DateRange) -> Result<Summary> {
    Ok(summarize(&load_transactions(conn, Some(range))?))
}

pub fn get_category_spending(
    conn: &Connection,
    range: &DateRange,
    parent: Option<&str>,
) -> Result<Vec<CategorySpending>> {
    if let Some(p) = parent {
        require_category(conn, p)?;
    }
    let (txns, categories) = load_period(conn, range)?;
    Ok(category_spending(&txns, &categories, parent))
}

pub fn get_timeline(conn: &Connection, range: &DateRange) -> Result<Vec<TimelineData>> {
    Ok(timeline(&load_transactions(conn, Some(range))?, range))
}

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BudgetLine {
    pub category_name: String,
    #[serde(flatten)]
    pub progress: BudgetProgress,
    /// Average monthly spending over the previous three months.
    pub suggested_limit: f64,
}

pub fn get_budget_status(conn: &Connection, month: &DateRange, rollup: BudgetRollup) -> Result<Vec<BudgetLine>> {
    let budgets = load_budgets(conn)?;
    let (txns, categories) = load_period(conn, month)?;
    let spending = spending_by_category(&txns, &budgets, &categories, rollup);

    let quarter = trailing_quarter(month)?;
    let quarter_txns = load_transactions(conn, Some(&quarter))?;
    let quarter_spending: HashMap<String, f64> =
        spending_by_category(&quarter_txns, &budgets, &categories, rollup);

    Ok(budget_progress(&budgets, &spending)
        .into_iter()
        .map(|progress| BudgetLine {
            category_name: categories
                .get(&progress.category_id)
                .map_or_else(|| progress.category_id.clone(), |c| c.name.clone()),
            suggested_limit: suggest_limit(quarter_spending.get(&progress.category_id).copied().unwrap_or(0.0)),
            progress,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Reimbursements
// ---------------------------------------------------------------------------

pub struct ReimbursementReport {
    pub summary: ReimbursementSummary,
    pub pending: Vec<Transaction>,
}

/// Reimbursements across `range`, or the whole history when `None`.
pub fn get_reimbursements(conn: &Connection, range: Option<&DateRange>) -> Result<ReimbursementReport> {
    let txns = load_transactions(conn, range)?;
    let summary = reimbursement_summary(&txns);
    let pending = crate::aggregator::partition_reimbursements(&txns)
        .pending
        .into_iter()
        .cloned()
        .collect();
    Ok(ReimbursementReport { summary, pending })
}

pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}
