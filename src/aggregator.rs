//! Pure roll-ups over a transaction snapshot. Nothing here touches the store;
//! the same inputs always produce the same numbers, summed in input order.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Budget, Category, DateRange, ReimbursementKind, ReimbursementStatus, Transaction};

pub type CategoryMap = HashMap<String, Category>;

pub fn category_map(categories: &[Category]) -> CategoryMap {
    categories.iter().map(|c| (c.id.clone(), c.clone())).collect()
}

/// Ancestor chain starting at `id` itself. Stops on unknown ids and cycles.
fn lineage<'a>(id: &'a str, categories: &'a CategoryMap) -> Vec<&'a str> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(id);
    while let Some(c) = current {
        if !seen.insert(c) {
            break;
        }
        chain.push(c);
        current = categories.get(c).and_then(|cat| cat.parent_id.as_deref());
    }
    chain
}

/// Expense amounts (positive) with the category they count toward. A split
/// transaction contributes its expense splits instead of its own total.
fn expense_parts(txn: &Transaction) -> Vec<(Option<&str>, f64)> {
    if txn.is_split && !txn.splits.is_empty() {
        txn.splits
            .iter()
            .filter(|s| s.amount < 0.0)
            .map(|s| (s.category_id.as_deref(), -s.amount))
            .collect()
    } else if txn.is_expense() {
        vec![(txn.category_id.as_deref(), -txn.amount)]
    } else {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_balance: f64,
    pub pending_reimbursements: f64,
    pub transaction_count: usize,
}

pub fn summarize(txns: &[Transaction]) -> Summary {
    let mut s = Summary::default();
    for t in txns {
        if t.amount > 0.0 {
            s.total_income += t.amount;
        } else if t.amount < 0.0 {
            s.total_expenses += t.amount.abs();
        }
        if let Some(r) = t.reimbursable() {
            if r.status == ReimbursementStatus::Pending {
                s.pending_reimbursements += t.amount.abs();
            }
        }
    }
    s.net_balance = s.total_income - s.total_expenses;
    s.transaction_count = txns.len();
    s
}

// ---------------------------------------------------------------------------
// Category spending
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpending {
    /// `None` is the uncategorized bucket.
    pub category_id: Option<String>,
    pub category_name: String,
    pub category_icon: String,
    pub category_color: String,
    pub amount: f64,
    pub percentage: f64,
    pub transaction_count: usize,
}

pub const UNCATEGORIZED_NAME: &str = "Uncategorized";
const UNCATEGORIZED_COLOR: &str = "#9e9e9e";
const UNCATEGORIZED_ICON: &str = "question";

/// Which bucket an expense lands in.
///
/// Without a parent: its top-level category. With a parent: the parent's
/// direct child on its path (or the parent itself); expenses outside that
/// subtree are excluded (`None`). Unknown ids count as uncategorized.
fn bucket_for<'a>(
    category_id: Option<&'a str>,
    categories: &'a CategoryMap,
    parent: Option<&str>,
) -> Option<Option<&'a str>> {
    let known = category_id.filter(|id| categories.contains_key(*id));
    match (known, parent) {
        (None, None) => Some(None),
        (None, Some(_)) => None,
        (Some(id), None) => Some(lineage(id, categories).last().copied()),
        (Some(id), Some(p)) => {
            let chain = lineage(id, categories);
            let pos = chain.iter().position(|c| *c == p)?;
            Some(Some(if pos == 0 { chain[0] } else { chain[pos - 1] }))
        }
    }
}

/// Expense totals per category, largest first. Folding the tail into an
/// "Other" row is left to presentation.
pub fn category_spending(txns: &[Transaction], categories: &CategoryMap, parent: Option<&str>) -> Vec<CategorySpending> {
    let mut order: Vec<Option<&str>> = Vec::new();
    let mut totals: HashMap<Option<&str>, (f64, usize)> = HashMap::new();

    for t in txns {
        // a split counts once per bucket, however many parts land there
        let mut counted: HashSet<Option<&str>> = HashSet::new();
        for (category_id, amount) in expense_parts(t) {
            let Some(bucket) = bucket_for(category_id, categories, parent) else {
                continue;
            };
            let entry = totals.entry(bucket).or_insert_with(|| {
                order.push(bucket);
                (0.0, 0)
            });
            entry.0 += amount;
            if counted.insert(bucket) {
                entry.1 += 1;
            }
        }
    }

    let grand_total: f64 = order.iter().map(|b| totals[b].0).sum();
    let mut out: Vec<CategorySpending> = order
        .iter()
        .map(|bucket| {
            let (amount, count) = totals[bucket];
            let cat = bucket.and_then(|id| categories.get(id));
            CategorySpending {
                category_id: bucket.map(str::to_string),
                category_name: cat.map_or(UNCATEGORIZED_NAME.to_string(), |c| c.name.clone()),
                category_icon: cat.map_or(UNCATEGORIZED_ICON.to_string(), |c| c.icon.clone()),
                category_color: cat.map_or(UNCATEGORIZED_COLOR.to_string(), |c| c.color.clone()),
                amount,
                percentage: if grand_total > 0.0 { amount / grand_total * 100.0 } else { 0.0 },
                transaction_count: count,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.category_name.cmp(&b.category_name))
    });
    out
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineData {
    pub date: NaiveDate,
    pub expenses: f64,
    pub income: f64,
}

/// One entry per day in `range`, ascending, zero-filled.
pub fn timeline(txns: &[Transaction], range: &DateRange) -> Vec<TimelineData> {
    let mut days: Vec<TimelineData> = range
        .start
        .iter_days()
        .take(range.days() as usize)
        .map(|date| TimelineData {
            date,
            expenses: 0.0,
            income: 0.0,
        })
        .collect();

    for t in txns {
        if !range.contains(t.date) {
            continue;
        }
        let idx = (t.date - range.start).num_days() as usize;
        let day = &mut days[idx];
        if t.amount < 0.0 {
            day.expenses += t.amount.abs();
        } else if t.amount > 0.0 {
            day.income += t.amount;
        }
    }
    days
}

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

/// Whether a budget on a parent category also counts its subcategories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetRollup {
    /// Only transactions tagged with the budget's own category.
    Direct,
    /// The budget's category plus every category below it.
    #[default]
    Descendants,
}

/// Spending per budgeted category id. Every budget's category appears, with
/// 0.0 when nothing was spent.
pub fn spending_by_category(
    txns: &[Transaction],
    budgets: &[Budget],
    categories: &CategoryMap,
    rollup: BudgetRollup,
) -> HashMap<String, f64> {
    let mut spending: HashMap<String, f64> =
        budgets.iter().map(|b| (b.category_id.clone(), 0.0)).collect();

    for t in txns {
        for (category_id, amount) in expense_parts(t) {
            let Some(id) = category_id else { continue };
            match rollup {
                BudgetRollup::Direct => {
                    if let Some(total) = spending.get_mut(id) {
                        *total += amount;
                    }
                }
                BudgetRollup::Descendants => {
                    for ancestor in lineage(id, categories) {
                        if let Some(total) = spending.get_mut(ancestor) {
                            *total += amount;
                        }
                    }
                }
            }
        }
    }
    spending
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Safe,
    Warning,
    Exceeded,
}

impl BudgetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Exceeded => "exceeded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetProgress {
    pub budget_id: String,
    pub category_id: String,
    pub monthly_limit: f64,
    pub spent: f64,
    pub remaining: f64,
    /// Unrounded `spent / monthly_limit * 100`.
    pub percentage: f64,
    pub status: BudgetStatus,
}

pub fn budget_status(percentage: f64, alert_threshold: f64) -> BudgetStatus {
    if percentage >= 100.0 {
        BudgetStatus::Exceeded
    } else if percentage >= alert_threshold {
        BudgetStatus::Warning
    } else {
        BudgetStatus::Safe
    }
}

/// Progress for each active budget, in input order.
pub fn budget_progress(budgets: &[Budget], spending: &HashMap<String, f64>) -> Vec<BudgetProgress> {
    budgets
        .iter()
        .filter(|b| b.is_active)
        .map(|b| {
            let spent = spending.get(&b.category_id).copied().unwrap_or(0.0);
            let percentage = spent / b.monthly_limit * 100.0;
            BudgetProgress {
                budget_id: b.id.clone(),
                category_id: b.category_id.clone(),
                monthly_limit: b.monthly_limit,
                spent,
                remaining: b.monthly_limit - spent,
                percentage,
                status: budget_status(percentage, b.alert_threshold),
            }
        })
        .collect()
}

/// Monthly limit suggestion from three months of spending, to the cent.
pub fn suggest_limit(three_month_total: f64) -> f64 {
    (three_month_total / 3.0 * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Reimbursements
// ---------------------------------------------------------------------------

/// Reimbursable expenses split by status. Every expense carrying a
/// reimbursement lands in exactly one side.
#[derive(Debug, Default)]
pub struct ReimbursementPartition<'a> {
    pub pending: Vec<&'a Transaction>,
    pub cleared: Vec<&'a Transaction>,
}

pub fn partition_reimbursements(txns: &[Transaction]) -> ReimbursementPartition<'_> {
    let mut p = ReimbursementPartition::default();
    for t in txns {
        match t.reimbursable().map(|r| r.status) {
            Some(ReimbursementStatus::Pending) => p.pending.push(t),
            Some(ReimbursementStatus::Cleared) => p.cleared.push(t),
            None => {}
        }
    }
    p
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReimbursementSummary {
    pub pending_total: f64,
    pub pending_work_total: f64,
    pub pending_personal_total: f64,
    pub pending_count: usize,
    pub cleared_total: f64,
    pub cleared_count: usize,
}

pub fn reimbursement_summary(txns: &[Transaction]) -> ReimbursementSummary {
    let partition = partition_reimbursements(txns);
    let mut s = ReimbursementSummary {
        pending_count: partition.pending.len(),
        cleared_count: partition.cleared.len(),
        ..Default::default()
    };
    for t in &partition.pending {
        let amount = t.amount.abs();
        s.pending_total += amount;
        match t.reimbursement.as_ref().map(|r| r.kind) {
            Some(ReimbursementKind::Work) => s.pending_work_total += amount,
            Some(ReimbursementKind::Personal) => s.pending_personal_total += amount,
            None => {}
        }
    }
    for t in &partition.cleared {
        s.cleared_total += t.amount.abs();
    }
    s
}
