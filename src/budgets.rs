use rusqlite::Connection;

use crate::db::{fresh_id, load_budgets, require_category};
use crate::error::{Result, TallyError};
use crate::models::Budget;

pub fn add_budget(
    conn: &Connection,
    category_id: &str,
    monthly_limit: f64,
    alert_threshold: f64,
) -> Result<Budget> {
    require_category(conn, category_id)?;
    if !(monthly_limit > 0.0) || !monthly_limit.is_finite() {
        return Err(TallyError::InvalidInput(format!(
            "monthly limit must be positive, got {monthly_limit}"
        )));
    }
    if !(alert_threshold > 0.0 && alert_threshold <= 100.0) {
        return Err(TallyError::InvalidInput(format!(
            "alert threshold must be in (0, 100], got {alert_threshold}"
        )));
    }
    let active_for_category = load_budgets(conn)?
        .iter()
        .any(|b| b.is_active && b.category_id == category_id);
    if active_for_category {
        log::warn!("category {category_id} already has an active budget");
    }

    let budget = Budget {
        id: fresh_id("budget", &[category_id]),
        category_id: category_id.to_string(),
        monthly_limit,
        alert_threshold,
        is_active: true,
    };
    conn.execute(
        "INSERT INTO budgets (id, category_id, monthly_limit, alert_threshold, is_active) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            budget.id,
            budget.category_id,
            budget.monthly_limit,
            budget.alert_threshold,
            budget.is_active
        ],
    )?;
    Ok(budget)
}

pub fn set_active(conn: &Connection, budget_id: &str, active: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE budgets SET is_active = ?1 WHERE id = ?2",
        rusqlite::params![active, budget_id],
    )?;
    if changed == 0 {
        return Err(TallyError::Other(format!("No budget with ID {budget_id}")));
    }
    Ok(())
}
