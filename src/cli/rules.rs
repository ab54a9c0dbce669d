use comfy_table::{Cell, Table};
use rusqlite::{Connection, OptionalExtension};

use crate::cli::open;
use crate::db::{fresh_id, require_category};
use crate::error::{Result, TallyError};
use crate::models::{MatchType, Rule};

pub fn add(pattern: &str, category: &str, match_type: &str, priority: i64) -> Result<()> {
    let (_, conn) = open()?;
    let match_type: MatchType = match_type.parse()?;
    let rule = add_rule(&conn, pattern, category, match_type, priority)?;
    println!("Added rule {}: '{}' \u{2192} {}", rule.id, rule.pattern, rule.category_id);
    Ok(())
}

pub fn list(learned_only: bool) -> Result<()> {
    let (_, conn) = open()?;
    let rows = list_rules(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Pattern", "Type", "Category", "Priority", "Learned", "Hits"]);
    for (rule, hits) in rows.into_iter().filter(|(r, _)| !learned_only || r.is_learned) {
        table.add_row(vec![
            Cell::new(rule.id),
            Cell::new(rule.pattern),
            Cell::new(rule.match_type),
            Cell::new(rule.category_id),
            Cell::new(rule.priority),
            Cell::new(if rule.is_learned { "yes" } else { "" }),
            Cell::new(hits),
        ]);
    }
    println!("Rules\n{table}");
    Ok(())
}

pub fn delete(id: &str) -> Result<()> {
    let (_, conn) = open()?;
    let rule = delete_rule(&conn, id)?;
    println!("Deleted rule {id}: '{}' \u{2192} {}", rule.0, rule.1);
    Ok(())
}

// ---------------------------------------------------------------------------
// Data-layer functions
// ---------------------------------------------------------------------------

pub fn add_rule(
    conn: &Connection,
    pattern: &str,
    category_id: &str,
    match_type: MatchType,
    priority: i64,
) -> Result<Rule> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(TallyError::InvalidInput("Pattern is required".into()));
    }
    require_category(conn, category_id)?;
    let rule = Rule {
        id: fresh_id("rule", &[pattern, category_id]),
        pattern: pattern.to_string(),
        match_type,
        category_id: category_id.to_string(),
        priority,
        is_learned: false,
    };
    conn.execute(
        "INSERT INTO rules (id, pattern, match_type, category_id, priority, is_learned) \
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        rusqlite::params![rule.id, rule.pattern, rule.match_type, rule.category_id, rule.priority],
    )?;
    Ok(rule)
}

/// Rules in evaluation order with their hit counts.
pub fn list_rules(conn: &Connection) -> Result<Vec<(Rule, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT id, pattern, match_type, category_id, priority, is_learned, hit_count \
         FROM rules ORDER BY is_learned, priority DESC, rowid",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                Rule {
                    id: row.get(0)?,
                    pattern: row.get(1)?,
                    match_type: row.get(2)?,
                    category_id: row.get(3)?,
                    priority: row.get(4)?,
                    is_learned: row.get(5)?,
                },
                row.get(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns the deleted rule's (pattern, category id).
pub fn delete_rule(conn: &Connection, id: &str) -> Result<(String, String)> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT pattern, category_id FROM rules WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some(row) = row else {
        return Err(TallyError::Other(format!("No rule with ID {id}")));
    };
    conn.execute("DELETE FROM rules WHERE id = ?1", [id])?;
    Ok(row)
}
