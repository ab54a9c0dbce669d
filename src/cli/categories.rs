use comfy_table::{Cell, Table};
use rusqlite::Connection;

use crate::cli::open;
use crate::db::{category_exists, category_id_for, load_categories, require_category};
use crate::error::{Result, TallyError};
use crate::models::Category;
use crate::slugs::simple_name;

pub fn add(name: &str, parent: Option<&str>, color: Option<&str>, icon: Option<&str>) -> Result<()> {
    let (_, conn) = open()?;
    let category = add_category(&conn, name, parent, color, icon)?;
    println!("Added category: {} ({})", category.name, category.id);
    Ok(())
}

pub fn list() -> Result<()> {
    let (_, conn) = open()?;
    let categories = load_categories(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Icon", "Color"]);
    for (cat, depth) in tree_order(&categories) {
        table.add_row(vec![
            Cell::new(&cat.id),
            Cell::new(format!("{}{}", "  ".repeat(depth), cat.name)),
            Cell::new(&cat.icon),
            Cell::new(&cat.color),
        ]);
    }
    println!("Categories\n{table}");
    Ok(())
}

/// Depth-first walk: each root followed by its children, in sort order.
fn tree_order(categories: &[Category]) -> Vec<(&Category, usize)> {
    fn visit<'a>(parent: Option<&str>, depth: usize, all: &'a [Category], out: &mut Vec<(&'a Category, usize)>) {
        for c in all.iter().filter(|c| c.parent_id.as_deref() == parent) {
            out.push((c, depth));
            visit(Some(c.id.as_str()), depth + 1, all, out);
        }
    }
    let mut out = Vec::with_capacity(categories.len());
    visit(None, 0, categories, &mut out);
    out
}

// ---------------------------------------------------------------------------
// Data-layer functions
// ---------------------------------------------------------------------------

pub fn add_category(
    conn: &Connection,
    name: &str,
    parent_id: Option<&str>,
    color: Option<&str>,
    icon: Option<&str>,
) -> Result<Category> {
    let name = name.trim();
    if simple_name(name).is_empty() {
        return Err(TallyError::InvalidInput(format!(
            "Category name needs at least one letter or digit: '{name}'"
        )));
    }
    if let Some(p) = parent_id {
        require_category(conn, p)?;
    }
    let id = category_id_for(name, parent_id);
    if category_exists(conn, &id)? {
        return Err(TallyError::InvalidInput(format!("Category already exists: {id}")));
    }
    let order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM categories",
        [],
        |row| row.get(0),
    )?;
    let category = Category {
        id,
        name: name.to_string(),
        parent_id: parent_id.map(str::to_string),
        color: color.unwrap_or("#9e9e9e").to_string(),
        icon: icon.unwrap_or("tag").to_string(),
        order,
        is_system: false,
    };
    conn.execute(
        "INSERT INTO categories (id, name, parent_id, color, icon, sort_order, is_system) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        rusqlite::params![
            category.id,
            category.name,
            category.parent_id,
            category.color,
            category.icon,
            category.order
        ],
    )?;
    Ok(category)
}
