use crate::db::get_connection;
use crate::error::Result;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Currency:   {}", settings.currency);
    let merchants = settings.merchants()?;
    println!(
        "Merchants:  {} ({} patterns)",
        settings.merchant_db.as_deref().unwrap_or("(built-in)"),
        merchants.len()
    );

    if db_path.exists() {
        let conn = get_connection(&db_path)?;
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };

        let transactions = count("SELECT count(*) FROM transactions")?;
        let uncategorized = count("SELECT count(*) FROM transactions WHERE category_id IS NULL")?;
        let manual = count("SELECT count(*) FROM transactions WHERE category_source = 'manual'")?;
        let rules = count("SELECT count(*) FROM rules WHERE is_learned = 0")?;
        let learned = count("SELECT count(*) FROM rules WHERE is_learned = 1")?;
        let budgets = count("SELECT count(*) FROM budgets WHERE is_active = 1")?;
        let pending = count(
            "SELECT count(*) FROM transactions WHERE reimbursement_status = 'pending' AND amount < 0",
        )?;

        println!();
        println!("Transactions:   {transactions}");
        println!("Uncategorized:  {uncategorized}");
        println!("Manual:         {manual}");
        println!("Rules:          {rules} ({learned} learned)");
        println!("Budgets:        {budgets}");
        println!("Reimbursements: {pending} pending");
    } else {
        println!();
        println!("Database not found. Run `tally init` to set up.");
    }

    Ok(())
}
