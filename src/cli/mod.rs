pub mod budgets;
pub mod categories;
pub mod categorize;
pub mod import;
pub mod init;
pub mod reimburse;
pub mod report;
pub mod rules;
pub mod status;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::get_connection;
use crate::error::{Result, TallyError};
use crate::settings::{load_settings, Settings};

/// Settings plus an open connection to the configured database.
pub(crate) fn open() -> Result<(Settings, Connection)> {
    let settings = load_settings();
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(TallyError::Settings(format!(
            "No database found at {}\nRun `tally init` to set up.",
            db_path.display()
        )));
    }
    let conn = get_connection(&db_path)?;
    Ok((settings, conn))
}

#[derive(Parser)]
#[command(name = "tally", about = "Personal finance tracker: categorize, budget and report on your spending.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up Tally: choose a data directory and initialize the database.
    Init {
        /// Path for Tally data (default: ~/Documents/tally)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import a normalized CSV (date,description,amount[,counterparty][,currency]).
    Import {
        /// Path to the CSV file
        file: String,
    },
    /// Categorize transactions, or set one by hand.
    Categorize {
        #[command(subcommand)]
        command: Option<CategorizeCommands>,
        /// Recompute every transaction, not only uncategorized ones
        #[arg(long)]
        all: bool,
        /// With --all, also overwrite manual categorizations
        #[arg(long = "include-manual", requires = "all")]
        include_manual: bool,
        /// With --all, stop starting new batches after this many seconds
        #[arg(long = "time-budget", requires = "all")]
        time_budget: Option<u64>,
    },
    /// Manage categorization rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Manage categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Manage monthly budgets.
    Budgets {
        #[command(subcommand)]
        command: BudgetsCommands,
    },
    /// Track expenses that will be paid back.
    Reimburse {
        #[command(subcommand)]
        command: ReimburseCommands,
    },
    /// Generate reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum CategorizeCommands {
    /// Set a transaction's category by hand.
    Set {
        /// Transaction ID
        txn: String,
        /// Category ID, e.g. food.groceries
        category: String,
        /// Remember this choice as a learned rule
        #[arg(long)]
        learn: bool,
    },
    /// Split a transaction across categories.
    Split {
        /// Transaction ID
        txn: String,
        /// Parts as CATEGORY=AMOUNT, e.g. food.groceries=-60 shopping=-40.
        /// No parts removes the split.
        parts: Vec<String>,
    },
    /// List transactions that still have no category.
    Pending,
    /// Show which category a description would get, without saving anything.
    Explain {
        /// Transaction description
        description: String,
        #[arg(long)]
        counterparty: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a categorization rule.
    Add {
        /// Pattern to match against description and counterparty
        pattern: String,
        /// Category ID to assign
        #[arg(long)]
        category: String,
        /// Match type: contains, exact
        #[arg(long = "match-type", default_value = "contains")]
        match_type: String,
        /// Rule priority (higher wins)
        #[arg(long, default_value = "0")]
        priority: i64,
    },
    /// List categorization rules.
    List {
        /// Only show rules learned from manual corrections
        #[arg(long)]
        learned: bool,
    },
    /// Delete a rule by ID.
    Delete {
        /// Rule ID (shown in `tally rules list`)
        id: String,
    },
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// Add a category.
    Add {
        /// Display name, e.g. 'Pet Food'
        name: String,
        /// Parent category ID
        #[arg(long)]
        parent: Option<String>,
        /// Hex color
        #[arg(long)]
        color: Option<String>,
        /// Icon name
        #[arg(long)]
        icon: Option<String>,
    },
    /// List the category tree.
    List,
}

#[derive(Subcommand)]
pub enum BudgetsCommands {
    /// Add a monthly budget for a category.
    Add {
        /// Category ID
        category: String,
        /// Monthly limit
        limit: f64,
        /// Warn at this percentage of the limit (default from settings)
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// List budgets.
    List,
    /// Stop tracking a budget without deleting it.
    Pause {
        /// Budget ID (shown in `tally budgets list`)
        id: String,
    },
    /// Track a paused budget again.
    Resume {
        /// Budget ID
        id: String,
    },
    /// Budget progress for a month.
    Status {
        /// Month: YYYY-MM (default: current month)
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ReimburseCommands {
    /// Flag an expense as reimbursable.
    Mark {
        /// Transaction ID
        txn: String,
        /// Reimbursement type: work, personal
        #[arg(long = "type", default_value = "work")]
        kind: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Record that a reimbursement was paid back.
    Clear {
        /// Transaction ID
        txn: String,
        /// Date paid back: YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Remove the reimbursable flag.
    Unmark {
        /// Transaction ID
        txn: String,
    },
    /// Pending and cleared reimbursement totals.
    Summary {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Income, expenses and net balance.
    Summary {
        /// Month filter: YYYY-MM
        #[arg(long)]
        month: Option<String>,
        /// Start date: YYYY-MM-DD
        #[arg(long = "from")]
        from_date: Option<String>,
        /// End date: YYYY-MM-DD
        #[arg(long = "to")]
        to_date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Spending per category.
    Categories {
        #[arg(long)]
        month: Option<String>,
        #[arg(long = "from")]
        from_date: Option<String>,
        #[arg(long = "to")]
        to_date: Option<String>,
        /// Break down one category's subcategories
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Daily income and expenses.
    Timeline {
        #[arg(long)]
        month: Option<String>,
        #[arg(long = "from")]
        from_date: Option<String>,
        #[arg(long = "to")]
        to_date: Option<String>,
        #[arg(long)]
        json: bool,
    },
}
