mod aggregator;
mod budgets;
mod categorizer;
mod cli;
mod db;
mod error;
mod fmt;
mod importer;
mod merchants;
mod models;
mod reimbursements;
mod reports;
mod reviewer;
mod rules;
mod settings;
mod slugs;

use clap::Parser;

use cli::{
    BudgetsCommands, CategoriesCommands, CategorizeCommands, Cli, Commands, ReimburseCommands,
    ReportCommands, RulesCommands,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import { file } => cli::import::run(&file),
        Commands::Categorize {
            command,
            all,
            include_manual,
            time_budget,
        } => match command {
            None if all => cli::categorize::all(include_manual, time_budget),
            None => cli::categorize::run(),
            Some(CategorizeCommands::Set { txn, category, learn }) => {
                cli::categorize::set(&txn, &category, learn)
            }
            Some(CategorizeCommands::Split { txn, parts }) => cli::categorize::split(&txn, &parts),
            Some(CategorizeCommands::Pending) => cli::categorize::pending(),
            Some(CategorizeCommands::Explain {
                description,
                counterparty,
            }) => cli::categorize::explain(&description, counterparty.as_deref()),
        },
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                pattern,
                category,
                match_type,
                priority,
            } => cli::rules::add(&pattern, &category, &match_type, priority),
            RulesCommands::List { learned } => cli::rules::list(learned),
            RulesCommands::Delete { id } => cli::rules::delete(&id),
        },
        Commands::Categories { command } => match command {
            CategoriesCommands::Add {
                name,
                parent,
                color,
                icon,
            } => cli::categories::add(&name, parent.as_deref(), color.as_deref(), icon.as_deref()),
            CategoriesCommands::List => cli::categories::list(),
        },
        Commands::Budgets { command } => match command {
            BudgetsCommands::Add {
                category,
                limit,
                threshold,
            } => cli::budgets::add(&category, limit, threshold),
            BudgetsCommands::List => cli::budgets::list(),
            BudgetsCommands::Pause { id } => cli::budgets::set_active(&id, false),
            BudgetsCommands::Resume { id } => cli::budgets::set_active(&id, true),
            BudgetsCommands::Status { month, json } => cli::budgets::status(month, json),
        },
        Commands::Reimburse { command } => match command {
            ReimburseCommands::Mark { txn, kind, note } => cli::reimburse::mark(&txn, &kind, note.as_deref()),
            ReimburseCommands::Clear { txn, date } => cli::reimburse::clear(&txn, date),
            ReimburseCommands::Unmark { txn } => cli::reimburse::unmark(&txn),
            ReimburseCommands::Summary { json } => cli::reimburse::summary(json),
        },
        Commands::Report { command } => match command {
            ReportCommands::Summary {
                month,
                from_date,
                to_date,
                json,
            } => cli::report::summary(month, from_date, to_date, json),
            ReportCommands::Categories {
                month,
                from_date,
                to_date,
                parent,
                json,
            } => cli::report::categories(month, from_date, to_date, parent, json),
            ReportCommands::Timeline {
                month,
                from_date,
                to_date,
                json,
            } => cli::report::timeline(month, from_date, to_date, json),
        },
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
