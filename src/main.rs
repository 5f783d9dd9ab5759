//! Binary entry point for spendlog.
//!
//! A local operator surface over the expense storage layer: table
//! initialisation plus a handful of expense and budget commands.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use spendlog::config::{self, SpendlogConfig, StorageBackendType};
use spendlog::models::{DEFAULT_CATEGORY, Expense};
use spendlog::observability::{self, LoggingConfig};
use spendlog::services::{BudgetService, ExpenseService};
use spendlog::storage::Storage;
use std::path::PathBuf;
use std::process::ExitCode;

/// Number of categories shown in the monthly report.
const TOP_CATEGORIES: usize = 3;

/// Spendlog - expense tracking storage tools.
#[derive(Parser)]
#[command(name = "spendlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage backend: memory, sqlite, or postgres.
    #[arg(short, long, global = true)]
    backend: Option<StorageBackendType>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Create every registered table.
    Init,

    /// Record an expense.
    Add {
        /// Chat user id.
        user: i64,

        /// What was bought.
        item: String,

        /// Amount in whole currency units.
        amount: i64,

        /// Spending category.
        #[arg(short = 'C', long, default_value = DEFAULT_CATEGORY)]
        category: String,
    },

    /// List a user's expenses.
    List {
        /// Chat user id.
        user: i64,

        /// Maximum number of expenses.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show this month's totals and budget status.
    Report {
        /// Chat user id.
        user: i64,
    },

    /// Show or set the monthly budget.
    Budget {
        /// Chat user id.
        user: i64,

        /// New budget; shows the current one when omitted.
        amount: Option<i64>,
    },

    /// Delete the expense recorded at a timestamp.
    Delete {
        /// Chat user id.
        user: i64,

        /// Recording timestamp, as printed by `list`.
        created_at: String,
    },
}

fn main() -> ExitCode {
    config::load_dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.backend) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig::from_settings(Some(&config.logging), cli.verbose);
    if let Err(e) = observability::init(&logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration from a file, the environment and flags.
fn load_config(
    path: Option<&std::path::Path>,
    backend: Option<StorageBackendType>,
) -> anyhow::Result<SpendlogConfig> {
    let config = match path {
        Some(path) => SpendlogConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => SpendlogConfig::load_default()?,
    };
    let config = config.apply_env_overrides()?;
    Ok(match backend {
        Some(backend) => config.with_backend(backend),
        None => config,
    })
}

/// Runs the selected command.
fn run_command(command: Commands, config: &SpendlogConfig) -> anyhow::Result<()> {
    let storage = Storage::from_config(&config.storage).context("opening storage")?;

    match command {
        Commands::Init => cmd_init(&storage),
        Commands::Add {
            user,
            item,
            amount,
            category,
        } => cmd_add(&storage, user, item, amount, category),
        Commands::List { user, limit, json } => cmd_list(&storage, user, limit, json),
        Commands::Report { user } => cmd_report(&storage, user),
        Commands::Budget { user, amount } => cmd_budget(&storage, user, amount),
        Commands::Delete { user, created_at } => cmd_delete(&storage, user, &created_at),
    }
}

fn cmd_init(storage: &Storage) -> anyhow::Result<()> {
    storage.ensure_tables()?;
    println!("Backend: {}", storage.backend_name());
    for schema in storage.registry().tables() {
        println!("  {} ready", schema.name());
    }
    Ok(())
}

fn cmd_add(
    storage: &Storage,
    user: i64,
    item: String,
    amount: i64,
    category: String,
) -> anyhow::Result<()> {
    if amount <= 0 {
        bail!("amount must be positive, got {amount}");
    }

    let service = ExpenseService::new(storage.clone())?;
    let expense = Expense::new(user, item, amount, category);
    if !service.save_expense(&expense)? {
        bail!("an expense recorded at {} already exists", expense.created_at_key());
    }

    println!(
        "Saved: {} {} ({}) at {}",
        expense.item,
        expense.amount,
        expense.category,
        expense.created_at_key()
    );
    Ok(())
}

fn cmd_list(storage: &Storage, user: i64, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let service = ExpenseService::new(storage.clone())?;
    let expenses = service.get_expenses(user, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&expenses)?);
        return Ok(());
    }

    if expenses.is_empty() {
        println!("No expenses for user {user}");
        return Ok(());
    }

    for expense in &expenses {
        println!(
            "{}  {:>10}  {:<16}  {}",
            expense.created_at_key(),
            expense.amount,
            expense.category,
            expense.item
        );
    }
    Ok(())
}

fn cmd_report(storage: &Storage, user: i64) -> anyhow::Result<()> {
    let expenses = ExpenseService::new(storage.clone())?;
    let budgets = BudgetService::new(storage.clone())?;

    println!("Monthly report for user {user}");
    println!("==============================");
    println!();
    println!("Total: {}", expenses.get_total(user)?);

    let totals = expenses.get_category_totals(user)?;
    if !totals.is_empty() {
        println!();
        println!("By category:");
        for (category, total) in &totals {
            println!("  {category:<16} {total:>10}");
        }

        println!();
        println!("Top categories:");
        for (rank, (category, total)) in (1..).zip(expenses.get_top_categories(user, TOP_CATEGORIES)?)
        {
            println!("  {rank}. {category} ({total})");
        }
    }

    println!();
    match budgets.budget_status(user)? {
        Some(status) => {
            println!("Budget: {} ({})", status.budget, status.level);
            println!("  Spent:     {}", status.spent);
            println!("  Remaining: {}", status.remaining);
            println!("  {}", status.progress_bar());
        },
        None => println!("Budget: not set"),
    }
    Ok(())
}

fn cmd_budget(storage: &Storage, user: i64, amount: Option<i64>) -> anyhow::Result<()> {
    let budgets = BudgetService::new(storage.clone())?;

    if let Some(amount) = amount {
        budgets.set_budget(user, amount)?;
        println!("Budget set to {amount}");
        return Ok(());
    }

    match budgets.get_budget(user)? {
        Some(budget) => println!("Budget: {budget}"),
        None => println!("Budget: not set"),
    }
    Ok(())
}

fn cmd_delete(storage: &Storage, user: i64, created_at: &str) -> anyhow::Result<()> {
    let service = ExpenseService::new(storage.clone())?;
    if service.delete_expense(user, created_at)? {
        println!("Deleted expense at {created_at}");
    } else {
        println!("No expense at {created_at}");
    }
    Ok(())
}
