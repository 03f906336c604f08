use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use tally_core::VERSION;

/// Tally - a conversational expense-splitting ledger for two people
#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the ledger database
    #[arg(short, long, global = true, env = "TALLY_LEDGER")]
    pub ledger: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Arguments for the `init` command
#[derive(Args)]
pub struct InitArgs {
    /// Path where the ledger will be created
    #[arg(value_name = "PATH")]
    pub path: Option<String>,
}

/// Arguments for the `log` command
#[derive(Args)]
pub struct LogArgs {
    /// Total amount of the expense
    #[arg(value_name = "AMOUNT")]
    pub amount: f64,

    /// Merchant or label for the expense
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Amount V disbursed (defaults to an even split)
    #[arg(long)]
    pub v_paid: Option<f64>,

    /// Amount Y disbursed (defaults to an even split)
    #[arg(long)]
    pub y_paid: Option<f64>,

    /// V's fraction of the owed split (0.0 - 1.0)
    #[arg(long, default_value_t = 0.5)]
    pub share: f64,

    /// Add category labels
    #[arg(long, value_name = "LABEL")]
    pub label: Vec<String>,

    /// Free-form notes
    #[arg(long)]
    pub notes: Option<String>,

    /// Set custom date/time (ISO-8601 or YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `list` command
#[derive(Args)]
pub struct ListArgs {
    /// Filter by merchant (case-insensitive substring)
    #[arg(long)]
    pub merchant: Option<String>,

    /// Filter by label (case-insensitive substring)
    #[arg(long)]
    pub label: Option<String>,

    /// Filter by month name (e.g., "January")
    #[arg(long)]
    pub month: Option<String>,

    /// Filter by 4-digit year
    #[arg(long)]
    pub year: Option<String>,

    /// Only rows since the last settle-up
    #[arg(long)]
    pub since_settle: bool,

    /// Limit number of results
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `stats` command
#[derive(Args)]
pub struct StatsArgs {
    /// Group by column, with optional Date transforms
    /// (e.g., "Labels", "Date.month")
    #[arg(long, value_name = "KEY")]
    pub group_by: Vec<String>,

    /// Aggregation as function:column (e.g., "sum:Amount", "count:Amount")
    #[arg(long, value_name = "AGG", default_value = "sum:Amount")]
    pub agg: Vec<String>,

    /// Filter by merchant (case-insensitive substring)
    #[arg(long)]
    pub merchant: Option<String>,

    /// Filter by label (case-insensitive substring)
    #[arg(long)]
    pub label: Option<String>,

    /// Filter by month name (e.g., "January")
    #[arg(long)]
    pub month: Option<String>,

    /// Only rows since the last settle-up
    #[arg(long)]
    pub since_settle: bool,

    /// Sort by the Nth aggregation (0-based)
    #[arg(long, value_name = "INDEX")]
    pub order_by: Option<usize>,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub asc: bool,

    /// Limit number of result rows
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `balance` command
#[derive(Args)]
pub struct BalanceArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `settle` command
#[derive(Args)]
pub struct SettleArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `delete` command
#[derive(Args)]
pub struct DeleteArgs {
    /// Delete the most recent expense
    #[arg(long, conflicts_with_all = ["date", "merchant"])]
    pub last: bool,

    /// Delete an expense from this date (YYYY-MM-DD)
    #[arg(long, conflicts_with = "merchant")]
    pub date: Option<String>,

    /// Delete an expense at this merchant
    #[arg(long)]
    pub merchant: Option<String>,

    /// Acting party (restricts candidates to expenses they paid into)
    #[arg(long, value_name = "PARTY")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `edit` command
#[derive(Args)]
pub struct EditArgs {
    /// Row index of the expense to edit
    #[arg(value_name = "ROW")]
    pub row_index: i64,

    /// New total amount
    #[arg(long)]
    pub amount: Option<f64>,

    /// New amount paid by V (or percentage when paired with --y-paid
    /// summing to 100)
    #[arg(long)]
    pub v_paid: Option<f64>,

    /// New amount paid by Y
    #[arg(long)]
    pub y_paid: Option<f64>,

    /// New merchant name
    #[arg(long)]
    pub merchant: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `confirm` command
#[derive(Args)]
pub struct ConfirmArgs {
    /// Confirmation token printed by `delete` or `edit`
    #[arg(value_name = "TOKEN")]
    pub token: String,

    /// Short code of the chosen candidate
    #[arg(value_name = "CODE")]
    pub code: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `completions` command
#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_name = "SHELL")]
    pub shell: Shell,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new ledger database
    Init(InitArgs),

    /// Log a new expense
    Log(LogArgs),

    /// List expenses, most recent first
    List(ListArgs),

    /// Aggregate expenses with optional grouping
    Stats(StatsArgs),

    /// Show who owes whom
    Balance(BalanceArgs),

    /// Record a settlement clearing the balance
    Settle(SettleArgs),

    /// Propose expense deletions (confirm with `confirm`)
    Delete(DeleteArgs),

    /// Stage an expense edit (confirm with `confirm`)
    Edit(EditArgs),

    /// Apply a staged delete or edit by token and code
    Confirm(ConfirmArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
