use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "eventbrite-etl")]
#[command(about = "Load Eventbrite events into PostgreSQL and refresh the reporting views")]
pub struct Cli {
    /// Path to a .env file (defaults to the nearest .env, if any)
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Optional TOML file with loader tuning
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pull events, venues and attendees from Eventbrite into the schema
    Load {
        /// Load events starting on this date (YYYY-MM-DD) instead of the last load
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Also load the order behind each attendee
        #[arg(long)]
        with_orders: bool,

        /// Skip the pause between events
        #[arg(long)]
        no_throttle: bool,
    },
    /// Refresh every configured materialized view
    RefreshViews,
    /// Copy a table to <table>_backup
    Backup { table: String },
    /// Restore a table from <table>_backup
    Revert { table: String },
    /// Remove every row from a table
    Truncate { table: String },
    /// Print when events were last loaded
    LastLoad,
    /// Print the account behind EVENTBRITE_OAUTH
    TokenInfo,
}
