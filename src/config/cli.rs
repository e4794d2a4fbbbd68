use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "place-etl")]
#[command(about = "Scrapes tourist places, enriches them with a places API and stores the canonical dataset")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, default_value = "place-etl.toml")]
    pub config: String,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit JSON log lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run fetch, enrich, aggregate and upsert once
    Run {
        /// Run on a background task and wait for it
        #[arg(long)]
        background: bool,

        /// Use an in-memory store instead of the configured file
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the number of stored places
    Count,
    /// Write the stored places as CSV
    Export {
        #[arg(short, long, default_value = "places.csv")]
        output: String,
    },
}
