//! AI Store CLI - Database migrations and store management tools.
//!
//! # Usage
//!
//! ```bash
//! # Bring the schema up to date and print a per-table report
//! store-cli migrate
//!
//! # Insert catalog products from a YAML file
//! store-cli seed products catalog.yaml
//!
//! # Show the variant and UI config a user would get
//! store-cli decide --email shopper@example.com --country KR
//! ```
//!
//! All commands read `DATABASE_URL` and the `EXPERIMENT_*` variables the
//! server uses, including a `.env` file if present.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "store-cli")]
#[command(author, version, about = "AI Store CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the schema migrator
    Migrate,
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Print the variant decision for a user
    Decide {
        /// User email (the bucketing key)
        #[arg(short, long)]
        email: String,

        /// Two-letter country code
        #[arg(short, long, default_value = "KR")]
        country: String,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert catalog products from a YAML list
    Products {
        /// Path to the YAML file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { target } => match target {
            SeedTarget::Products { file } => commands::seed::products(&file).await?,
        },
        Commands::Decide { email, country } => commands::decide::run(&email, &country).await?,
    }
    Ok(())
}
