//! Voucher Store CLI - migrations, stock and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! vs-cli migrate
//!
//! # Upload codes (whitespace separated, from arguments or a file)
//! vs-cli stock add gift-10 CODE-1 CODE-2
//! vs-cli stock add sim-de --country DE --file codes.txt
//! vs-cli stock add gift-25 --image card-1.png --image card-2.png
//!
//! # Show stock, and what underdelivered purchases are waiting for
//! vs-cli stock count
//! vs-cli stock overview
//!
//! # Deliver to underdelivered purchases / remove expired purchases
//! vs-cli fulfil
//! vs-cli cleanup
//!
//! # Confirm a bank transfer
//! vs-cli settle ABC234
//!
//! # Upgrade purchases stored before per-country stock
//! vs-cli migrate-legacy --map sim-de=DE --dry-run
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `stock` - Upload codes, show counts
//! - `fulfil` - Replenishment sweep
//! - `cleanup` - Cleanup sweep
//! - `settle` - Staff payment confirmation
//! - `find` - Search purchase IDs
//! - `migrate-legacy` - One-time legacy data upgrade

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "vs-cli")]
#[command(author, version, about = "Voucher store CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage the stock ledger
    Stock {
        #[command(subcommand)]
        action: StockAction,
    },
    /// Deliver stock to underdelivered purchases
    Fulfil,
    /// Remove purchases past their delete date
    Cleanup,
    /// Confirm a payment received outside any webhook (bank transfer)
    Settle {
        /// Purchase ID (case-insensitive)
        id: String,
    },
    /// Search purchase IDs
    Find {
        /// Part of a purchase ID
        fragment: String,
    },
    /// Fill in missing country IDs of purchases stored before per-country
    /// stock
    MigrateLegacy {
        /// Country for a variant's legacy entries, as `variant=COUNTRY`.
        /// Unlisted variants get `all`.
        #[arg(short, long = "map", value_name = "VARIANT=COUNTRY")]
        maps: Vec<String>,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum StockAction {
    /// Add codes to the ledger, then run the replenishment sweep
    Add {
        /// Variant ID
        variant: String,

        /// Country ID (`all` for variants without per-country stock)
        #[arg(short, long, default_value = "all")]
        country: String,

        /// Read whitespace-separated codes from a file
        #[arg(short, long, conflicts_with = "codes")]
        file: Option<PathBuf>,

        /// Upload image files, one stock item per file
        #[arg(long = "image", value_name = "FILE", conflicts_with_all = ["codes", "file"])]
        images: Vec<PathBuf>,

        /// Codes
        codes: Vec<String>,
    },
    /// Show stock per variant and country
    Count {
        /// Only this variant
        #[arg(short, long)]
        variant: Option<String>,
    },
    /// Show units owed to underdelivered purchases next to the stock
    Overview,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Stock { action } => match action {
            StockAction::Add {
                variant,
                country,
                file,
                images,
                codes,
            } => {
                commands::stock::add(&variant, &country, file.as_deref(), &images, &codes).await?;
            }
            StockAction::Count { variant } => commands::stock::count(variant.as_deref()).await?,
            StockAction::Overview => commands::stock::overview().await?,
        },
        Commands::Fulfil => commands::purchases::fulfil().await?,
        Commands::Cleanup => commands::purchases::cleanup().await?,
        Commands::Settle { id } => commands::purchases::settle(&id).await?,
        Commands::Find { fragment } => commands::purchases::find(&fragment).await?,
        Commands::MigrateLegacy { maps, dry_run } => {
            commands::legacy::run(&maps, dry_run).await?;
        }
    }
    Ok(())
}
