use anyhow::Result;
use carteira::AppCommand;
use carteira::cli::transactions::{TransactionChanges, TransactionInput};
use carteira::core::log::init_logging;
use carteira::core::portfolio::{AssetKind, Side};
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Manage registered assets
    #[command(subcommand)]
    Asset(AssetCommands),
    /// Manage buy and sell transactions
    #[command(subcommand)]
    Txn(TxnCommands),
    /// Display portfolio performance against the CDI
    Performance {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Display market data for a ticker
    Quote { ticker: String },
    /// Display dividends paid by a ticker over the last 12 months
    Dividends { ticker: String },
    /// Display the CDI accumulated over the last 12 months
    Benchmark,
    /// Export all assets and transactions to a JSON file
    Backup {
        /// Directory for the backup file (defaults to <data dir>/backups)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AssetCommands {
    /// Register a ticker
    Add {
        ticker: String,
        /// fii, etf or stock
        #[arg(short, long)]
        kind: AssetKind,
    },
    /// List registered assets
    List,
    /// Remove assets without transactions
    Remove {
        #[arg(required = true)]
        ids: Vec<u64>,
    },
}

#[derive(Subcommand)]
enum TxnCommands {
    /// Record a transaction
    Add {
        ticker: String,
        /// buy or sell
        #[arg(short, long)]
        side: Side,
        /// Trade date, YYYY-MM-DD
        #[arg(short, long)]
        date: NaiveDate,
        /// Unit price
        #[arg(short, long)]
        price: Decimal,
        #[arg(short, long)]
        quantity: u32,
    },
    /// List transactions, newest first
    List {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Change fields of a transaction
    Update {
        id: u64,
        #[arg(short, long)]
        ticker: Option<String>,
        #[arg(short, long)]
        side: Option<Side>,
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        price: Option<Decimal>,
        #[arg(short, long)]
        quantity: Option<u32>,
    },
    /// Remove transactions
    Remove {
        #[arg(required = true)]
        ids: Vec<u64>,
    },
}

impl From<Commands> for AppCommand {
    fn from(cmd: Commands) -> AppCommand {
        match cmd {
            Commands::Asset(AssetCommands::Add { ticker, kind }) => {
                AppCommand::AssetAdd { ticker, kind }
            }
            Commands::Asset(AssetCommands::List) => AppCommand::AssetList,
            Commands::Asset(AssetCommands::Remove { ids }) => AppCommand::AssetRemove { ids },
            Commands::Txn(TxnCommands::Add {
                ticker,
                side,
                date,
                price,
                quantity,
            }) => AppCommand::TransactionAdd(TransactionInput {
                ticker,
                side,
                date,
                price,
                quantity,
            }),
            Commands::Txn(TxnCommands::List { from, to }) => {
                AppCommand::TransactionList { from, to }
            }
            Commands::Txn(TxnCommands::Update {
                id,
                ticker,
                side,
                date,
                price,
                quantity,
            }) => AppCommand::TransactionUpdate {
                id,
                changes: TransactionChanges {
                    ticker,
                    side,
                    date,
                    price,
                    quantity,
                },
            },
            Commands::Txn(TxnCommands::Remove { ids }) => AppCommand::TransactionRemove { ids },
            Commands::Performance { json } => AppCommand::Performance { json },
            Commands::Quote { ticker } => AppCommand::Quote { ticker },
            Commands::Dividends { ticker } => AppCommand::Dividends { ticker },
            Commands::Benchmark => AppCommand::Benchmark,
            Commands::Backup { output } => AppCommand::Backup { output },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => carteira::cli::setup::setup_at_path(path),
            None => carteira::cli::setup::setup(),
        },
        Some(cmd) => carteira::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
