pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

pub use crate::core::config;

use crate::cli::transactions::{TransactionChanges, TransactionInput};
use crate::core::config::AppConfig;
use crate::core::market::MarketData;
use crate::core::performance::PerformanceService;
use crate::core::portfolio::AssetKind;
use crate::core::{MarketCache, TtlCache};
use crate::providers::bcb::BcbProvider;
use crate::providers::yahoo_finance::YahooFinanceProvider;
use crate::store::{DiskStore, PortfolioStore};
use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    AssetAdd {
        ticker: String,
        kind: AssetKind,
    },
    AssetList,
    AssetRemove {
        ids: Vec<u64>,
    },
    TransactionAdd(TransactionInput),
    TransactionList {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    TransactionUpdate {
        id: u64,
        changes: TransactionChanges,
    },
    TransactionRemove {
        ids: Vec<u64>,
    },
    Performance {
        json: bool,
    },
    Quote {
        ticker: String,
    },
    Dividends {
        ticker: String,
    },
    Benchmark,
    Backup {
        output: Option<PathBuf>,
    },
}

/// Builds the market data adapter with its providers and caches from config.
pub fn build_market_data(config: &AppConfig) -> Result<MarketData> {
    let timeout = config.request_timeout();
    let quotes = YahooFinanceProvider::new(&config.providers.yahoo.base_url, timeout)?;
    let rates = BcbProvider::new(&config.providers.bcb.base_url, timeout)?;

    let volatile: MarketCache = TtlCache::new(
        "volatile",
        config.cache.volatile.max_entries,
        config.cache.volatile.ttl(),
    );
    let slow: MarketCache = TtlCache::new(
        "slow",
        config.cache.slow.max_entries,
        config.cache.slow.ttl(),
    );

    Ok(MarketData::new(
        Arc::new(quotes),
        Arc::new(rates),
        Arc::new(volatile),
        Arc::new(slow),
        &config.providers.yahoo.market_suffix,
    ))
}

fn open_store(config: &AppConfig) -> Result<Arc<dyn PortfolioStore>> {
    let path = config.default_data_path()?;
    Ok(Arc::new(DiskStore::open(&path)?))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("carteira starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::AssetAdd { ticker, kind } => {
            let store = open_store(&config)?;
            cli::assets::add(store.as_ref(), &ticker, kind).await?;
        }
        AppCommand::AssetList => cli::assets::list(open_store(&config)?.as_ref()).await?,
        AppCommand::AssetRemove { ids } => {
            cli::assets::remove(open_store(&config)?.as_ref(), &ids).await?
        }
        AppCommand::TransactionAdd(input) => {
            cli::transactions::add(open_store(&config)?.as_ref(), input).await?;
        }
        AppCommand::TransactionList { from, to } => {
            cli::transactions::list(open_store(&config)?.as_ref(), from, to).await?
        }
        AppCommand::TransactionUpdate { id, changes } => {
            cli::transactions::update(open_store(&config)?.as_ref(), id, changes).await?;
        }
        AppCommand::TransactionRemove { ids } => {
            cli::transactions::remove(open_store(&config)?.as_ref(), &ids).await?
        }
        AppCommand::Performance { json } => {
            let service = PerformanceService::new(
                open_store(&config)?,
                Arc::new(build_market_data(&config)?),
                config.max_concurrent_fetches,
            );
            cli::performance::run(&service, json).await?
        }
        AppCommand::Quote { ticker } => {
            cli::market::quote(&build_market_data(&config)?, &ticker).await?
        }
        AppCommand::Dividends { ticker } => {
            cli::market::dividends(&build_market_data(&config)?, &ticker).await?
        }
        AppCommand::Benchmark => cli::market::benchmark(&build_market_data(&config)?).await?,
        AppCommand::Backup { output } => {
            let dir = match output {
                Some(dir) => dir,
                None => config.default_data_path()?.join("backups"),
            };
            cli::backup::run(open_store(&config)?.as_ref(), &dir).await?
        }
    }
    Ok(())
}
