//! Persistence for assets and transactions.

pub mod disk;
pub mod memory;

use crate::core::portfolio::{Asset, AssetKind, NewTransaction, PRICE_SCALE, Transaction};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Asset and transaction storage with single-writer semantics.
///
/// Assets are listed by ticker. Transactions of one asset are listed oldest
/// first; `list_transactions_between` lists the newest first.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn list_assets(&self) -> Result<Vec<Asset>>;
    async fn get_asset(&self, id: u64) -> Result<Option<Asset>>;
    async fn find_asset_by_ticker(&self, ticker: &str) -> Result<Option<Asset>>;
    async fn create_asset(&self, ticker: &str, kind: AssetKind) -> Result<Asset>;
    /// Fails when the asset is unknown or still has transactions.
    async fn delete_asset(&self, id: u64) -> Result<()>;

    async fn list_transactions(&self, asset_id: u64) -> Result<Vec<Transaction>>;
    /// Transactions dated within `[from, to]`, across all assets.
    async fn list_transactions_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>>;
    async fn get_transaction(&self, id: u64) -> Result<Option<Transaction>>;
    async fn create_transaction(&self, txn: NewTransaction) -> Result<Transaction>;
    async fn update_transaction(&self, id: u64, txn: NewTransaction) -> Result<Transaction>;
    async fn delete_transaction(&self, id: u64) -> Result<()>;
}

/// Canonical stored form of a ticker: the bare exchange code.
///
/// A market suffix such as `.SA` is dropped, so `PETR4` and `PETR4.SA` name
/// the same asset. The quote adapter appends the configured suffix again.
pub fn canonical_ticker(ticker: &str) -> Result<String> {
    let trimmed = ticker.trim();
    let code = match trimmed.split_once('.') {
        Some((code, _suffix)) => code,
        None => trimmed,
    }
    .to_uppercase();
    if code.is_empty() {
        bail!("Ticker must not be empty");
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        bail!("Invalid ticker: {}", ticker.trim());
    }
    Ok(code)
}

/// Validates a transaction and rounds its price to the stored precision.
pub(crate) fn prepare_transaction(mut txn: NewTransaction) -> Result<NewTransaction> {
    if txn.quantity == 0 {
        bail!("Quantity must be greater than zero");
    }
    if txn.price < Decimal::ZERO {
        bail!("Price must not be negative: {}", txn.price);
    }
    txn.price = txn.price.round_dp(PRICE_SCALE);
    Ok(txn)
}

pub(crate) fn with_id(id: u64, txn: NewTransaction) -> Transaction {
    Transaction {
        id,
        asset_id: txn.asset_id,
        side: txn.side,
        date: txn.date,
        price: txn.price,
        quantity: txn.quantity,
    }
}

pub(crate) fn sort_assets(assets: &mut [Asset]) {
    assets.sort_by(|a, b| a.ticker.cmp(&b.ticker));
}

pub(crate) fn sort_oldest_first(transactions: &mut [Transaction]) {
    transactions.sort_by_key(|t| (t.date, t.id));
}

pub(crate) fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by_key(|t| std::cmp::Reverse((t.date, t.id)));
}
