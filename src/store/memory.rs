use super::{
    PortfolioStore, canonical_ticker, prepare_transaction, sort_assets, sort_newest_first,
    sort_oldest_first, with_id,
};
use crate::core::portfolio::{Asset, AssetKind, NewTransaction, Transaction};
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    assets: BTreeMap<u64, Asset>,
    transactions: BTreeMap<u64, Transaction>,
    last_asset_id: u64,
    last_transaction_id: u64,
}

/// Volatile store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PortfolioStore for MemoryStore {
    async fn list_assets(&self) -> Result<Vec<Asset>> {
        let state = self.state.lock().await;
        let mut assets: Vec<Asset> = state.assets.values().cloned().collect();
        sort_assets(&mut assets);
        Ok(assets)
    }

    async fn get_asset(&self, id: u64) -> Result<Option<Asset>> {
        Ok(self.state.lock().await.assets.get(&id).cloned())
    }

    async fn find_asset_by_ticker(&self, ticker: &str) -> Result<Option<Asset>> {
        let ticker = canonical_ticker(ticker)?;
        let state = self.state.lock().await;
        Ok(state.assets.values().find(|a| a.ticker == ticker).cloned())
    }

    async fn create_asset(&self, ticker: &str, kind: AssetKind) -> Result<Asset> {
        let ticker = canonical_ticker(ticker)?;
        let mut state = self.state.lock().await;
        if state.assets.values().any(|a| a.ticker == ticker) {
            bail!("Asset {} already exists", ticker);
        }
        state.last_asset_id += 1;
        let asset = Asset {
            id: state.last_asset_id,
            ticker,
            kind,
        };
        state.assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn delete_asset(&self, id: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(asset) = state.assets.get(&id) else {
            bail!("Unknown asset: {}", id);
        };
        if state.transactions.values().any(|t| t.asset_id == id) {
            bail!("Asset {} still has transactions", asset.ticker);
        }
        state.assets.remove(&id);
        Ok(())
    }

    async fn list_transactions(&self, asset_id: u64) -> Result<Vec<Transaction>> {
        let state = self.state.lock().await;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.asset_id == asset_id)
            .cloned()
            .collect();
        sort_oldest_first(&mut transactions);
        Ok(transactions)
    }

    async fn list_transactions_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let state = self.state.lock().await;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.date >= from && t.date <= to)
            .cloned()
            .collect();
        sort_newest_first(&mut transactions);
        Ok(transactions)
    }

    async fn get_transaction(&self, id: u64) -> Result<Option<Transaction>> {
        Ok(self.state.lock().await.transactions.get(&id).cloned())
    }

    async fn create_transaction(&self, txn: NewTransaction) -> Result<Transaction> {
        let txn = prepare_transaction(txn)?;
        let mut state = self.state.lock().await;
        if !state.assets.contains_key(&txn.asset_id) {
            bail!("Unknown asset: {}", txn.asset_id);
        }
        state.last_transaction_id += 1;
        let transaction = with_id(state.last_transaction_id, txn);
        state
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn update_transaction(&self, id: u64, txn: NewTransaction) -> Result<Transaction> {
        let txn = prepare_transaction(txn)?;
        let mut state = self.state.lock().await;
        if !state.transactions.contains_key(&id) {
            bail!("Unknown transaction: {}", id);
        }
        if !state.assets.contains_key(&txn.asset_id) {
            bail!("Unknown asset: {}", txn.asset_id);
        }
        let transaction = with_id(id, txn);
        state.transactions.insert(id, transaction.clone());
        Ok(transaction)
    }

    async fn delete_transaction(&self, id: u64) -> Result<()> {
        match self.state.lock().await.transactions.remove(&id) {
            Some(_) => Ok(()),
            None => bail!("Unknown transaction: {}", id),
        }
    }
}
