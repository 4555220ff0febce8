use super::{
    PortfolioStore, canonical_ticker, prepare_transaction, sort_assets, sort_newest_first,
    sort_oldest_first, with_id,
};
use crate::core::portfolio::{Asset, AssetKind, NewTransaction, Transaction};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

const ASSET_SEQUENCE: &[u8] = b"asset_id";
const TRANSACTION_SEQUENCE: &[u8] = b"transaction_id";

fn key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).context("Corrupt record in portfolio store")
}

/// Store backed by a fjall keyspace with one partition per record type.
///
/// Records are JSON values under big-endian id keys; `meta` holds the id
/// sequences.
pub struct DiskStore {
    keyspace: Keyspace,
    assets: PartitionHandle,
    transactions: PartitionHandle,
    meta: PartitionHandle,
    write_lock: Mutex<()>,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;

        let keyspace = Config::new(path.join("portfolio"))
            .open()
            .with_context(|| format!("Failed to open portfolio store at {}", path.display()))?;
        let assets = keyspace.open_partition("assets", PartitionCreateOptions::default())?;
        let transactions =
            keyspace.open_partition("transactions", PartitionCreateOptions::default())?;
        let meta = keyspace.open_partition("meta", PartitionCreateOptions::default())?;
        debug!("Opened portfolio store at {}", path.display());

        Ok(Self {
            keyspace,
            assets,
            transactions,
            meta,
            write_lock: Mutex::new(()),
        })
    }

    fn next_id(&self, sequence: &[u8]) -> Result<u64> {
        let last = match self.meta.get(sequence)? {
            Some(bytes) => {
                let raw = <[u8; 8]>::try_from(&*bytes)
                    .context("Corrupt id sequence in portfolio store")?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        Ok(last + 1)
    }

    fn all_assets(&self) -> Result<Vec<Asset>> {
        self.assets
            .iter()
            .map(|item| {
                let (_, value) = item.context("Failed to read assets")?;
                decode(&value)
            })
            .collect()
    }

    fn transactions_matching(
        &self,
        predicate: impl Fn(&Transaction) -> bool,
    ) -> Result<Vec<Transaction>> {
        let mut matching = Vec::new();
        for item in self.transactions.iter() {
            let (_, value) = item.context("Failed to read transactions")?;
            let txn: Transaction = decode(&value)?;
            if predicate(&txn) {
                matching.push(txn);
            }
        }
        Ok(matching)
    }

    fn asset_exists(&self, id: u64) -> Result<bool> {
        Ok(self.assets.contains_key(key(id))?)
    }

    fn persist(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist portfolio store")
    }
}

#[async_trait]
impl PortfolioStore for DiskStore {
    async fn list_assets(&self) -> Result<Vec<Asset>> {
        let mut assets = self.all_assets()?;
        sort_assets(&mut assets);
        Ok(assets)
    }

    async fn get_asset(&self, id: u64) -> Result<Option<Asset>> {
        self.assets
            .get(key(id))
            .context("Failed to read asset")?
            .map(|value| decode(&value))
            .transpose()
    }

    async fn find_asset_by_ticker(&self, ticker: &str) -> Result<Option<Asset>> {
        let ticker = canonical_ticker(ticker)?;
        Ok(self.all_assets()?.into_iter().find(|a| a.ticker == ticker))
    }

    async fn create_asset(&self, ticker: &str, kind: AssetKind) -> Result<Asset> {
        let ticker = canonical_ticker(ticker)?;
        let _guard = self.write_lock.lock().await;

        if self.all_assets()?.iter().any(|a| a.ticker == ticker) {
            bail!("Asset {} already exists", ticker);
        }
        let asset = Asset {
            id: self.next_id(ASSET_SEQUENCE)?,
            ticker,
            kind,
        };

        let mut batch = self.keyspace.batch();
        batch.insert(&self.meta, ASSET_SEQUENCE, key(asset.id).to_vec());
        batch.insert(&self.assets, key(asset.id).to_vec(), serde_json::to_vec(&asset)?);
        batch.commit().context("Failed to write asset")?;
        self.persist()?;

        debug!(id = asset.id, ticker = %asset.ticker, "Created asset");
        Ok(asset)
    }

    async fn delete_asset(&self, id: u64) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let Some(asset) = self.get_asset(id).await? else {
            bail!("Unknown asset: {}", id);
        };
        if !self.transactions_matching(|t| t.asset_id == id)?.is_empty() {
            bail!("Asset {} still has transactions", asset.ticker);
        }
        self.assets
            .remove(key(id).to_vec())
            .context("Failed to delete asset")?;
        self.persist()?;

        debug!(id, ticker = %asset.ticker, "Deleted asset");
        Ok(())
    }

    async fn list_transactions(&self, asset_id: u64) -> Result<Vec<Transaction>> {
        let mut transactions = self.transactions_matching(|t| t.asset_id == asset_id)?;
        sort_oldest_first(&mut transactions);
        Ok(transactions)
    }

    async fn list_transactions_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let mut transactions = self.transactions_matching(|t| t.date >= from && t.date <= to)?;
        sort_newest_first(&mut transactions);
        Ok(transactions)
    }

    async fn get_transaction(&self, id: u64) -> Result<Option<Transaction>> {
        self.transactions
            .get(key(id))
            .context("Failed to read transaction")?
            .map(|value| decode(&value))
            .transpose()
    }

    async fn create_transaction(&self, txn: NewTransaction) -> Result<Transaction> {
        let txn = prepare_transaction(txn)?;
        let _guard = self.write_lock.lock().await;

        if !self.asset_exists(txn.asset_id)? {
            bail!("Unknown asset: {}", txn.asset_id);
        }
        let transaction = with_id(self.next_id(TRANSACTION_SEQUENCE)?, txn);

        let mut batch = self.keyspace.batch();
        batch.insert(&self.meta, TRANSACTION_SEQUENCE, key(transaction.id).to_vec());
        batch.insert(
            &self.transactions,
            key(transaction.id).to_vec(),
            serde_json::to_vec(&transaction)?,
        );
        batch.commit().context("Failed to write transaction")?;
        self.persist()?;

        debug!(id = transaction.id, "Created transaction");
        Ok(transaction)
    }

    async fn update_transaction(&self, id: u64, txn: NewTransaction) -> Result<Transaction> {
        let txn = prepare_transaction(txn)?;
        let _guard = self.write_lock.lock().await;

        if !self.transactions.contains_key(key(id))? {
            bail!("Unknown transaction: {}", id);
        }
        if !self.asset_exists(txn.asset_id)? {
            bail!("Unknown asset: {}", txn.asset_id);
        }
        let transaction = with_id(id, txn);
        self.transactions
            .insert(key(id).to_vec(), serde_json::to_vec(&transaction)?)
            .context("Failed to write transaction")?;
        self.persist()?;

        debug!(id, "Updated transaction");
        Ok(transaction)
    }

    async fn delete_transaction(&self, id: u64) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if !self.transactions.contains_key(key(id))? {
            bail!("Unknown transaction: {}", id);
        }
        self.transactions
            .remove(key(id).to_vec())
            .context("Failed to delete transaction")?;
        self.persist()?;

        debug!(id, "Deleted transaction");
        Ok(())
    }
}
