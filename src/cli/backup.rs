use crate::core::portfolio::{Asset, Transaction};
use crate::store::PortfolioStore;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything the store holds, as written to a backup file.
#[derive(Debug, Serialize)]
pub struct Backup {
    pub created_at: DateTime<Utc>,
    pub assets: Vec<Asset>,
    pub transactions: Vec<Transaction>,
}

pub async fn snapshot(store: &dyn PortfolioStore) -> Result<Backup> {
    let assets = store.list_assets().await?;
    let mut transactions = store
        .list_transactions_between(NaiveDate::MIN, NaiveDate::MAX)
        .await?;
    transactions.sort_by_key(|t| t.id);
    Ok(Backup {
        created_at: Utc::now(),
        assets,
        transactions,
    })
}

/// Writes a timestamped JSON backup into `dir` and returns its path.
pub async fn export(store: &dyn PortfolioStore, dir: &Path) -> Result<PathBuf> {
    let backup = snapshot(store).await?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create backup directory: {}", dir.display()))?;
    let path = dir.join(format!(
        "carteira_{}.json",
        backup.created_at.format("%Y%m%d_%H%M%S")
    ));
    let contents = serde_json::to_string_pretty(&backup)?;
    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write backup to {}", path.display()))?;

    info!(
        assets = backup.assets.len(),
        transactions = backup.transactions.len(),
        "Wrote backup to {}",
        path.display()
    );
    Ok(path)
}

pub async fn run(store: &dyn PortfolioStore, dir: &Path) -> Result<()> {
    let path = export(store, dir).await?;
    println!("Backup written to {}", path.display());
    Ok(())
}
