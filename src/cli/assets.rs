use super::ui;
use crate::core::portfolio::{Asset, AssetKind};
use crate::store::PortfolioStore;
use anyhow::Result;
use comfy_table::Cell;

pub fn display_assets(assets: &[Asset]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("ID"),
        ui::header_cell("Ticker"),
        ui::header_cell("Kind"),
    ]);
    for asset in assets {
        table.add_row(vec![
            ui::number_cell(asset.id),
            Cell::new(&asset.ticker),
            Cell::new(asset.kind),
        ]);
    }
    table.to_string()
}

pub async fn add(store: &dyn PortfolioStore, ticker: &str, kind: AssetKind) -> Result<Asset> {
    let asset = store.create_asset(ticker, kind).await?;
    println!(
        "Registered {} ({}) with id {}",
        ui::style_text(&asset.ticker, ui::StyleType::TotalLabel),
        asset.kind,
        asset.id
    );
    Ok(asset)
}

pub async fn list(store: &dyn PortfolioStore) -> Result<()> {
    let assets = store.list_assets().await?;
    if assets.is_empty() {
        println!(
            "{}",
            ui::style_text("No assets registered yet.", ui::StyleType::Subtle)
        );
        return Ok(());
    }
    println!("{}", display_assets(&assets));
    Ok(())
}

/// Removes each asset in turn; stops at the first one that can't be removed.
pub async fn remove(store: &dyn PortfolioStore, ids: &[u64]) -> Result<()> {
    for id in ids {
        store.delete_asset(*id).await?;
        println!("Removed asset {id}");
    }
    Ok(())
}
