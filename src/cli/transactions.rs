use super::ui;
use crate::core::portfolio::{Asset, NewTransaction, Side, Transaction};
use crate::store::PortfolioStore;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::{Cell, Color};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A transaction as entered on the command line, against a ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionInput {
    pub ticker: String,
    pub side: Side,
    pub date: NaiveDate,
    pub price: Decimal,
    pub quantity: u32,
}

/// Fields to change on an existing transaction; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionChanges {
    pub ticker: Option<String>,
    pub side: Option<Side>,
    pub date: Option<NaiveDate>,
    pub price: Option<Decimal>,
    pub quantity: Option<u32>,
}

async fn resolve_asset(store: &dyn PortfolioStore, ticker: &str) -> Result<Asset> {
    store.find_asset_by_ticker(ticker).await?.with_context(|| {
        format!("Unknown asset {ticker}; register it first with `carteira asset add`")
    })
}

pub fn display_transactions(
    transactions: &[Transaction],
    tickers: &HashMap<u64, String>,
) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("ID"),
        ui::header_cell("Date"),
        ui::header_cell("Ticker"),
        ui::header_cell("Side"),
        ui::header_cell("Quantity"),
        ui::header_cell("Price"),
        ui::header_cell("Total"),
    ]);
    for txn in transactions {
        let ticker = tickers.get(&txn.asset_id).map_or("?", String::as_str);
        let side_color = match txn.side {
            Side::Buy => Color::Green,
            Side::Sell => Color::Red,
        };
        table.add_row(vec![
            ui::number_cell(txn.id),
            Cell::new(txn.date),
            Cell::new(ticker),
            Cell::new(txn.side).fg(side_color),
            ui::number_cell(txn.quantity),
            ui::money_cell(txn.price),
            ui::money_cell(txn.total()),
        ]);
    }
    table.to_string()
}

pub async fn add(store: &dyn PortfolioStore, input: TransactionInput) -> Result<Transaction> {
    let asset = resolve_asset(store, &input.ticker).await?;
    let txn = store
        .create_transaction(NewTransaction {
            asset_id: asset.id,
            side: input.side,
            date: input.date,
            price: input.price,
            quantity: input.quantity,
        })
        .await?;
    println!(
        "Recorded {} of {} {} at {} on {} (id {})",
        txn.side,
        txn.quantity,
        asset.ticker,
        ui::money(txn.price),
        txn.date,
        txn.id
    );
    Ok(txn)
}

pub async fn list(
    store: &dyn PortfolioStore,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let transactions = store
        .list_transactions_between(from.unwrap_or(NaiveDate::MIN), to.unwrap_or(NaiveDate::MAX))
        .await?;
    if transactions.is_empty() {
        println!(
            "{}",
            ui::style_text("No transactions in this period.", ui::StyleType::Subtle)
        );
        return Ok(());
    }

    let tickers: HashMap<u64, String> = store
        .list_assets()
        .await?
        .into_iter()
        .map(|asset| (asset.id, asset.ticker))
        .collect();
    println!("{}", display_transactions(&transactions, &tickers));
    Ok(())
}

pub async fn update(
    store: &dyn PortfolioStore,
    id: u64,
    changes: TransactionChanges,
) -> Result<Transaction> {
    let current = store
        .get_transaction(id)
        .await?
        .with_context(|| format!("Unknown transaction: {id}"))?;
    let asset_id = match &changes.ticker {
        Some(ticker) => resolve_asset(store, ticker).await?.id,
        None => current.asset_id,
    };

    let updated = store
        .update_transaction(
            id,
            NewTransaction {
                asset_id,
                side: changes.side.unwrap_or(current.side),
                date: changes.date.unwrap_or(current.date),
                price: changes.price.unwrap_or(current.price),
                quantity: changes.quantity.unwrap_or(current.quantity),
            },
        )
        .await?;
    println!("Updated transaction {}", updated.id);
    Ok(updated)
}

pub async fn remove(store: &dyn PortfolioStore, ids: &[u64]) -> Result<()> {
    for id in ids {
        store.delete_transaction(*id).await?;
        println!("Removed transaction {id}");
    }
    Ok(())
}
