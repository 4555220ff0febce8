//! Assets, transactions and the holdings derived from them.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Fractional digits kept for transaction prices.
pub const PRICE_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Real-estate investment fund (FII).
    Fii,
    Etf,
    Stock,
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AssetKind::Fii => "FII",
                AssetKind::Etf => "ETF",
                AssetKind::Stock => "Stock",
            }
        )
    }
}

impl FromStr for AssetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fii" | "fund" | "reit" => Ok(AssetKind::Fii),
            "etf" => Ok(AssetKind::Etf),
            "stock" | "equity" | "acao" | "ação" => Ok(AssetKind::Stock),
            _ => Err(anyhow::anyhow!("Invalid asset kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: u64,
    pub ticker: String,
    pub kind: AssetKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Side::Buy => "Buy",
                Side::Sell => "Sell",
            }
        )
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" | "comprar" => Ok(Side::Buy),
            "sell" | "vender" => Ok(Side::Sell),
            _ => Err(anyhow::anyhow!("Invalid transaction side: {}", s)),
        }
    }
}

/// Transaction fields as supplied by the caller, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub asset_id: u64,
    pub side: Side,
    pub date: NaiveDate,
    pub price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub asset_id: u64,
    pub side: Side,
    pub date: NaiveDate,
    pub price: Decimal,
    pub quantity: u32,
}

impl Transaction {
    pub fn total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Net position and cost basis of one asset, derived from its transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Holding {
    pub quantity: i64,
    pub invested: Decimal,
    pub divested: Decimal,
}

impl Holding {
    pub fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        transactions
            .into_iter()
            .fold(Holding::default(), |mut holding, txn| {
                match txn.side {
                    Side::Buy => {
                        holding.quantity += i64::from(txn.quantity);
                        holding.invested += txn.total();
                    }
                    Side::Sell => {
                        holding.quantity -= i64::from(txn.quantity);
                        holding.divested += txn.total();
                    }
                }
                holding
            })
    }
}
