//! Quote abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Lookback windows reported alongside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum HistoricalPeriod {
    OneMonth,
    SixMonths,
    OneYear,
}

impl Display for HistoricalPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                HistoricalPeriod::OneMonth => "1M",
                HistoricalPeriod::SixMonths => "6M",
                HistoricalPeriod::OneYear => "1Y",
            }
        )
    }
}

impl HistoricalPeriod {
    pub const ALL: [HistoricalPeriod; 3] = [
        HistoricalPeriod::OneMonth,
        HistoricalPeriod::SixMonths,
        HistoricalPeriod::OneYear,
    ];

    pub fn to_duration(&self) -> Duration {
        match self {
            HistoricalPeriod::OneMonth => Duration::days(30),
            HistoricalPeriod::SixMonths => Duration::days(182),
            HistoricalPeriod::OneYear => Duration::days(365),
        }
    }
}

/// One daily bar. Only the close is guaranteed; the provider pads gaps with nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    pub date: NaiveDate,
    pub amount: f64,
}

/// Raw provider answer for one symbol: daily bars and dividend events, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteHistory {
    pub bars: Vec<PriceBar>,
    pub dividends: Vec<Dividend>,
}

/// Point-in-time market data for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub current_price: f64,
    pub previous_close: f64,
    pub day_change_pct: f64,
    pub trailing_dividends: f64,
    pub period_changes: BTreeMap<HistoricalPeriod, f64>,
    pub history: Vec<PriceBar>,
}

/// Source of daily price history and dividend events.
///
/// `Ok` with empty bars means the symbol has no data; `Err` means the
/// provider could not be reached or answered with something unreadable.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_history(&self, symbol: &str) -> Result<QuoteHistory>;
}
