//! Reference rate abstractions

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One observation of a periodic rate, in percent for its period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    pub date: NaiveDate,
    pub rate: f64,
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Returns the series between `start` and `end` (inclusive) in chronological order.
    async fn fetch_series(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<RateEntry>>;
}

/// Compounds periodic rates in the given order and returns the accumulated percentage.
///
/// An empty series accumulates to 0%.
pub fn accumulate_rate(entries: &[RateEntry]) -> f64 {
    let factor = entries
        .iter()
        .fold(1.0, |acc, entry| acc * (1.0 + entry.rate / 100.0));
    (factor - 1.0) * 100.0
}
