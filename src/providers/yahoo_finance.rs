use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::quote::{Dividend, PriceBar, QuoteHistory, QuoteProvider};

// YahooFinanceProvider implementation for QuoteProvider
pub struct YahooFinanceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("carteira/1.0")
            .timeout(timeout)
            .build()?;
        Ok(YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
    events: Option<ChartEvents>,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "gmtoffset", default)]
    gmt_offset: i64,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<u64>>>,
}

#[derive(Deserialize, Debug)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
}

#[derive(Deserialize, Debug)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

fn to_local_date(ts: i64, gmt_offset: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts + gmt_offset, 0).map(|dt| dt.date_naive())
}

fn value_at<T: Copy>(series: &Option<Vec<Option<T>>>, index: usize) -> Option<T> {
    series.as_ref().and_then(|values| values.get(index).copied().flatten())
}

fn extract_bars(item: &ChartItem) -> Vec<PriceBar> {
    let Some(timestamps) = item.timestamp.as_ref() else {
        return Vec::new();
    };
    let quote = item
        .indicators
        .as_ref()
        .and_then(|inds| inds.quote.first());
    let Some(quote) = quote else {
        return Vec::new();
    };

    let mut bars: Vec<PriceBar> = Vec::with_capacity(timestamps.len());
    for (index, ts) in timestamps.iter().enumerate() {
        // Bars without a close are gaps in the series.
        let (Some(close), Some(date)) = (
            value_at(&quote.close, index),
            to_local_date(*ts, item.meta.gmt_offset),
        ) else {
            continue;
        };

        let bar = PriceBar {
            date,
            open: value_at(&quote.open, index),
            high: value_at(&quote.high, index),
            low: value_at(&quote.low, index),
            close,
            volume: value_at(&quote.volume, index),
        };

        // The live bar can repeat the last session's date; keep the latest.
        match bars.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => bars.push(bar),
        }
    }

    bars.sort_by_key(|bar| bar.date);
    bars
}

fn extract_dividends(item: &ChartItem) -> Vec<Dividend> {
    let mut dividends: Vec<Dividend> = item
        .events
        .as_ref()
        .map(|events| {
            events
                .dividends
                .values()
                .filter_map(|event| {
                    to_local_date(event.date, item.meta.gmt_offset).map(|date| Dividend {
                        date,
                        amount: event.amount,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    dividends.sort_by_key(|d| d.date);
    dividends
}

#[async_trait]
impl QuoteProvider for YahooFinanceProvider {
    #[instrument(
        name = "YahooHistoryFetch",
        skip(self),
        fields(symbol = %symbol)
    )]
    async fn fetch_history(&self, symbol: &str) -> Result<QuoteHistory> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=1y&events=div",
            self.base_url, symbol
        );
        debug!("Requesting price history from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for symbol: {}", e, symbol))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for symbol: {}",
                response.status(),
                symbol
            ));
        }

        let text = response.text().await?;
        let data: YahooChartResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        let Some(item) = data.chart.result.as_ref().and_then(|r| r.first()) else {
            debug!("No chart data returned for {}", symbol);
            return Ok(QuoteHistory::default());
        };

        let history = QuoteHistory {
            bars: extract_bars(item),
            dividends: extract_dividends(item),
        };
        debug!(
            bars = history.bars.len(),
            dividends = history.dividends.len(),
            "Parsed Yahoo chart"
        );

        Ok(history)
    }
}
