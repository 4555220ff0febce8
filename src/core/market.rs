//! Cached access to quotes, dividends and the benchmark rate.
//!
//! Provider failures stop here: every lookup answers `None` when data is
//! missing or the provider is unavailable, and only present values are
//! cached.

use crate::core::cache::{CacheKey, MarketCache, cached};
use crate::core::quote::{
    Dividend, HistoricalPeriod, MarketSnapshot, PriceBar, QuoteHistory, QuoteProvider,
};
use crate::core::rate::{RateProvider, accumulate_rate};
use anyhow::Result;
use chrono::{Duration, Months, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Days a dividend counts towards the trailing sum.
const DIVIDEND_WINDOW_DAYS: i64 = 365;

/// How far past a period's start the oldest bar may be and still count as covering it.
const PERIOD_TOLERANCE_DAYS: i64 = 7;

/// Appends the market suffix unless the ticker already carries it.
pub fn normalize_ticker(ticker: &str, suffix: &str) -> String {
    let ticker = ticker.trim().to_uppercase();
    let suffix = suffix.trim().to_uppercase();
    if suffix.is_empty() || ticker.ends_with(&suffix) {
        ticker
    } else {
        format!("{ticker}{suffix}")
    }
}

fn percent_change(current: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        0.0
    } else {
        (current - reference) / reference * 100.0
    }
}

fn dividends_since(dividends: &[Dividend], today: NaiveDate) -> Vec<Dividend> {
    let start = today - Duration::days(DIVIDEND_WINDOW_DAYS);
    let mut recent: Vec<Dividend> = dividends
        .iter()
        .filter(|d| d.date > start && d.date <= today)
        .cloned()
        .collect();
    recent.sort_by_key(|d| d.date);
    recent
}

fn find_closest_close(bars: &[PriceBar], target: NaiveDate) -> Option<f64> {
    let first = bars.first()?;
    if first.date > target + Duration::days(PERIOD_TOLERANCE_DAYS) {
        return None;
    }
    bars.iter().find(|bar| bar.date >= target).map(|bar| bar.close)
}

fn period_changes(bars: &[PriceBar], current_price: f64) -> BTreeMap<HistoricalPeriod, f64> {
    let mut changes = BTreeMap::new();
    let Some(reference_date) = bars.last().map(|bar| bar.date) else {
        return changes;
    };

    for period in HistoricalPeriod::ALL {
        let target = reference_date - period.to_duration();
        if let Some(price) = find_closest_close(bars, target)
            && price > 0.0
        {
            changes.insert(period, percent_change(current_price, price));
        }
    }
    changes
}

/// Derives a snapshot from raw history. No bars means no snapshot.
pub fn build_snapshot(
    symbol: &str,
    history: QuoteHistory,
    today: NaiveDate,
) -> Option<MarketSnapshot> {
    let mut bars = history.bars;
    bars.sort_by_key(|bar| bar.date);

    let current_price = bars.last()?.close;
    let previous_close = if bars.len() >= 2 {
        bars[bars.len() - 2].close
    } else {
        current_price
    };

    let trailing_dividends = dividends_since(&history.dividends, today)
        .iter()
        .map(|d| d.amount)
        .sum();

    Some(MarketSnapshot {
        symbol: symbol.to_string(),
        current_price,
        previous_close,
        day_change_pct: percent_change(current_price, previous_close),
        trailing_dividends,
        period_changes: period_changes(&bars, current_price),
        history: bars,
    })
}

fn collapse<T>(result: Result<Option<Arc<T>>>, what: &str, subject: &str) -> Option<Arc<T>> {
    match result {
        Ok(Some(value)) => Some(value),
        Ok(None) => {
            debug!("No {what} available for {subject}");
            None
        }
        Err(e) => {
            warn!(error = %e, "Failed to fetch {what} for {subject}");
            None
        }
    }
}

/// Market data adapter shared by the aggregator and the CLI.
pub struct MarketData {
    quotes: Arc<dyn QuoteProvider>,
    rates: Arc<dyn RateProvider>,
    volatile: Arc<MarketCache>,
    slow: Arc<MarketCache>,
    market_suffix: String,
}

impl MarketData {
    pub fn new(
        quotes: Arc<dyn QuoteProvider>,
        rates: Arc<dyn RateProvider>,
        volatile: Arc<MarketCache>,
        slow: Arc<MarketCache>,
        market_suffix: &str,
    ) -> Self {
        Self {
            quotes,
            rates,
            volatile,
            slow,
            market_suffix: market_suffix.to_string(),
        }
    }

    pub fn normalize_ticker(&self, ticker: &str) -> String {
        normalize_ticker(ticker, &self.market_suffix)
    }

    #[instrument(name = "AssetSnapshot", skip(self))]
    pub async fn get_asset_snapshot(&self, ticker: &str) -> Option<Arc<MarketSnapshot>> {
        let symbol = self.normalize_ticker(ticker);
        let today = Utc::now().date_naive();
        let quotes = &self.quotes;
        let symbol_ref = symbol.as_str();

        let result = cached(
            &self.volatile,
            CacheKey::new("asset_snapshot").arg(&symbol),
            move || async move {
                let history = quotes.fetch_history(symbol_ref).await?;
                Ok(build_snapshot(symbol_ref, history, today))
            },
        )
        .await;

        collapse(result, "market snapshot", &symbol)
    }

    #[instrument(name = "DividendSeries", skip(self))]
    pub async fn get_dividend_series(&self, ticker: &str) -> Option<Arc<Vec<Dividend>>> {
        let symbol = self.normalize_ticker(ticker);
        let today = Utc::now().date_naive();
        let quotes = &self.quotes;
        let symbol_ref = symbol.as_str();

        let result = cached(
            &self.volatile,
            CacheKey::new("dividend_series").arg(&symbol),
            move || async move {
                let history = quotes.fetch_history(symbol_ref).await?;
                let recent = dividends_since(&history.dividends, today);
                Ok((!recent.is_empty()).then_some(recent))
            },
        )
        .await;

        collapse(result, "dividends", &symbol)
    }

    /// Benchmark rate compounded over the trailing 12 months, in percent.
    #[instrument(name = "AccumulatedRate", skip(self))]
    pub async fn get_accumulated_rate(&self) -> Option<f64> {
        let end = Utc::now().date_naive();
        let start = end
            .checked_sub_months(Months::new(12))
            .unwrap_or(end - Duration::days(365));
        let rates = &self.rates;

        let result = cached(
            &self.slow,
            CacheKey::new("accumulated_rate"),
            move || async move {
                let series = rates.fetch_series(start, end).await?;
                debug!(entries = series.len(), %start, %end, "Accumulating rate series");
                Ok(Some(accumulate_rate(&series)))
            },
        )
        .await;

        collapse(result, "accumulated rate", "benchmark").map(|rate| *rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::TtlCache;
    use crate::core::rate::RateEntry;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct StubQuotes {
        responses: HashMap<String, Result<QuoteHistory, String>>,
        calls: AtomicUsize,
    }

    impl StubQuotes {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn with(mut self, symbol: &str, response: Result<QuoteHistory, String>) -> Self {
            self.responses.insert(symbol.to_string(), response);
            self
        }
    }

    #[async_trait]
    impl QuoteProvider for StubQuotes {
        async fn fetch_history(&self, symbol: &str) -> Result<QuoteHistory> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(symbol) {
                Some(Ok(history)) => Ok(history.clone()),
                Some(Err(e)) => Err(anyhow!(e.clone())),
                None => Ok(QuoteHistory::default()),
            }
        }
    }

    struct StubRates {
        response: Result<Vec<f64>, String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateProvider for StubRates {
        async fn fetch_series(&self, start: NaiveDate, _end: NaiveDate) -> Result<Vec<RateEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(rates) => Ok(rates
                    .iter()
                    .enumerate()
                    .map(|(i, rate)| RateEntry {
                        date: start + Duration::days(i as i64),
                        rate: *rate,
                    })
                    .collect()),
                Err(e) => Err(anyhow!(e.clone())),
            }
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn bars_ending_today(closes: &[f64]) -> Vec<PriceBar> {
        let start = today() - Duration::days(closes.len() as i64 - 1);
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| PriceBar {
                date: start + Duration::days(i as i64),
                open: Some(*close),
                high: Some(*close),
                low: Some(*close),
                close: *close,
                volume: Some(1_000),
            })
            .collect()
    }

    fn history(closes: &[f64]) -> QuoteHistory {
        QuoteHistory {
            bars: bars_ending_today(closes),
            dividends: Vec::new(),
        }
    }

    fn market(quotes: Arc<StubQuotes>, rates: Result<Vec<f64>, String>) -> (MarketData, Arc<StubRates>) {
        let rates = Arc::new(StubRates {
            response: rates,
            calls: AtomicUsize::new(0),
        });
        let market = MarketData::new(
            quotes,
            rates.clone(),
            Arc::new(TtlCache::new("volatile", 512, StdDuration::from_secs(900))),
            Arc::new(TtlCache::new("slow", 128, StdDuration::from_secs(14_400))),
            ".SA",
        );
        (market, rates)
    }

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker("PETR4", ".SA"), "PETR4.SA");
        assert_eq!(normalize_ticker("PETR4.SA", ".SA"), "PETR4.SA");
        assert_eq!(normalize_ticker(" petr4.sa ", ".SA"), "PETR4.SA");
        assert_eq!(normalize_ticker("AAPL", ""), "AAPL");

        for ticker in ["XPML11", "xpml11.SA", "BOVA11.sa"] {
            let once = normalize_ticker(ticker, ".SA");
            assert_eq!(normalize_ticker(&once, ".SA"), once);
        }
    }

    #[test]
    fn test_day_change_from_last_two_closes() {
        let snapshot = build_snapshot("X.SA", history(&[10.0, 12.0]), today()).unwrap();
        assert_eq!(snapshot.current_price, 12.0);
        assert_eq!(snapshot.previous_close, 10.0);
        assert!((snapshot.day_change_pct - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_close_has_zero_day_change() {
        let snapshot = build_snapshot("X.SA", history(&[10.0]), today()).unwrap();
        assert_eq!(snapshot.previous_close, 10.0);
        assert_eq!(snapshot.day_change_pct, 0.0);
    }

    #[test]
    fn test_zero_previous_close_has_zero_day_change() {
        let snapshot = build_snapshot("X.SA", history(&[0.0, 5.0]), today()).unwrap();
        assert_eq!(snapshot.day_change_pct, 0.0);
    }

    #[test]
    fn test_empty_history_has_no_snapshot() {
        assert!(build_snapshot("X.SA", QuoteHistory::default(), today()).is_none());
    }

    #[test]
    fn test_trailing_dividends_only_count_last_year() {
        let today = today();
        let quote_history = QuoteHistory {
            bars: bars_ending_today(&[100.0]),
            dividends: vec![
                Dividend {
                    date: today - Duration::days(400),
                    amount: 5.0,
                },
                Dividend {
                    date: today - Duration::days(200),
                    amount: 0.8,
                },
                Dividend {
                    date: today - Duration::days(20),
                    amount: 0.7,
                },
            ],
        };

        let snapshot = build_snapshot("X.SA", quote_history, today).unwrap();
        assert!((snapshot.trailing_dividends - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_period_changes_need_enough_history() {
        let mut closes = vec![50.0; 366];
        closes[365] = 100.0;
        let snapshot = build_snapshot("X.SA", history(&closes), today()).unwrap();

        assert_eq!(snapshot.period_changes.len(), 3);
        assert!((snapshot.period_changes[&HistoricalPeriod::OneYear] - 100.0).abs() < 1e-9);
        assert!((snapshot.period_changes[&HistoricalPeriod::OneMonth] - 100.0).abs() < 1e-9);

        let short = build_snapshot("X.SA", history(&[10.0, 11.0, 12.0]), today()).unwrap();
        assert!(short.period_changes.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_cached_per_normalized_symbol() {
        let quotes = Arc::new(StubQuotes::new().with("XPML11.SA", Ok(history(&[100.0, 110.0]))));
        let (market, _) = market(quotes.clone(), Ok(vec![]));

        let first = market.get_asset_snapshot("XPML11").await.unwrap();
        let second = market.get_asset_snapshot("xpml11.sa").await.unwrap();

        assert_eq!(first.symbol, "XPML11.SA");
        assert_eq!(first.current_price, 110.0);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(quotes.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_absent_and_failed_snapshots_are_retried() {
        let quotes = Arc::new(
            StubQuotes::new()
                .with("DELISTED3.SA", Ok(QuoteHistory::default()))
                .with("PETR4.SA", Err("operation timed out".to_string())),
        );
        let (market, _) = market(quotes.clone(), Ok(vec![]));

        assert!(market.get_asset_snapshot("DELISTED3").await.is_none());
        assert!(market.get_asset_snapshot("DELISTED3").await.is_none());
        assert!(market.get_asset_snapshot("PETR4").await.is_none());
        assert!(market.get_asset_snapshot("PETR4").await.is_none());

        assert_eq!(quotes.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_dividend_series_is_windowed_and_sorted() {
        let today = today();
        let quotes = Arc::new(StubQuotes::new().with(
            "MXRF11.SA",
            Ok(QuoteHistory {
                bars: bars_ending_today(&[10.0]),
                dividends: vec![
                    Dividend {
                        date: today - Duration::days(10),
                        amount: 0.10,
                    },
                    Dividend {
                        date: today - Duration::days(40),
                        amount: 0.09,
                    },
                    Dividend {
                        date: today - Duration::days(500),
                        amount: 0.08,
                    },
                ],
            }),
        ));
        let (market, _) = market(quotes, Ok(vec![]));

        let series = market.get_dividend_series("MXRF11").await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].amount, 0.09);
        assert_eq!(series[1].amount, 0.10);

        assert!(market.get_dividend_series("BOVA11").await.is_none());
    }

    #[tokio::test]
    async fn test_accumulated_rate_is_compounded_and_cached() {
        let quotes = Arc::new(StubQuotes::new());
        let (market, rates) = market(quotes, Ok(vec![1.0, 1.0, 1.0]));

        let rate = market.get_accumulated_rate().await.unwrap();
        assert!((rate - 3.0301).abs() < 1e-4);

        market.get_accumulated_rate().await.unwrap();
        assert_eq!(rates.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_rate_series_is_zero() {
        let (market, _) = market(Arc::new(StubQuotes::new()), Ok(vec![]));
        assert_eq!(market.get_accumulated_rate().await, Some(0.0));
    }

    #[tokio::test]
    async fn test_rate_provider_failure_is_absent_and_retried() {
        let (market, rates) = market(
            Arc::new(StubQuotes::new()),
            Err("503 Service Unavailable".to_string()),
        );

        assert!(market.get_accumulated_rate().await.is_none());
        assert!(market.get_accumulated_rate().await.is_none());
        assert_eq!(rates.calls.load(Ordering::SeqCst), 2);
    }
}
