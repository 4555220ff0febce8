//! Portfolio performance against the benchmark rate.
//!
//! Holdings come from the store, prices and dividends from the cached
//! market data adapter. Assets whose market data is unavailable are left out
//! of the report; only store failures abort the computation.

use crate::core::market::MarketData;
use crate::core::portfolio::{Asset, AssetKind, Holding};
use crate::core::quote::{HistoricalPeriod, MarketSnapshot, PriceBar};
use crate::store::PortfolioStore;
use anyhow::Result;
use futures::{StreamExt, stream};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Fractional digits kept when converting a quoted price to money.
const MARKET_PRICE_SCALE: u32 = 4;

pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetPerformance {
    pub ticker: String,
    pub symbol: String,
    pub kind: AssetKind,
    pub quantity: i64,
    pub current_price: Decimal,
    pub day_change_pct: f64,
    pub invested: Decimal,
    pub divested: Decimal,
    pub current_value: Decimal,
    pub return_pct: f64,
    /// Dividends paid per share over the trailing year.
    pub dividends: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_delta: Option<f64>,
    pub period_changes: BTreeMap<HistoricalPeriod, f64>,
    pub history: Vec<PriceBar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioTotals {
    pub invested: Decimal,
    pub divested: Decimal,
    pub current_value: Decimal,
    pub return_pct: f64,
    pub dividends: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioPerformance {
    pub assets: Vec<AssetPerformance>,
    pub totals: PortfolioTotals,
    /// Accumulated benchmark rate over the trailing 12 months, when available.
    pub benchmark_rate: Option<f64>,
}

/// Result of an aggregation.
///
/// `Empty` means there was nothing to measure: no asset has transactions, or
/// none of them has market data. It never carries zeroed figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PortfolioReport {
    Empty { benchmark_rate: Option<f64> },
    Populated(PortfolioPerformance),
}

impl PortfolioReport {
    pub fn benchmark_rate(&self) -> Option<f64> {
        match self {
            PortfolioReport::Empty { benchmark_rate } => *benchmark_rate,
            PortfolioReport::Populated(performance) => performance.benchmark_rate,
        }
    }
}

/// Return on invested money, counting sale proceeds, in percent. 0 when nothing was invested.
pub fn total_return_pct(invested: Decimal, divested: Decimal, current_value: Decimal) -> f64 {
    if invested <= Decimal::ZERO {
        return 0.0;
    }
    ((current_value + divested - invested) / invested * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0)
}

fn asset_performance(
    asset: &Asset,
    holding: &Holding,
    snapshot: &MarketSnapshot,
    benchmark_rate: Option<f64>,
) -> Option<AssetPerformance> {
    let Some(current_price) = Decimal::from_f64(snapshot.current_price) else {
        warn!(
            ticker = %asset.ticker,
            price = snapshot.current_price,
            "Ignoring unrepresentable market price"
        );
        return None;
    };
    let current_price = current_price.round_dp(MARKET_PRICE_SCALE);
    let current_value = Decimal::from(holding.quantity) * current_price;
    let return_pct = total_return_pct(holding.invested, holding.divested, current_value);

    Some(AssetPerformance {
        ticker: asset.ticker.clone(),
        symbol: snapshot.symbol.clone(),
        kind: asset.kind,
        quantity: holding.quantity,
        current_price,
        day_change_pct: snapshot.day_change_pct,
        invested: holding.invested,
        divested: holding.divested,
        current_value,
        return_pct,
        dividends: snapshot.trailing_dividends,
        benchmark_delta: benchmark_rate.map(|rate| return_pct - rate),
        period_changes: snapshot.period_changes.clone(),
        history: snapshot.history.clone(),
    })
}

fn portfolio_totals(assets: &[AssetPerformance], benchmark_rate: Option<f64>) -> PortfolioTotals {
    let invested: Decimal = assets.iter().map(|a| a.invested).sum();
    let divested: Decimal = assets.iter().map(|a| a.divested).sum();
    let current_value: Decimal = assets.iter().map(|a| a.current_value).sum();
    let return_pct = total_return_pct(invested, divested, current_value);

    PortfolioTotals {
        invested,
        divested,
        current_value,
        return_pct,
        dividends: assets.iter().map(|a| a.dividends).sum(),
        benchmark_delta: benchmark_rate.map(|rate| return_pct - rate),
    }
}

/// Aggregates stored positions and market data into a [`PortfolioReport`].
pub struct PerformanceService {
    store: Arc<dyn PortfolioStore>,
    market: Arc<MarketData>,
    max_concurrent_fetches: usize,
}

impl PerformanceService {
    pub fn new(
        store: Arc<dyn PortfolioStore>,
        market: Arc<MarketData>,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            store,
            market,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Assets with at least one transaction, in store order, with their holdings.
    async fn positions(&self) -> Result<Vec<(Asset, Holding)>> {
        let mut positions = Vec::new();
        for asset in self.store.list_assets().await? {
            let transactions = self.store.list_transactions(asset.id).await?;
            if transactions.is_empty() {
                continue;
            }
            let holding = Holding::from_transactions(&transactions);
            positions.push((asset, holding));
        }
        Ok(positions)
    }

    #[instrument(name = "PortfolioPerformance", skip(self))]
    pub async fn compute_portfolio_performance(&self) -> Result<PortfolioReport> {
        let positions = self.positions().await?;
        if positions.is_empty() {
            info!("No asset has transactions");
            let benchmark_rate = self.market.get_accumulated_rate().await;
            return Ok(PortfolioReport::Empty { benchmark_rate });
        }
        debug!(positions = positions.len(), "Fetching market data");

        let market = &self.market;
        let snapshots = stream::iter(positions)
            .map(|(asset, holding)| async move {
                let snapshot = market.get_asset_snapshot(&asset.ticker).await;
                (asset, holding, snapshot)
            })
            .buffered(self.max_concurrent_fetches)
            .collect::<Vec<_>>();
        let (snapshots, benchmark_rate) =
            tokio::join!(snapshots, self.market.get_accumulated_rate());

        let assets: Vec<AssetPerformance> = snapshots
            .iter()
            .filter_map(|(asset, holding, snapshot)| match snapshot {
                Some(snapshot) => asset_performance(asset, holding, snapshot, benchmark_rate),
                None => {
                    info!(ticker = %asset.ticker, "No market data, leaving asset out");
                    None
                }
            })
            .collect();

        if assets.is_empty() {
            info!("No asset has market data");
            return Ok(PortfolioReport::Empty { benchmark_rate });
        }

        let totals = portfolio_totals(&assets, benchmark_rate);
        Ok(PortfolioReport::Populated(PortfolioPerformance {
            assets,
            totals,
            benchmark_rate,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::TtlCache;
    use crate::core::portfolio::{NewTransaction, Side, Transaction};
    use crate::core::quote::{QuoteHistory, QuoteProvider};
    use crate::core::rate::{RateEntry, RateProvider};
    use crate::store::MemoryStore;
    use anyhow::{anyhow, bail};
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration as StdDuration;

    /// Serves one close per symbol, dated today; unknown symbols have no data.
    struct FixedQuotes(HashMap<String, f64>);

    #[async_trait]
    impl QuoteProvider for FixedQuotes {
        async fn fetch_history(&self, symbol: &str) -> Result<QuoteHistory> {
            let Some(close) = self.0.get(symbol) else {
                return Ok(QuoteHistory::default());
            };
            Ok(QuoteHistory {
                bars: vec![PriceBar {
                    date: Utc::now().date_naive(),
                    open: None,
                    high: None,
                    low: None,
                    close: *close,
                    volume: None,
                }],
                dividends: Vec::new(),
            })
        }
    }

    /// A single-period series, so the accumulated rate equals `rate`.
    struct FixedRate(Option<f64>);

    #[async_trait]
    impl RateProvider for FixedRate {
        async fn fetch_series(&self, start: NaiveDate, _end: NaiveDate) -> Result<Vec<RateEntry>> {
            match self.0 {
                Some(rate) => Ok(vec![RateEntry { date: start, rate }]),
                None => Err(anyhow!("rate service unavailable")),
            }
        }
    }

    fn market(quotes: &[(&str, f64)], rate: Option<f64>) -> Arc<MarketData> {
        let quotes = quotes
            .iter()
            .map(|(symbol, close)| (symbol.to_string(), *close))
            .collect();
        Arc::new(MarketData::new(
            Arc::new(FixedQuotes(quotes)),
            Arc::new(FixedRate(rate)),
            Arc::new(TtlCache::new("volatile", 512, StdDuration::from_secs(900))),
            Arc::new(TtlCache::new("slow", 128, StdDuration::from_secs(14_400))),
            ".SA",
        ))
    }

    async fn record(
        store: &MemoryStore,
        ticker: &str,
        kind: AssetKind,
        trades: &[(Side, Decimal, u32)],
    ) {
        let asset = store.create_asset(ticker, kind).await.unwrap();
        for (side, price, quantity) in trades {
            store
                .create_transaction(NewTransaction {
                    asset_id: asset.id,
                    side: *side,
                    date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                    price: *price,
                    quantity: *quantity,
                })
                .await
                .unwrap();
        }
    }

    fn populated(report: PortfolioReport) -> PortfolioPerformance {
        match report {
            PortfolioReport::Populated(performance) => performance,
            PortfolioReport::Empty { .. } => panic!("Expected a populated report"),
        }
    }

    #[test]
    fn test_total_return_counts_divested_amounts() {
        assert_eq!(total_return_pct(dec!(1000), dec!(0), dec!(1100)), 10.0);
        assert_eq!(total_return_pct(dec!(100), dec!(150), dec!(0)), 50.0);
        assert_eq!(total_return_pct(dec!(0), dec!(150), dec!(0)), 0.0);
    }

    #[tokio::test]
    async fn test_assets_without_market_data_are_excluded() {
        let store = Arc::new(MemoryStore::new());
        record(&store, "XPML11", AssetKind::Fii, &[(Side::Buy, dec!(100.00), 10)]).await;
        record(
            &store,
            "PETR4",
            AssetKind::Stock,
            &[(Side::Buy, dec!(20.00), 5), (Side::Sell, dec!(30.00), 5)],
        )
        .await;
        let service =
            PerformanceService::new(store, market(&[("XPML11.SA", 110.00)], Some(5.0)), 8);

        let performance = populated(service.compute_portfolio_performance().await.unwrap());

        assert_eq!(performance.assets.len(), 1);
        let row = &performance.assets[0];
        assert_eq!(row.ticker, "XPML11");
        assert_eq!(row.symbol, "XPML11.SA");
        assert_eq!(row.quantity, 10);
        assert_eq!(row.current_price, dec!(110));
        assert_eq!(row.invested, dec!(1000.00));
        assert_eq!(row.current_value, dec!(1100.00));
        assert!((row.return_pct - 10.0).abs() < 1e-9);
        assert!((row.benchmark_delta.unwrap() - 5.0).abs() < 1e-9);

        let totals = &performance.totals;
        assert_eq!(totals.invested, dec!(1000.00));
        assert_eq!(totals.divested, dec!(0));
        assert_eq!(totals.current_value, dec!(1100.00));
        assert!((totals.return_pct - 10.0).abs() < 1e-9);
        // Accumulated through compounding, so only close to the period rate.
        assert!((performance.benchmark_rate.unwrap() - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zero_invested_has_zero_return() {
        let store = Arc::new(MemoryStore::new());
        record(&store, "BOVA11", AssetKind::Etf, &[(Side::Buy, dec!(0), 10)]).await;
        let service = PerformanceService::new(store, market(&[("BOVA11.SA", 110.0)], None), 8);

        let performance = populated(service.compute_portfolio_performance().await.unwrap());
        assert_eq!(performance.assets[0].current_value, dec!(1100));
        assert_eq!(performance.assets[0].return_pct, 0.0);
        assert_eq!(performance.totals.return_pct, 0.0);
    }

    #[tokio::test]
    async fn test_totals_are_recomputed_from_sums() {
        let store = Arc::new(MemoryStore::new());
        record(&store, "HGLG11", AssetKind::Fii, &[(Side::Buy, dec!(100), 10)]).await;
        record(
            &store,
            "IVVB11",
            AssetKind::Etf,
            &[(Side::Buy, dec!(300), 10), (Side::Sell, dec!(330), 5)],
        )
        .await;
        let service = PerformanceService::new(
            store,
            market(&[("HGLG11.SA", 90.0), ("IVVB11.SA", 310.0)], None),
            8,
        );

        let performance = populated(service.compute_portfolio_performance().await.unwrap());
        let totals = &performance.totals;

        // HGLG11: 1000 -> 900. IVVB11: 3000 -> 1550 held + 1650 sold.
        assert_eq!(totals.invested, dec!(4000));
        assert_eq!(totals.divested, dec!(1650));
        assert_eq!(totals.current_value, dec!(2450));
        assert!((totals.return_pct - 2.5).abs() < 1e-9);
        assert!((performance.assets[0].return_pct + 10.0).abs() < 1e-9);
        assert!((performance.assets[1].return_pct - 200.0 / 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rows_keep_store_order_with_bounded_fetches() {
        let store = Arc::new(MemoryStore::new());
        let tickers = ["BCFF11", "CPTS11", "KNRI11", "MXRF11", "VISC11"];
        for ticker in tickers {
            record(&store, ticker, AssetKind::Fii, &[(Side::Buy, dec!(10), 1)]).await;
        }
        let symbols: Vec<String> = tickers.iter().map(|t| format!("{t}.SA")).collect();
        let quotes: Vec<(&str, f64)> = symbols.iter().map(|s| (s.as_str(), 11.0)).collect();
        let service = PerformanceService::new(store, market(&quotes, None), 2);

        let performance = populated(service.compute_portfolio_performance().await.unwrap());
        let listed: Vec<&str> = performance.assets.iter().map(|a| a.ticker.as_str()).collect();
        assert_eq!(listed, tickers);
    }

    #[tokio::test]
    async fn test_benchmark_outage_omits_deltas_only() {
        let store = Arc::new(MemoryStore::new());
        record(&store, "XPML11", AssetKind::Fii, &[(Side::Buy, dec!(100), 10)]).await;
        let service = PerformanceService::new(store, market(&[("XPML11.SA", 110.0)], None), 8);

        let performance = populated(service.compute_portfolio_performance().await.unwrap());
        assert!(performance.benchmark_rate.is_none());
        assert!(performance.assets[0].benchmark_delta.is_none());
        assert!(performance.totals.benchmark_delta.is_none());
        assert!((performance.assets[0].return_pct - 10.0).abs() < 1e-9);

        let json = serde_json::to_value(PortfolioReport::Populated(performance)).unwrap();
        assert_eq!(json["status"], "populated");
        assert!(json["totals"].get("benchmark_delta").is_none());
    }

    #[tokio::test]
    async fn test_no_transactions_is_an_empty_report() {
        let store = Arc::new(MemoryStore::new());
        store.create_asset("XPML11", AssetKind::Fii).await.unwrap();
        let service =
            PerformanceService::new(store, market(&[("XPML11.SA", 110.0)], Some(3.0)), 8);

        let report = service.compute_portfolio_performance().await.unwrap();
        let PortfolioReport::Empty { benchmark_rate } = &report else {
            panic!("Expected an empty report");
        };
        assert!((benchmark_rate.unwrap() - 3.0).abs() < 1e-9);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "empty");
    }

    #[tokio::test]
    async fn test_all_snapshots_absent_is_an_empty_report() {
        let store = Arc::new(MemoryStore::new());
        record(&store, "PETR4", AssetKind::Stock, &[(Side::Buy, dec!(20), 5)]).await;
        let service = PerformanceService::new(store, market(&[], None), 8);

        let report = service.compute_portfolio_performance().await.unwrap();
        assert_eq!(
            report,
            PortfolioReport::Empty {
                benchmark_rate: None
            }
        );
    }

    struct UnreadableStore;

    #[async_trait]
    impl PortfolioStore for UnreadableStore {
        async fn list_assets(&self) -> Result<Vec<Asset>> {
            bail!("disk I/O error")
        }
        async fn get_asset(&self, _: u64) -> Result<Option<Asset>> {
            bail!("disk I/O error")
        }
        async fn find_asset_by_ticker(&self, _: &str) -> Result<Option<Asset>> {
            bail!("disk I/O error")
        }
        async fn create_asset(&self, _: &str, _: AssetKind) -> Result<Asset> {
            bail!("disk I/O error")
        }
        async fn delete_asset(&self, _: u64) -> Result<()> {
            bail!("disk I/O error")
        }
        async fn list_transactions(&self, _: u64) -> Result<Vec<Transaction>> {
            bail!("disk I/O error")
        }
        async fn list_transactions_between(
            &self,
            _: NaiveDate,
            _: NaiveDate,
        ) -> Result<Vec<Transaction>> {
            bail!("disk I/O error")
        }
        async fn get_transaction(&self, _: u64) -> Result<Option<Transaction>> {
            bail!("disk I/O error")
        }
        async fn create_transaction(&self, _: NewTransaction) -> Result<Transaction> {
            bail!("disk I/O error")
        }
        async fn update_transaction(&self, _: u64, _: NewTransaction) -> Result<Transaction> {
            bail!("disk I/O error")
        }
        async fn delete_transaction(&self, _: u64) -> Result<()> {
            bail!("disk I/O error")
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let service = PerformanceService::new(Arc::new(UnreadableStore), market(&[], Some(1.0)), 8);
        let result = service.compute_portfolio_performance().await;
        assert_eq!(result.unwrap_err().to_string(), "disk I/O error");
    }
}
