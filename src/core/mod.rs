//! Core business logic abstractions

pub mod cache;
pub mod config;
pub mod log;
pub mod market;
pub mod performance;
pub mod portfolio;
pub mod quote;
pub mod rate;

// Re-export main types for cleaner imports
pub use cache::{CacheKey, MarketCache, TtlCache, cached};
pub use market::MarketData;
pub use performance::{PerformanceService, PortfolioReport};
pub use portfolio::{Asset, AssetKind, Holding, NewTransaction, Side, Transaction};
pub use quote::{HistoricalPeriod, MarketSnapshot, QuoteProvider};
pub use rate::RateProvider;
