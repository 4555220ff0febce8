pub mod assets;
pub mod backup;
pub mod market;
pub mod performance;
pub mod setup;
pub mod transactions;
pub mod ui;
