pub mod bcb;
pub mod yahoo_finance;
