use super::ui;
use crate::core::market::MarketData;
use crate::core::quote::{Dividend, HistoricalPeriod, MarketSnapshot};
use anyhow::Result;
use comfy_table::Cell;

pub fn display_snapshot(snapshot: &MarketSnapshot) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Metric"), ui::header_cell("Value")]);
    table.add_row(vec![
        Cell::new("Price"),
        ui::number_cell(format!("{:.2}", snapshot.current_price)),
    ]);
    table.add_row(vec![
        Cell::new("Previous close"),
        ui::number_cell(format!("{:.2}", snapshot.previous_close)),
    ]);
    table.add_row(vec![
        Cell::new("Day change"),
        ui::change_cell(snapshot.day_change_pct),
    ]);
    for period in HistoricalPeriod::ALL {
        table.add_row(vec![
            Cell::new(format!("Change {period}")),
            ui::optional_change_cell(snapshot.period_changes.get(&period).copied()),
        ]);
    }
    table.add_row(vec![
        Cell::new("Dividends 12M"),
        ui::number_cell(format!("{:.2}", snapshot.trailing_dividends)),
    ]);

    format!(
        "{}\n\n{}",
        ui::style_text(&snapshot.symbol, ui::StyleType::Title),
        table
    )
}

pub fn display_dividends(symbol: &str, dividends: &[Dividend]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Date"), ui::header_cell("Amount")]);
    for dividend in dividends {
        table.add_row(vec![
            Cell::new(dividend.date),
            ui::number_cell(format!("{:.4}", dividend.amount)),
        ]);
    }
    let total: f64 = dividends.iter().map(|d| d.amount).sum();

    format!(
        "{}\n\n{}\n\n{}: {:.4}",
        ui::style_text(&format!("{symbol} dividends, last 12 months"), ui::StyleType::Title),
        table,
        ui::style_text("Total", ui::StyleType::TotalLabel),
        total
    )
}

fn unavailable(what: &str) {
    println!("{}", ui::style_text(what, ui::StyleType::Error));
}

pub async fn quote(market: &MarketData, ticker: &str) -> Result<()> {
    let spinner = ui::new_spinner("Fetching quote...");
    let snapshot = market.get_asset_snapshot(ticker).await;
    spinner.finish_and_clear();

    match snapshot {
        Some(snapshot) => println!("{}", display_snapshot(&snapshot)),
        None => unavailable(&format!(
            "No market data available for {}",
            market.normalize_ticker(ticker)
        )),
    }
    Ok(())
}

pub async fn dividends(market: &MarketData, ticker: &str) -> Result<()> {
    let spinner = ui::new_spinner("Fetching dividends...");
    let series = market.get_dividend_series(ticker).await;
    spinner.finish_and_clear();

    let symbol = market.normalize_ticker(ticker);
    match series {
        Some(series) => println!("{}", display_dividends(&symbol, &series)),
        None => unavailable(&format!("No dividends paid by {symbol} in the last 12 months")),
    }
    Ok(())
}

pub async fn benchmark(market: &MarketData) -> Result<()> {
    let spinner = ui::new_spinner("Fetching CDI series...");
    let rate = market.get_accumulated_rate().await;
    spinner.finish_and_clear();

    match rate {
        Some(rate) => println!(
            "{}: {}",
            ui::style_text("CDI accumulated over 12 months", ui::StyleType::TotalLabel),
            ui::styled_change(rate)
        ),
        None => unavailable("The CDI series is unavailable right now"),
    }
    Ok(())
}
