use super::ui;
use crate::core::performance::{PerformanceService, PortfolioPerformance, PortfolioReport};
use anyhow::Result;
use comfy_table::Cell;

fn benchmark_line(benchmark_rate: Option<f64>) -> String {
    match benchmark_rate {
        Some(rate) => format!(
            "{}: {}",
            ui::style_text("CDI 12M", ui::StyleType::TotalLabel),
            ui::styled_change(rate)
        ),
        None => format!(
            "{}: {}",
            ui::style_text("CDI 12M", ui::StyleType::TotalLabel),
            ui::style_text("unavailable", ui::StyleType::Error)
        ),
    }
}

fn display_performance(performance: &PortfolioPerformance) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Kind"),
        ui::header_cell("Quantity"),
        ui::header_cell("Price"),
        ui::header_cell("Day"),
        ui::header_cell("Invested"),
        ui::header_cell("Value"),
        ui::header_cell("Return"),
        ui::header_cell("Div. 12M"),
        ui::header_cell("vs CDI"),
    ]);

    for asset in &performance.assets {
        table.add_row(vec![
            Cell::new(&asset.ticker),
            Cell::new(asset.kind),
            ui::number_cell(asset.quantity),
            ui::money_cell(asset.current_price),
            ui::change_cell(asset.day_change_pct),
            ui::money_cell(asset.invested),
            ui::money_cell(asset.current_value),
            ui::change_cell(asset.return_pct),
            ui::number_cell(format!("{:.2}", asset.dividends)),
            ui::optional_change_cell(asset.benchmark_delta),
        ]);
    }

    let totals = &performance.totals;
    let mut output = format!(
        "{}\n\n",
        ui::style_text("Portfolio performance", ui::StyleType::Title)
    );
    output.push_str(&table.to_string());

    let lines = [
        ("Total invested", ui::money(totals.invested)),
        ("Total divested", ui::money(totals.divested)),
        ("Current value", ui::money(totals.current_value)),
        ("Total return", ui::styled_change(totals.return_pct)),
        ("Dividends 12M", format!("{:.2}", totals.dividends)),
    ];
    output.push('\n');
    for (label, value) in lines {
        output.push_str(&format!(
            "\n{}: {}",
            ui::style_text(label, ui::StyleType::TotalLabel),
            value
        ));
    }
    output.push_str(&format!("\n{}", benchmark_line(performance.benchmark_rate)));
    if let Some(delta) = totals.benchmark_delta {
        output.push_str(&format!(
            "\n{}: {}",
            ui::style_text("Return vs CDI", ui::StyleType::TotalLabel),
            ui::styled_change(delta)
        ));
    }
    output
}

/// Renders a report for the terminal.
pub fn display_report(report: &PortfolioReport) -> String {
    match report {
        PortfolioReport::Empty { benchmark_rate } => format!(
            "{}\n\n{}",
            ui::style_text(
                "No transactions with market data to report on yet.",
                ui::StyleType::Subtle
            ),
            benchmark_line(*benchmark_rate)
        ),
        PortfolioReport::Populated(performance) => display_performance(performance),
    }
}

pub async fn run(service: &PerformanceService, json: bool) -> Result<()> {
    let spinner = ui::new_spinner("Fetching market data...");
    let report = service.compute_portfolio_performance().await;
    spinner.finish_and_clear();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", display_report(&report));
    }
    Ok(())
}
