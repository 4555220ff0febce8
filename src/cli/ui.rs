use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::{Decimal, RoundingStrategy};
use std::time::Duration;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    TotalLabel,
    TotalValue,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::TotalLabel => style(text).bold(),
        StyleType::TotalValue => style(text).green().bold(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Formats an amount of money in reais.
pub fn money(value: Decimal) -> String {
    // `{:.2}` on a Decimal truncates, so round to centavos first.
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("R$ {rounded:.2}")
}

/// Right-aligned money cell.
pub fn money_cell(value: Decimal) -> Cell {
    Cell::new(money(value)).set_alignment(CellAlignment::Right)
}

/// Right-aligned plain number cell.
pub fn number_cell(text: impl ToString) -> Cell {
    Cell::new(text.to_string()).set_alignment(CellAlignment::Right)
}

/// Formats an `Option<T>` into a `Cell`. `None` is displayed as "N/A".
pub fn format_optional_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    value.map_or(
        Cell::new("N/A")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
        |v| Cell::new(format_fn(v)).set_alignment(CellAlignment::Right),
    )
}

/// Creates a cell for displaying percentage change with color coding.
pub fn change_cell(change: f64) -> Cell {
    let text = format!("{change:.2}%");
    if change >= 0.0 {
        Cell::new(text)
            .fg(Color::Green)
            .set_alignment(CellAlignment::Right)
    } else {
        Cell::new(text)
            .fg(Color::Red)
            .set_alignment(CellAlignment::Right)
    }
}

/// Like [`change_cell`], with "N/A" for a missing value.
pub fn optional_change_cell(change: Option<f64>) -> Cell {
    change.map_or_else(
        || format_optional_cell(None::<f64>, |_| String::new()),
        change_cell,
    )
}

/// Styles a percentage for use outside a table.
pub fn styled_change(change: f64) -> String {
    let text = format!("{change:.2}%");
    if change >= 0.0 {
        style(text).green().to_string()
    } else {
        style(text).red().to_string()
    }
}

/// Creates a spinner shown while waiting on the network.
pub fn new_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_keeps_two_places() {
        assert_eq!(money(dec!(1100)), "R$ 1100.00");
        assert_eq!(money(dec!(10.456)), "R$ 10.46");
        assert_eq!(money(dec!(2.345)), "R$ 2.35");
        assert_eq!(money(dec!(-0.125)), "R$ -0.13");
    }

    #[test]
    fn test_optional_change_cell() {
        assert_eq!(optional_change_cell(None).content(), "N/A");
        assert_eq!(optional_change_cell(Some(-1.234)).content(), "-1.23%");
    }
}
