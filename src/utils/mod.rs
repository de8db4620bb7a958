pub mod errors;
pub mod html;
pub mod table;

pub use table::Table;

/// Human readable price: more decimals for sub-unit prices
pub fn format_price(price: f64, currency: &str) -> String {
    if price.abs() < 1.0 {
        format!("{:.6} {}", price, currency.to_uppercase())
    } else {
        format!("{:.2} {}", price, currency.to_uppercase())
    }
}

pub fn format_change(pct: f64) -> String {
    format!("{:+.2}%", pct)
}
