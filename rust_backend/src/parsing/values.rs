//! Parsers for individual cell values.
//!
//! Raw extracts write prices as `₹ 4.5 Cr`, `45 Lac` or `1,250.5` (with
//! thousands separators), and sale periods as `Q1_2023`, `2023-Q1` or plain dates. These
//! helpers turn such cells into typed values and return `None` for anything
//! they cannot interpret; deciding what a `None` means is left to the caller.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::domain::SalesPeriod;

static CURRENCY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(₹|\$|rs\.?|inr)").expect("valid currency regex"));

static PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<num>[-+]?(?:\d+(?:\.\d*)?|\.\d+))(?P<unit>crores?|cr|lakhs?|lacs?|l)?\.?$")
        .expect("valid price regex")
});

static QUARTER_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Q([1-4])[\s_\-/]*(\d{4})").expect("valid quarter regex")
});

static YEAR_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{4})[\s_\-/]*Q([1-4])").expect("valid quarter regex")
});

static YEAR_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{4})(?:\D|$)").expect("valid year regex"));

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Parse a ticket price cell into crores.
///
/// Currency symbols, thousands separators and whitespace are ignored. A
/// `Cr`/`Crore` unit is the default; `Lac`/`Lakh`/`L` values are divided by
/// 100. The sign is kept so that negative prices can be rejected downstream.
///
/// ```
/// use luxury_housing_etl::parsing::values::parse_price_cr;
///
/// assert_eq!(parse_price_cr("₹ 4.5 Cr"), Some(4.5));
/// assert_eq!(parse_price_cr("-5"), Some(-5.0));
/// assert_eq!(parse_price_cr("on request"), None);
/// ```
pub fn parse_price_cr(raw: &str) -> Option<f64> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let (sign, unsigned) = match compact.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", compact.strip_prefix('+').unwrap_or(compact.as_str())),
    };
    let stripped = format!("{}{}", sign, CURRENCY_PREFIX.replace(unsigned, ""));

    let caps = PRICE.captures(&stripped)?;
    let value: f64 = caps.name("num")?.as_str().parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    let scale = match caps.name("unit").map(|u| u.as_str().to_ascii_lowercase()) {
        Some(unit) if unit.starts_with('l') => 0.01,
        _ => 1.0,
    };

    Some(value * scale)
}

/// Parse a plain decimal cell. Non-finite values are treated as unparseable.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a purchase-quarter label.
///
/// Accepts `Q1_2023`, `Q1-2023`, `Q1 2023`, `2023-Q1` and `2023Q1`. A label
/// that only carries a year yields a period without a quarter.
pub fn parse_quarter_label(raw: &str) -> Option<SalesPeriod> {
    if let Some(caps) = QUARTER_FIRST.captures(raw) {
        let quarter: u8 = caps[1].parse().ok()?;
        let year: i32 = caps[2].parse().ok()?;
        return Some(SalesPeriod::new(year, Some(quarter)));
    }

    if let Some(caps) = YEAR_FIRST.captures(raw) {
        let year: i32 = caps[1].parse().ok()?;
        let quarter: u8 = caps[2].parse().ok()?;
        return Some(SalesPeriod::new(year, Some(quarter)));
    }

    let caps = YEAR_ONLY.captures(raw)?;
    let year: i32 = caps[1].parse().ok()?;
    Some(SalesPeriod::new(year, None))
}

/// Parse a transaction date (`YYYY-MM-DD`, `DD-MM-YYYY`, `DD/MM/YYYY`,
/// `YYYY/MM/DD`). A trailing time component is ignored.
pub fn parse_transaction_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw
        .trim()
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()?;

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Calendar quarter of a date.
pub fn period_from_date(date: NaiveDate) -> SalesPeriod {
    let quarter = ((date.month() - 1) / 3 + 1) as u8;
    SalesPeriod::new(date.year(), Some(quarter))
}
