//! Validation of raw promo-code sheet rows into [`PromoOrderRecord`]s.

use adrecon_core::types::PromoOrderRecord;
use adrecon_core::{DiagnosticKind, RunDiagnostics};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// One row as typed into the promo sheet; every cell is free text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromoRow {
    pub promo_code: Option<String>,
    pub order_id: Option<String>,
    /// Defaults to `order_id` when blank.
    pub transaction_id: Option<String>,
    pub order_date: Option<String>,
    pub order_amount: Option<String>,
    pub restaurant: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    pub problems: Vec<String>,
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.problems.join("; "))
    }
}

lazy_static! {
    static ref PROMO_CODE_RE: Regex =
        Regex::new(r"^[A-Za-z0-9_-]{3,30}$").expect("promo code pattern is valid");
    static ref IDENTIFIER_RE: Regex =
        Regex::new(r"^[A-Za-z0-9_-]{1,100}$").expect("identifier pattern is valid");
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a sheet date in any of the accepted layouts.
pub fn parse_sheet_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Parse an amount written with a comma decimal (`1500,50`), comma
/// thousands (`1,500` or `1,500.00`) or spaces (`1 500`). Negative and
/// non-finite amounts are rejected.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let commas = compact.matches(',').count();

    let normalized = if commas == 0 {
        compact
    } else if compact.contains('.') {
        compact.replace(',', "")
    } else {
        let groups: Vec<&str> = compact.split(',').collect();
        let decimal_comma = commas == 1 && groups[1].len() <= 2;
        let thousands = groups[1..].iter().all(|g| g.len() == 3);
        if decimal_comma {
            compact.replace(',', ".")
        } else if thousands {
            compact.replace(',', "")
        } else {
            return None;
        }
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Check one row, collecting every problem rather than stopping at the first.
pub fn validate_row(row: &PromoRow) -> Result<PromoOrderRecord, RowRejection> {
    let mut problems = Vec::new();

    let promo_code = non_blank(&row.promo_code);
    match promo_code {
        None => problems.push("missing promo_code".to_string()),
        Some(code) if !PROMO_CODE_RE.is_match(code) => {
            problems.push(format!("invalid promo_code '{code}'"))
        }
        _ => {}
    }

    let order_id = non_blank(&row.order_id);
    match order_id {
        None => problems.push("missing order_id".to_string()),
        Some(id) if !IDENTIFIER_RE.is_match(id) => {
            problems.push(format!("invalid order_id '{id}'"))
        }
        _ => {}
    }

    let transaction_id = non_blank(&row.transaction_id).or(order_id);
    if let Some(id) = transaction_id {
        if !IDENTIFIER_RE.is_match(id) {
            problems.push(format!("invalid transaction_id '{id}'"));
        }
    }

    let order_date = match non_blank(&row.order_date) {
        None => {
            problems.push("missing order_date".to_string());
            None
        }
        Some(raw) => {
            let parsed = parse_sheet_date(raw);
            if parsed.is_none() {
                problems.push(format!("invalid order_date '{raw}'"));
            }
            parsed
        }
    };

    let order_amount = match non_blank(&row.order_amount) {
        None => {
            problems.push("missing order_amount".to_string());
            None
        }
        Some(raw) => {
            let parsed = parse_amount(raw);
            if parsed.is_none() {
                problems.push(format!("invalid order_amount '{raw}'"));
            }
            parsed
        }
    };

    match (promo_code, order_id, order_date, order_amount) {
        (Some(code), Some(id), Some(date), Some(amount)) if problems.is_empty() => {
            Ok(PromoOrderRecord {
                order_id: id.to_string(),
                transaction_id: transaction_id.map(str::to_string),
                promo_code: code.to_string(),
                order_date: date,
                order_amount: amount,
                restaurant: non_blank(&row.restaurant).map(str::to_string),
                country: non_blank(&row.country).map(str::to_string),
            })
        }
        _ => Err(RowRejection { problems }),
    }
}

/// Keep the valid rows; every rejected row becomes an `InvalidPromoRow`
/// diagnostic.
pub fn validate_rows(rows: &[PromoRow], diagnostics: &RunDiagnostics) -> Vec<PromoOrderRecord> {
    let accepted: Vec<PromoOrderRecord> = rows
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| match validate_row(row) {
            Ok(record) => Some(record),
            Err(rejection) => {
                diagnostics.record(
                    DiagnosticKind::InvalidPromoRow,
                    format!("row {idx}: {rejection}"),
                );
                None
            }
        })
        .collect();

    info!(
        rows = rows.len(),
        accepted = accepted.len(),
        "Validated promo sheet rows"
    );
    accepted
}
