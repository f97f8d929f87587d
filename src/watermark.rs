use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use tracing::info;

use crate::db;
use crate::error::{EtlError, Result};

// Rate rows persist the provider's published date label verbatim, so the
// stored maximum may be ISO or the provider's day-month-year form.
const STORED_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d %b %Y"];

/// The inclusive lower bound of the next rate-fetch window: the latest
/// date already loaded, or `today - lookback_days` when the table is
/// empty. The equity fetch does not consult this.
pub fn resolve_rate_watermark(
    conn: &Connection,
    today: NaiveDate,
    lookback_days: i64,
) -> Result<NaiveDate> {
    match db::max_date(conn, "interest_rates", "date")? {
        Some(stored) => {
            let watermark = parse_stored_date(&stored)?;
            info!("Rate watermark from store: {watermark}");
            Ok(watermark)
        }
        None => {
            let fallback = today - Duration::days(lookback_days);
            info!("Rate table is empty, defaulting watermark to {fallback}");
            Ok(fallback)
        }
    }
}

fn parse_stored_date(text: &str) -> Result<NaiveDate> {
    STORED_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text.trim(), format).ok())
        .ok_or_else(|| {
            EtlError::MalformedData(format!(
                "stored watermark date {text:?} is not a recognised date"
            ))
        })
}

// ── Tests ──
