use chrono::{DateTime, NaiveDate};
use tracing::info;

use crate::error::{EtlError, Result};
use crate::model::round_dp;

const RATE_ENDPOINT: &str =
    "https://www.bankofengland.co.uk/boeapps/iadb/fromshowcolumns.asp";
const RATE_SERIES: &str = "IUMSOIA";
const DATE_COLUMN: &str = "DATE";
const EQUITY_RANGE: &str = "5d";
const CLOSE_DECIMALS: i32 = 5;

/// Request the rate series as CSV over the inclusive `[from, to]` window
/// and return `(date_label, rate)` pairs exactly as published. No
/// gap-filling, no interpolation.
pub async fn fetch_interest_rates(
    client: &reqwest::Client,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<(String, f64)>> {
    let from_token = window_token(from);
    let to_token = window_token(to);
    info!("Requesting {RATE_SERIES} observations from {from_token} to {to_token}");

    let response = client
        .get(RATE_ENDPOINT)
        .query(&[
            ("csv.x", "yes"),
            ("Datefrom", from_token.as_str()),
            ("Dateto", to_token.as_str()),
            ("SeriesCodes", RATE_SERIES),
            ("CSVF", "TN"),
            ("UsingCodes", "Y"),
            ("VPD", "Y"),
            ("VFD", "N"),
        ])
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EtlError::Network(format!(
            "rate provider responded {status}"
        )));
    }

    parse_rate_csv(&response.text().await?)
}

/// The provider takes window bounds as day/abbreviated-month/year tokens.
pub fn window_token(date: NaiveDate) -> String {
    date.format("%d/%b/%Y").to_string()
}

pub fn parse_rate_csv(body: &str) -> Result<Vec<(String, f64)>> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers = reader.headers()?.clone();
    let date_idx = column_index(&headers, DATE_COLUMN)?;
    let rate_idx = column_index(&headers, RATE_SERIES)?;

    let mut observations = Vec::new();
    for record in reader.records() {
        let record = record?;
        let date = record.get(date_idx).unwrap_or("").to_string();
        let field = record.get(rate_idx).unwrap_or("");
        let rate: f64 = field.trim().parse().map_err(|_| {
            EtlError::MalformedData(format!("rate value {field:?} is not numeric"))
        })?;
        observations.push((date, rate));
    }
    Ok(observations)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| {
            EtlError::MalformedData(format!("rate export has no {name} column"))
        })
}

/// Fetch the most recent trading sessions for `ticker` and return the
/// latest session's `(date, close)`, close rounded to 5 decimal digits.
/// An empty window is a hard failure; there is no fallback value.
pub async fn fetch_latest_close(ticker: &str) -> Result<(String, f64)> {
    info!("Fetching the last {EQUITY_RANGE} sessions for {ticker}");
    let connector = yahoo_finance_api::YahooConnector::new()
        .map_err(|e| EtlError::Network(e.to_string()))?;
    let response = connector
        .get_quote_range(ticker, "1d", EQUITY_RANGE)
        .await
        .map_err(|e| EtlError::Network(e.to_string()))?;
    let quotes = response
        .quotes()
        .map_err(|e| EtlError::Network(e.to_string()))?;

    let latest = quotes
        .into_iter()
        .max_by_key(|q| q.timestamp)
        .ok_or_else(|| {
            EtlError::Network(format!("no sessions returned for {ticker}"))
        })?;
    let date = DateTime::from_timestamp(latest.timestamp as i64, 0)
        .ok_or_else(|| {
            EtlError::MalformedData(format!(
                "session timestamp {} is out of range",
                latest.timestamp
            ))
        })?
        .date_naive()
        .format("%Y-%m-%d")
        .to_string();

    Ok((date, round_dp(latest.close, CLOSE_DECIMALS)))
}

// ── Tests ──
