use chrono::Local;
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::info;

use crate::config::Config;
use crate::db::{self, MergeSpec, INDEX_MERGE, PRICE_MERGE, PROPERTY_MERGE, RATE_MERGE};
use crate::enrich::{self, Geocoder};
use crate::error::Result;
use crate::extract::{self, PageSource};
use crate::finance;
use crate::model;
use crate::price::normalize_price;
use crate::watermark;

pub struct RunReport {
    pub pages_scanned: usize,
    pub listings: usize,
    pub properties_loaded: usize,
    pub prices_loaded: usize,
    pub rates_loaded: usize,
    pub closes_loaded: usize,
}

/// One full run: extract, normalize, enrich, resolve the rate watermark,
/// fetch both time series, then merge the four batches. The loads are
/// independent of each other; a failure after a successful load does not
/// roll it back, and a whole-run retry is safe because every load is
/// idempotent.
pub async fn run(
    cfg: &Config,
    page: &mut dyn PageSource,
    geocoder: &dyn Geocoder,
    http: &reqwest::Client,
    conn: &Connection,
) -> Result<RunReport> {
    let today = Local::now().date_naive();

    info!("Extracting listings from {}", cfg.search_url);
    let scraped = extract::collect_listings(page, &cfg.search_url).await?;
    page.close().await?;

    info!("Normalizing {} prices", scraped.listings.len());
    let prices = scraped
        .listings
        .iter()
        .map(|l| normalize_price(&l.raw_price))
        .collect::<Result<Vec<_>>>()?;

    let locations = enrich::resolve_all(geocoder, &scraped.listings, &cfg.area_suffix).await?;
    let listings = model::assemble(scraped.listings, prices, locations);

    let watermark = watermark::resolve_rate_watermark(conn, today, cfg.lookback_days)?;
    let rates = finance::fetch_interest_rates(http, watermark, today).await?;
    let (close_date, close) = finance::fetch_latest_close(&cfg.ticker).await?;

    let properties_loaded = load_batch(conn, &PROPERTY_MERGE, model::property_rows(&listings)?)?;
    let prices_loaded = load_batch(conn, &PRICE_MERGE, model::price_rows(&listings, today)?)?;
    let rates_loaded = load_batch(conn, &RATE_MERGE, model::rate_rows(&rates))?;
    let closes_loaded = load_batch(conn, &INDEX_MERGE, model::index_rows(&close_date, close))?;

    Ok(RunReport {
        pages_scanned: scraped.pages_scanned,
        listings: listings.len(),
        properties_loaded,
        prices_loaded,
        rates_loaded,
        closes_loaded,
    })
}

fn load_batch(conn: &Connection, spec: &MergeSpec, rows: Vec<Vec<Value>>) -> Result<usize> {
    info!("Loading into {} ...", spec.table);
    let before = db::table_count(conn, spec.table)?;
    let inserted = db::merge_missing(conn, spec, &rows)?;
    let after = db::table_count(conn, spec.table)?;
    info!(
        "{}: {} offered, {} inserted ({} -> {} rows)",
        spec.table,
        rows.len(),
        inserted,
        before,
        after
    );
    Ok(inserted)
}

// ── Tests ──
