mod config;
mod db;
mod enrich;
mod error;
mod extract;
mod finance;
mod model;
mod pipeline;
mod price;
mod watermark;
mod webdriver;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use config::{Config, GeocoderBackend};

#[derive(Parser)]
#[command(name = "lettings_etl", about = "Rental-listing ETL: scrape, enrich, merge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full extract-enrich-load run against the target database
    Run {
        /// Search-results URL to start pagination from
        #[arg(long)]
        url: String,
        /// SQLite database path
        #[arg(long, default_value = "data/lettings.sqlite")]
        database: String,
        /// WebDriver endpoint driving the page source
        #[arg(long, default_value = "http://localhost:4444")]
        webdriver: String,
        /// Geocoding backend
        #[arg(long, value_enum, default_value = "google")]
        geocoder: GeocoderBackend,
        /// Disambiguating suffix appended to every address query
        #[arg(long, default_value = "London, UK")]
        area: String,
        /// Rate-watermark fallback window when the rate table is empty
        #[arg(long, default_value_t = 7)]
        lookback_days: i64,
        /// Ticker for the index-close feed
        #[arg(long, default_value = "SPY")]
        ticker: String,
    },
    /// Run a downstream mart-refresh script as one opaque unit of work
    Mart {
        #[arg(long, default_value = "data/lettings.sqlite")]
        database: String,
        /// SQL script to execute
        #[arg(long)]
        script: PathBuf,
    },
    /// Per-table row counts
    Stats {
        #[arg(long, default_value = "data/lettings.sqlite")]
        database: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            url,
            database,
            webdriver,
            geocoder,
            area,
            lookback_days,
            ticker,
        } => {
            let cfg = Config {
                search_url: url,
                database,
                webdriver_url: webdriver,
                geocoder,
                area_suffix: area,
                lookback_days,
                ticker,
            };
            let api_key = config::geocoder_api_key(cfg.geocoder)?;

            let conn = db::connect(&cfg.database)?;
            db::init_schema(&conn)?;

            // The rate provider rejects the default client agent.
            let http = reqwest::Client::builder()
                .user_agent("Mozilla")
                .build()
                .context("building HTTP client")?;
            let geocoder = enrich::build(cfg.geocoder, http.clone(), api_key);
            let mut page = webdriver::WebDriverPage::connect(&cfg.webdriver_url).await?;

            let report = pipeline::run(&cfg, &mut page, geocoder.as_ref(), &http, &conn).await?;
            println!(
                "Run complete: {} pages, {} listings; inserted {} properties, {} prices, {} rates, {} closes.",
                report.pages_scanned,
                report.listings,
                report.properties_loaded,
                report.prices_loaded,
                report.rates_loaded,
                report.closes_loaded,
            );
        }
        Commands::Mart { database, script } => {
            let conn = db::connect(&database)?;
            db::init_schema(&conn)?;
            let sql = std::fs::read_to_string(&script)
                .with_context(|| format!("reading mart script {}", script.display()))?;
            db::refresh_mart(&conn, &sql)?;
            println!("Mart refresh {} applied.", script.display());
        }
        Commands::Stats { database } => {
            let conn = db::connect(&database)?;
            db::init_schema(&conn)?;
            for table in ["property", "price", "interest_rates", "index_price"] {
                println!("{:<15} {}", table, db::table_count(&conn, table)?);
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {:.1}s", elapsed.as_secs_f64());
    }

    Ok(())
}
