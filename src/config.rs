use anyhow::Context;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GeocoderBackend {
    Google,
    VirtualEarth,
}

/// Everything one run needs. Secrets stay in the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub search_url: String,
    pub database: String,
    pub webdriver_url: String,
    pub geocoder: GeocoderBackend,
    pub area_suffix: String,
    pub lookback_days: i64,
    pub ticker: String,
}

pub fn geocoder_api_key(backend: GeocoderBackend) -> anyhow::Result<String> {
    let var = match backend {
        GeocoderBackend::Google => "GOOGLE_MAPS_API_KEY",
        GeocoderBackend::VirtualEarth => "BING_MAPS_API_KEY",
    };
    std::env::var(var).with_context(|| format!("{var} environment variable must be set"))
}
