use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::info;

use crate::config::GeocoderBackend;
use crate::error::{EtlError, Result};
use crate::model::RawListing;

/// What every geocoding backend must produce for one address. A missing
/// postcode is legitimate absence; missing coordinates are not.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub postcode: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

#[async_trait]
pub trait Geocoder {
    fn name(&self) -> &'static str;
    async fn resolve(&self, address: &str) -> Result<ResolvedLocation>;
}

pub fn build(
    backend: GeocoderBackend,
    client: reqwest::Client,
    api_key: String,
) -> Box<dyn Geocoder> {
    match backend {
        GeocoderBackend::Google => Box::new(GoogleGeocoder { client, api_key }),
        GeocoderBackend::VirtualEarth => Box::new(VirtualEarthGeocoder { client, api_key }),
    }
}

/// Resolve every listing's address, strictly one call at a time. Any
/// failed call aborts the whole pass; the output is parallel to the
/// input in length and order.
pub async fn resolve_all(
    geocoder: &dyn Geocoder,
    listings: &[RawListing],
    area_suffix: &str,
) -> Result<Vec<ResolvedLocation>> {
    info!(
        "Resolving {} addresses via the {} geocoder",
        listings.len(),
        geocoder.name()
    );
    let pb = ProgressBar::new(listings.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len}")
            .unwrap()
            .progress_chars("=> "),
    );

    let mut locations = Vec::with_capacity(listings.len());
    for listing in listings {
        let query = format!("{}, {}", listing.address, area_suffix);
        locations.push(geocoder.resolve(&query).await?);
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(locations)
}

async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EtlError::Network(format!("geocoder responded {status}")));
    }
    Ok(response.text().await?)
}

// ── Google ──

const GOOGLE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const POSTAL_CODE_TYPE: &str = "postal_code";

pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Deserialize)]
struct GoogleResult {
    #[serde(default)]
    address_components: Vec<GoogleComponent>,
    geometry: GoogleGeometry,
}

#[derive(Deserialize)]
struct GoogleComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Deserialize)]
struct GoogleGeometry {
    location: GoogleLatLng,
}

#[derive(Deserialize)]
struct GoogleLatLng {
    lat: f64,
    lng: f64,
}

/// Postcode comes from the typed component list; its absence is an
/// optional field, not an error. Coordinates are required.
fn from_google(body: &str) -> Result<ResolvedLocation> {
    let parsed: GoogleResponse = serde_json::from_str(body)?;
    let first = parsed.results.into_iter().next().ok_or_else(|| {
        EtlError::MalformedData("geocoder returned no results".to_string())
    })?;
    let postcode = first
        .address_components
        .iter()
        .find(|c| c.types.iter().any(|t| t.contains(POSTAL_CODE_TYPE)))
        .map(|c| c.long_name.clone());
    Ok(ResolvedLocation {
        postcode,
        latitude: first.geometry.location.lat,
        longitude: first.geometry.location.lng,
    })
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn resolve(&self, address: &str) -> Result<ResolvedLocation> {
        let url = format!(
            "{GOOGLE_ENDPOINT}?address={}&key={}",
            urlencoding::encode(address),
            self.api_key
        );
        from_google(&fetch_body(&self.client, &url).await?)
    }
}

// ── Virtual Earth ──

const VIRTUAL_EARTH_ENDPOINT: &str = "https://dev.virtualearth.net/REST/v1/Locations";

pub struct VirtualEarthGeocoder {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VirtualEarthResponse {
    #[serde(default)]
    resource_sets: Vec<VirtualEarthResourceSet>,
}

#[derive(Deserialize)]
struct VirtualEarthResourceSet {
    #[serde(default)]
    resources: Vec<VirtualEarthResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VirtualEarthResource {
    #[serde(default)]
    address: VirtualEarthAddress,
    geocode_points: Vec<VirtualEarthPoint>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct VirtualEarthAddress {
    postal_code: Option<String>,
}

#[derive(Deserialize)]
struct VirtualEarthPoint {
    coordinates: Vec<f64>,
}

/// Postcode comes from an optional key on the resource address; its
/// absence maps to `None`. The first geocode point is required.
fn from_virtual_earth(body: &str) -> Result<ResolvedLocation> {
    let parsed: VirtualEarthResponse = serde_json::from_str(body)?;
    let resource = parsed
        .resource_sets
        .into_iter()
        .next()
        .and_then(|set| set.resources.into_iter().next())
        .ok_or_else(|| {
            EtlError::MalformedData("geocoder returned no resources".to_string())
        })?;
    let point = resource
        .geocode_points
        .into_iter()
        .next()
        .ok_or_else(|| {
            EtlError::MalformedData("geocoder result has no geocode points".to_string())
        })?;
    let (latitude, longitude) = match point.coordinates.as_slice() {
        [lat, lon, ..] => (*lat, *lon),
        _ => {
            return Err(EtlError::MalformedData(
                "geocoder coordinates are incomplete".to_string(),
            ))
        }
    };
    Ok(ResolvedLocation {
        postcode: resource.address.postal_code,
        latitude,
        longitude,
    })
}

#[async_trait]
impl Geocoder for VirtualEarthGeocoder {
    fn name(&self) -> &'static str {
        "virtual-earth"
    }

    async fn resolve(&self, address: &str) -> Result<ResolvedLocation> {
        let url = format!(
            "{VIRTUAL_EARTH_ENDPOINT}?q={}&key={}",
            urlencoding::encode(address),
            self.api_key
        );
        from_virtual_earth(&fetch_body(&self.client, &url).await?)
    }
}

// ── Tests ──
