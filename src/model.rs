use chrono::NaiveDate;
use rusqlite::types::Value;

use crate::enrich::ResolvedLocation;
use crate::error::{EtlError, Result};

const PROPERTY_ID_PREFIX: &str = "prop";
const COORDINATE_DECIMALS: i32 = 8;

/// One record as read off a results page, before any transformation.
#[derive(Debug, Clone)]
pub struct RawListing {
    pub id: String,
    pub raw_price: String,
    pub address: String,
}

/// A fully assembled listing: normalized price, resolved location.
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct Listing {
    pub id: String,
    pub price: i64,
    pub address: String,
    pub postcode: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Zip raw listings with their normalized prices and resolved locations.
/// The three inputs are parallel by construction.
pub fn assemble(
    raw: Vec<RawListing>,
    prices: Vec<i64>,
    locations: Vec<ResolvedLocation>,
) -> Vec<Listing> {
    debug_assert_eq!(raw.len(), prices.len());
    debug_assert_eq!(raw.len(), locations.len());
    raw.into_iter()
        .zip(prices)
        .zip(locations)
        .map(|((r, price), loc)| Listing {
            id: r.id,
            price,
            address: r.address,
            postcode: loc.postcode,
            latitude: loc.latitude,
            longitude: loc.longitude,
        })
        .collect()
}

/// The natural key of the property dimension: the integer remainder of
/// the listing id after the fixed `prop` prefix. Any other shape is a
/// hard extraction defect.
pub fn property_key(id: &str) -> Result<i64> {
    id.strip_prefix(PROPERTY_ID_PREFIX)
        .and_then(|rest| rest.parse().ok())
        .ok_or_else(|| {
            EtlError::MalformedData(format!(
                "listing id {id:?} is not of the form {PROPERTY_ID_PREFIX}<digits>"
            ))
        })
}

pub fn round_dp(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

// ── Load rows ──

pub fn property_rows(listings: &[Listing]) -> Result<Vec<Vec<Value>>> {
    listings
        .iter()
        .map(|l| {
            Ok(vec![
                Value::Integer(property_key(&l.id)?),
                Value::Text(l.address.clone()),
                match &l.postcode {
                    Some(p) => Value::Text(p.clone()),
                    None => Value::Null,
                },
                Value::Real(round_dp(l.latitude, COORDINATE_DECIMALS)),
                Value::Real(round_dp(l.longitude, COORDINATE_DECIMALS)),
            ])
        })
        .collect()
}

pub fn price_rows(listings: &[Listing], observed: NaiveDate) -> Result<Vec<Vec<Value>>> {
    let date = observed.format("%Y-%m-%d").to_string();
    listings
        .iter()
        .map(|l| {
            Ok(vec![
                Value::Integer(property_key(&l.id)?),
                Value::Text(date.clone()),
                Value::Integer(l.price),
            ])
        })
        .collect()
}

pub fn rate_rows(observations: &[(String, f64)]) -> Vec<Vec<Value>> {
    observations
        .iter()
        .map(|(date, rate)| vec![Value::Text(date.clone()), Value::Real(*rate)])
        .collect()
}

pub fn index_rows(date: &str, close: f64) -> Vec<Vec<Value>> {
    vec![vec![Value::Text(date.to_string()), Value::Real(close)]]
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, lat: f64, lon: f64) -> Listing {
        Listing {
            id: id.to_string(),
            price: 1200,
            address: "1 Test Street".to_string(),
            postcode: Some("SW1A 1AA".to_string()),
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn property_key_strips_prefix() {
        assert_eq!(property_key("prop123").unwrap(), 123);
        assert_eq!(property_key("prop1").unwrap(), 1);
    }

    #[test]
    fn property_key_rejects_other_shapes() {
        for bad in ["house123", "prop", "propx1", "123", ""] {
            assert!(matches!(
                property_key(bad),
                Err(EtlError::MalformedData(_))
            ));
        }
    }

    #[test]
    fn coordinates_round_to_eight_decimals() {
        let rows = property_rows(&[listing("prop1", 51.507222224, -0.127700009)]).unwrap();
        assert_eq!(rows[0][3], Value::Real(51.50722222));
        assert_eq!(rows[0][4], Value::Real(-0.12770001));
    }

    #[test]
    fn missing_postcode_becomes_null() {
        let mut l = listing("prop7", 51.5, -0.1);
        l.postcode = None;
        let rows = property_rows(&[l]).unwrap();
        assert_eq!(rows[0][2], Value::Null);
    }

    #[test]
    fn price_rows_carry_the_run_date() {
        let date = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        let rows = price_rows(&[listing("prop42", 51.5, -0.1)], date).unwrap();
        assert_eq!(
            rows[0],
            vec![
                Value::Integer(42),
                Value::Text("2023-08-01".to_string()),
                Value::Integer(1200),
            ]
        );
    }

    #[test]
    fn bad_id_fails_row_assembly() {
        let l = listing("flat9", 51.5, -0.1);
        assert!(property_rows(&[l.clone()]).is_err());
        let date = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        assert!(price_rows(&[l], date).is_err());
    }
}
