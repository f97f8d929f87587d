use crate::error::{EtlError, Result};

// Listing prices arrive as `£1,200pcm`: one currency char in front, a
// fixed unit suffix behind. Counted in chars, not bytes (`£` is two bytes).
const CURRENCY_PREFIX_CHARS: usize = 1;
const UNIT_SUFFIX_CHARS: usize = 3;
const THOUSANDS_SEPARATOR: char = ',';

/// Strip the currency prefix and unit suffix, drop thousands separators,
/// and parse the remainder as integer currency units. Any fractional part
/// is truncated away, not rounded.
pub fn normalize_price(raw: &str) -> Result<i64> {
    let total = raw.chars().count();
    if total <= CURRENCY_PREFIX_CHARS + UNIT_SUFFIX_CHARS {
        return Err(EtlError::MalformedData(format!(
            "price {raw:?} is too short to carry a value"
        )));
    }

    let residual: String = raw
        .chars()
        .skip(CURRENCY_PREFIX_CHARS)
        .take(total - CURRENCY_PREFIX_CHARS - UNIT_SUFFIX_CHARS)
        .filter(|c| *c != THOUSANDS_SEPARATOR)
        .collect();
    let integral = match residual.split_once('.') {
        Some((whole, _fraction)) => whole,
        None => residual.as_str(),
    };

    integral.trim().parse().map_err(|_| {
        EtlError::MalformedData(format!("price {raw:?} does not parse as an integer"))
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_are_removed() {
        assert_eq!(normalize_price("£1,200pcm").unwrap(), 1200);
        assert_eq!(normalize_price("£12,345pcm").unwrap(), 12345);
        assert_eq!(normalize_price("£950pcm").unwrap(), 950);
    }

    #[test]
    fn whitespace_around_the_value_is_tolerated() {
        assert_eq!(normalize_price("£1,200 pcm").unwrap(), 1200);
    }

    #[test]
    fn fractional_part_is_truncated() {
        assert_eq!(normalize_price("£1,200.99pcm").unwrap(), 1200);
    }

    #[test]
    fn too_short_is_malformed() {
        for bad in ["", "£", "£pcm", "pcm"] {
            assert!(matches!(
                normalize_price(bad),
                Err(EtlError::MalformedData(_))
            ));
        }
    }

    #[test]
    fn non_numeric_residual_is_malformed() {
        assert!(matches!(
            normalize_price("£POApcm"),
            Err(EtlError::MalformedData(_))
        ));
    }
}
