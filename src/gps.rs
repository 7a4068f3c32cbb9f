//! Positions: decimal degrees from the upstream free-text field, and the
//! degrees/minutes/seconds breakdown the duty database stores.

use serde::de::{Deserializer, Error as DeError};
use serde::Deserialize;
use serde_json::Value;

/// A position in signed decimal degrees. `(0, 0)` is the zero value and means
/// "no position".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gps {
    pub lat: f64,
    pub long: f64,
}

impl Gps {
    pub fn new(lat: f64, long: f64) -> Self {
        Gps { lat, long }
    }

    pub fn is_zero(&self) -> bool {
        self.lat == 0.0 && self.long == 0.0
    }

    pub fn as_dms(&self) -> (Dms, Dms) {
        (dms_from_dd(self.lat), dms_from_dd(self.long))
    }

    /// Parse the upstream position text: two floats separated by a comma,
    /// colon or whitespace, possibly wrapped in another layer of quotes.
    /// A lone `0` means "no position".
    pub fn parse(raw: &str) -> Result<Gps, String> {
        let mut raw = raw.trim();
        let unquoted;
        if raw.starts_with('"') || raw.starts_with('\'') {
            unquoted = unquote(raw);
            raw = unquoted.trim();
        }
        if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
            return Ok(Gps::default());
        }

        let floats = pull_floats(raw);
        if floats.len() == 1 && floats[0] == 0.0 {
            return Ok(Gps::default());
        }
        if floats.len() != 2 {
            return Err(format!(
                "expected exactly 2 numbers, got {} from '{raw}'",
                floats.len()
            ));
        }
        if floats[0].abs() > 90.0 || floats[1].abs() > 180.0 {
            return Err(format!(
                "position out of range ({}, {})",
                floats[0], floats[1]
            ));
        }
        Ok(Gps::new(floats[0], floats[1]))
    }
}

impl<'de> Deserialize<'de> for Gps {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(Gps::default()),
            Value::String(s) => Gps::parse(&s).map_err(DeError::custom),
            Value::Number(n) if n.as_f64() == Some(0.0) => Ok(Gps::default()),
            other => Err(DeError::custom(format!("not a position: {other}"))),
        }
    }
}

/// One axis in degrees, minutes and decimal seconds. The hemisphere carries
/// the sign: true is north or east, false is south or west.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dms {
    pub hemisphere: bool,
    pub deg: i64,
    pub min: i64,
    pub sec: f64,
}

/// Split a decimal-degrees value into its DMS parts.
pub fn dms_from_dd(dd: f64) -> Dms {
    let abs = dd.abs();
    let deg = abs.trunc();
    let minutes = (abs - deg) * 60.0;
    let min = minutes.trunc();
    Dms {
        hemisphere: dd >= 0.0,
        deg: deg as i64,
        min: min as i64,
        sec: (minutes - min) * 60.0,
    }
}

/// Strip one layer of surrounding quotes and unescape embedded ones.
fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
        .unwrap_or(raw);
    inner.replace("\\\"", "\"")
}

/// Split on commas, then colons, then whitespace, keeping every token that
/// parses as a float.
fn pull_floats(raw: &str) -> Vec<f64> {
    let pieces: Vec<&str> = if raw.contains(',') {
        raw.split(',').collect()
    } else if raw.contains(':') {
        raw.split(':').collect()
    } else {
        raw.split_whitespace().collect()
    };
    pieces
        .iter()
        .filter_map(|p| {
            let token = p.trim().trim_matches('"');
            if token.is_empty() {
                None
            } else {
                token.parse::<f64>().ok()
            }
        })
        .collect()
}
