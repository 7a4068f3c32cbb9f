//! Scalar coercions from the upstream JSON.
//!
//! TripWatch is loose about types: numbers arrive inside strings, booleans as
//! words, lists as doubly-encoded JSON, lengths with unit suffixes. Each type
//! here decodes one such quirk into the canonical value the duty database
//! expects. A lexically invalid token is a decode error; `null` or an empty
//! token always yields the zero value.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{Deserializer, Error as DeError};
use serde::Deserialize;
use serde_json::Value;

use crate::store::SqlValue;

/// Deserialize a string field treating JSON `null` as empty.
pub fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Deserialize an integer field treating JSON `null` as zero.
pub fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(d)?.unwrap_or(0))
}

/// Timestamp accepted in either RFC3339 or `YYYY-MM-DD HH:MM:SS` form.
///
/// The zero value (`None`) marks the field as absent; it is suppressed on
/// write and rejected as a match key.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlexibleTime(pub Option<DateTime<Utc>>);

impl FlexibleTime {
    pub fn from_utc(ts: DateTime<Utc>) -> Self {
        FlexibleTime(Some(ts))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    pub fn to_sql(&self) -> SqlValue {
        match self.0 {
            Some(ts) => SqlValue::Timestamp(ts),
            None => SqlValue::Null,
        }
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

impl fmt::Display for FlexibleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S UTC")),
            None => write!(f, "unset"),
        }
    }
}

impl<'de> Deserialize<'de> for FlexibleTime {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(FlexibleTime(None)),
            Value::String(s) => {
                let raw = s.trim();
                if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
                    return Ok(FlexibleTime(None));
                }
                FlexibleTime::parse(raw)
                    .map(|ts| FlexibleTime(Some(ts)))
                    .ok_or_else(|| DeError::custom(format!("unparseable timestamp '{raw}'")))
            }
            other => Err(DeError::custom(format!("timestamp is not a string: {other}"))),
        }
    }
}

/// Floating-point number, possibly wrapped in a string.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumericString(pub f32);

impl NumericString {
    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Float(f64::from(self.0))
    }
}

impl<'de> Deserialize<'de> for NumericString {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(NumericString(0.0)),
            Value::Number(n) => Ok(NumericString(n.as_f64().unwrap_or(0.0) as f32)),
            Value::String(s) => {
                let raw = s.trim().trim_matches('"');
                if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
                    return Ok(NumericString(0.0));
                }
                raw.parse::<f32>()
                    .map(NumericString)
                    .map_err(|e| DeError::custom(format!("numeric string '{raw}': {e}")))
            }
            other => Err(DeError::custom(format!("not a number: {other}"))),
        }
    }
}

/// Boolean stored as the single characters the duty database uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlexibleBool(pub String);

impl FlexibleBool {
    pub fn yes() -> Self {
        FlexibleBool("Y".to_string())
    }

    pub fn no() -> Self {
        FlexibleBool("N".to_string())
    }

    pub fn from_bool(b: bool) -> Self {
        if b {
            Self::yes()
        } else {
            Self::no()
        }
    }

    pub fn as_bool(&self) -> bool {
        self.0 == "Y"
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }
}

impl<'de> Deserialize<'de> for FlexibleBool {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(FlexibleBool::no()),
            Value::Bool(b) => Ok(FlexibleBool::from_bool(b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "" | "null" | "false" | "no" | "n" => Ok(FlexibleBool::no()),
                "true" | "yes" | "y" => Ok(FlexibleBool::yes()),
                other => Err(DeError::custom(format!("boolean token '{other}'"))),
            },
            other => Err(DeError::custom(format!("not a boolean: {other}"))),
        }
    }
}

/// Vessel length bucketed into the bands the duty database enumerates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LengthBand(pub String);

impl LengthBand {
    const FT_CONV_FACTOR: f64 = 0.3048;

    /// Band for a length in metres. The 4.5 m boundary belongs to the
    /// smallest band.
    pub fn from_metres(len: f64) -> Self {
        let band = if len <= 4.5 {
            "<4.5m"
        } else if len < 8.0 {
            "4.5m - 8m"
        } else if len < 10.0 {
            "8m - 10m"
        } else if len < 15.0 {
            "10m - 15m"
        } else if len < 25.0 {
            "15m - 25m"
        } else {
            "25m +"
        };
        LengthBand(band.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }
}

impl<'de> Deserialize<'de> for LengthBand {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(LengthBand::default()),
            Value::Number(n) => Ok(LengthBand::from_metres(n.as_f64().unwrap_or(0.0))),
            Value::String(s) => {
                let raw = s.trim().trim_matches('"');
                if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
                    return Ok(LengthBand::default());
                }
                let is_feet = raw.ends_with('\'') || raw.ends_with('\u{2019}') || raw.ends_with('f');
                let trimmed = raw.trim_end_matches(['m', 'f', '\'', '\u{2019}', ' ']);
                let val = trimmed
                    .parse::<f64>()
                    .map_err(|e| DeError::custom(format!("length '{raw}': {e}")))?;
                let metres = if is_feet { val * Self::FT_CONV_FACTOR } else { val };
                Ok(LengthBand::from_metres(metres))
            }
            other => Err(DeError::custom(format!("not a length: {other}"))),
        }
    }
}

/// Wind speed bucketed into the three bands the duty database enumerates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindSpeedBand(pub String);

impl WindSpeedBand {
    pub fn from_knots(knots: f64) -> Self {
        let band = match knots as i64 {
            k if k < 10 => "0 - 10 knots",
            k if k <= 20 => "10 - 20 knots",
            _ => "20+ knots",
        };
        WindSpeedBand(band.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }
}

impl<'de> Deserialize<'de> for WindSpeedBand {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(WindSpeedBand::default()),
            Value::Number(n) => Ok(WindSpeedBand::from_knots(n.as_f64().unwrap_or(0.0))),
            other => Err(DeError::custom(format!("not a wind speed: {other}"))),
        }
    }
}

/// Compass direction reduced to the eight points the duty database stores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindDirection(pub String);

impl WindDirection {
    pub fn from_word(raw: &str) -> Self {
        let dir = match raw.trim().to_ascii_lowercase().as_str() {
            "south" | "s" => "S",
            "south-east" | "south east" | "se" => "SE",
            "east" | "e" => "E",
            "north-east" | "north east" | "ne" => "NE",
            "north" | "n" => "N",
            "north-west" | "north west" | "nw" => "NW",
            "west" | "w" => "W",
            "south-west" | "south west" | "sw" => "SW",
            // Legacy default carried over from the duty database UI.
            _ => "> 20kt",
        };
        WindDirection(dir.to_string())
    }

    pub fn from_point(point: &str) -> Self {
        WindDirection(point.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }
}

impl<'de> Deserialize<'de> for WindDirection {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(WindDirection::default()),
            Value::String(s) => Ok(WindDirection::from_word(&s)),
            other => Err(DeError::custom(format!("not a direction: {other}"))),
        }
    }
}

/// Sea state id reduced to the three labels the duty database stores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeaState(pub String);

impl SeaState {
    pub fn from_id(id: i64) -> Self {
        let label = match id {
            i if i <= 3 => "Calm",
            4 | 5 => "Moderate",
            _ => "Rough",
        };
        SeaState(label.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }
}

impl<'de> Deserialize<'de> for SeaState {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(SeaState::default()),
            Value::Number(n) => n
                .as_i64()
                .map(SeaState::from_id)
                .ok_or_else(|| DeError::custom(format!("sea state id {n} is not an integer"))),
            other => Err(DeError::custom(format!("not a sea state: {other}"))),
        }
    }
}

/// Activation type mapped onto the duty database's category names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobType(pub String);

impl JobType {
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }

    /// Default action taken when the activation carries none.
    pub fn to_action(&self) -> JobAction {
        let action = match self.0.as_str() {
            "Training/Patrol" => "Training",
            "Medical" => "Medivac",
            _ => "Other",
        };
        JobAction(action.to_string())
    }
}

impl<'de> Deserialize<'de> for JobType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        let mapped = match raw.as_str() {
            "Medivac" => "Medical",
            "SAR" => "Search",
            "Assist" => "Breakdown",
            "Training" => "Training/Patrol",
            "Scattering of Ashes" => "Dispersal",
            "Public Service" => "PR/Promo",
            "MAYDAY" | "PANPAN" => "EPIRB",
            other => other,
        };
        Ok(JobType(mapped.to_string()))
    }
}

/// Free-text action requested, reduced by substring match to the action
/// taxonomy of the duty database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobAction(pub String);

impl JobAction {
    pub fn from_text(raw: &str) -> Self {
        let lowered = raw.to_ascii_lowercase();
        let action = if lowered.contains("jump") {
            "Jump Start"
        } else if lowered.contains("medivac")
            || lowered.contains("medevac")
            || lowered.contains("medical")
        {
            "Medivac"
        } else if lowered.contains("nil") {
            "Nil"
        } else if lowered.contains("pump") {
            "Pump Out"
        } else if lowered.contains("search") || lowered.contains("sar") {
            "Search & Rescue"
        } else if lowered.contains("fuel") {
            "Supplied Fuel"
        } else if lowered.contains("tow") {
            "Tow"
        } else if lowered.contains("train") {
            "Training"
        } else if lowered.contains("unground") {
            "Ungrounded"
        } else if lowered.contains("investigate") {
            "Investigate"
        } else {
            "Other"
        };
        JobAction(action.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }
}

impl<'de> Deserialize<'de> for JobAction {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        if raw.is_empty() {
            return Ok(JobAction::default());
        }
        Ok(JobAction::from_text(&raw))
    }
}

/// Water limits classification letter mapped to its label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaterLimits(pub String);

impl WaterLimits {
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }
}

impl<'de> Deserialize<'de> for WaterLimits {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        let label = match raw.as_str() {
            "A" | "B" | "C" => "Open",
            "D" => "Partially Smooth",
            "E" => "Smooth",
            _ => "",
        };
        Ok(WaterLimits(label.to_string()))
    }
}

/// Rescue vessel callsign normalised to its display name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VesselName(pub String);

impl VesselName {
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }
}

impl<'de> Deserialize<'de> for VesselName {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        if let Some(number) = raw.strip_prefix("MARINERESCUE") {
            if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) {
                return Ok(VesselName(format!("Marine Rescue {number}")));
            }
        }
        Ok(VesselName(raw))
    }
}

/// Assisted vessel's hull type, reduced by substring match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoatType(pub String);

impl BoatType {
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }
}

impl<'de> Deserialize<'de> for BoatType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        let lowered = raw.to_ascii_lowercase();
        let label = if lowered.contains("jet ski") || lowered.contains("jetski") {
            "PWC"
        } else if lowered.contains("yacht")
            || lowered.contains("sail")
            || lowered.contains("ketch")
            || lowered.contains("schooner")
        {
            "Sailing"
        } else if lowered.contains("kayak") || lowered.contains("paddle") {
            "Paddle"
        } else if !lowered.is_empty() {
            "Speed/Motor Boat"
        } else {
            ""
        };
        Ok(BoatType(label.to_string()))
    }
}

/// Assisted vessel's propulsion, reduced by substring match. The engine
/// quantity prefix is fixed up later once the quantity field is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Propulsion(pub String);

impl Propulsion {
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }

    /// Rewrite the Single/Twin prefix from the reported engine quantity.
    /// Propulsions without engines are left alone.
    pub fn apply_engine_qty(&mut self, qty: i64) {
        let suffix = if self.0.contains("Outboard") {
            "Outboard"
        } else if self.0.contains("Inboard") {
            "Inboard"
        } else {
            return;
        };
        self.0 = if qty == 1 {
            format!("Single {suffix}")
        } else {
            format!("Twin {suffix}s")
        };
    }
}

impl<'de> Deserialize<'de> for Propulsion {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        let lowered = raw.to_ascii_lowercase();
        if lowered.trim().is_empty() {
            return Ok(Propulsion::default());
        }
        let label = if lowered.contains("outboard") {
            "Single Outboard"
        } else if lowered.contains("inboard") {
            "Single Inboard"
        } else if lowered.contains("paddle") || lowered.contains("oar") {
            "Oars"
        } else if lowered.contains("wind") || lowered.contains("sail") {
            "Sail"
        } else {
            "Single Outboard"
        };
        Ok(Propulsion(label.to_string()))
    }
}

/// How the activation reached the unit, reduced to the three sources the
/// duty database recognises.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSource(pub String);

impl JobSource {
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sql(&self) -> SqlValue {
        SqlValue::Text(self.0.clone())
    }

    /// Contact frequency implied by the source. Unrecognised sources imply
    /// nothing, leaving any pre-filled value in place.
    pub fn to_frequency(&self) -> &'static str {
        match self.0.as_str() {
            "QAS" | "Police" => "Telephone",
            "Base" => "Unit Counter Inquiry",
            _ => "",
        }
    }
}

impl<'de> Deserialize<'de> for JobSource {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        let label = match raw.as_str() {
            "Water Police" | "Land Police" => "Police",
            "Ambulance Service" => "QAS",
            _ => "Base",
        };
        Ok(JobSource(label.to_string()))
    }
}

/// A JSON string list, possibly encoded as a string containing a JSON list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringList(pub Vec<String>);

impl StringList {
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn has(&self, entry: &str) -> bool {
        self.0.iter().any(|e| e == entry)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(StringList::default()),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => out.push(s),
                        other => {
                            return Err(DeError::custom(format!(
                                "list entry is not a string: {other}"
                            )))
                        }
                    }
                }
                Ok(StringList(out))
            }
            Value::String(s) => {
                let raw = s.trim();
                if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
                    return Ok(StringList::default());
                }
                serde_json::from_str::<Vec<String>>(raw)
                    .map(StringList)
                    .map_err(|e| DeError::custom(format!("nested list '{raw}': {e}")))
            }
            other => Err(DeError::custom(format!("not a list: {other}"))),
        }
    }
}
