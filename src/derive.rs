//! Aggregate-level derivations.
//!
//! Fields the duty database wants but TripWatch does not carry directly:
//! flags folded from other fields, wind and rain parsed out of the forecast
//! text, the position chosen from the situation reports, and the category
//! defaults that operators expect pre-filled.

use tracing::debug;

use crate::coerce::{FlexibleBool, JobSource, WindDirection, WindSpeedBand};
use crate::errors::LinkError;
use crate::gps::Gps;
use crate::models::{Activation, DmsPosition, Job, Sitrep, Weather};

/// Provenance marker prepended to the long comment so operators can tell
/// synchronised notes from hand-written ones.
pub const COMMENT_PROVENANCE_PREFIX: &str = "[Log entry maintained by TripWatch]\n";

const FORECAST_MARKER: &str = "Gold Coast Waters:";

/// Sitrep comment prefixes that pin the job position, in preference order.
const ARRIVED_PREFIX: &str = "RV has arrived at target";
const TOW_PREFIX: &str = "Target vessel in tow";

/// Wind directions are matched most-specific first so that e.g.
/// "southeasterly" is not claimed by "easterly".
const WIND_DIRECTIONS: [(&str, &str); 8] = [
    ("southeasterly", "SE"),
    ("southerly", "S"),
    ("southwesterly", "SW"),
    ("westerly", "W"),
    ("northwesterly", "NW"),
    ("northerly", "N"),
    ("northeasterly", "NE"),
    ("easterly", "E"),
];

/// Run every derivation. Called once per activation, after decode and before
/// extraction.
pub fn apply(activation: &mut Activation) -> Result<(), LinkError> {
    let job = &mut activation.job;
    job.emergency.flag = job.emergency.notified.clone();
    job.commercial = FlexibleBool::from_bool(job.assisted.rego.ends_with('C'));
    derive_weather(&mut job.weather)?;
    job.dms = choose_position(&activation.sitreps, &job.pos);
    job.assisted
        .propulsion
        .apply_engine_qty(job.assisted.engine_qty);
    derive_categories(job);
    prefix_comments(job);
    Ok(())
}

/// Parse wind and rain out of the forecast text. An empty forecast is a
/// no-op; a forecast without the local-waters marker is rejected. Lines
/// without the wanted headings are skipped.
fn derive_weather(weather: &mut Weather) -> Result<(), LinkError> {
    let forecast = weather.forecast.trim();
    if forecast.is_empty() {
        return Ok(());
    }
    let Some(at) = forecast.find(FORECAST_MARKER) else {
        return Err(LinkError::bad_input(
            "forecast",
            format!("marker '{FORECAST_MARKER}' not found"),
        ));
    };
    let local = &forecast[at + FORECAST_MARKER.len()..];

    for line in local.lines() {
        let line = line.trim().to_ascii_lowercase();
        if line.contains("winds:") {
            for (needle, point) in WIND_DIRECTIONS {
                if line.contains(needle) {
                    weather.wind_dir = WindDirection::from_point(point);
                    break;
                }
            }
            if let Some(knots) = knots_before_unit(&line) {
                weather.wind_speed = WindSpeedBand::from_knots(knots);
            }
        } else if line.contains("weather:") {
            weather.rain_state = if line.contains("sunny") || line.contains("partly cloudy") {
                "Clear".to_string()
            } else {
                "Rain".to_string()
            };
        }
    }
    Ok(())
}

/// Last numeric token before the word "knots", i.e. the top of a
/// "15 to 20 knots" range.
fn knots_before_unit(line: &str) -> Option<f64> {
    let at = line.find("knots")?;
    line[..at]
        .split_whitespace()
        .filter_map(|token| token.parse::<f64>().ok())
        .last()
}

/// Pick the position to store: a sitrep announcing arrival at the target,
/// else one announcing the tow, else the first sitrep, else the job's raw
/// position. Zero positions are never chosen.
fn choose_position(sitreps: &[Sitrep], job_pos: &Gps) -> DmsPosition {
    let chosen = sitrep_for_comment(sitreps, ARRIVED_PREFIX)
        .or_else(|| sitrep_for_comment(sitreps, TOW_PREFIX))
        .map(|sr| sr.pos)
        .or_else(|| sitreps.first().map(|sr| sr.pos))
        .filter(|pos| !pos.is_zero())
        .or_else(|| (!job_pos.is_zero()).then_some(*job_pos));

    let Some(pos) = chosen else {
        return DmsPosition::default();
    };
    let (lat, long) = pos.as_dms();
    DmsPosition {
        lat: pos.lat,
        long: pos.long,
        lat_d: lat.deg,
        lat_m: lat.min,
        lat_s: lat.sec,
        long_d: long.deg,
        long_m: long.min,
        long_s: long.sec,
    }
}

fn sitrep_for_comment<'a>(sitreps: &'a [Sitrep], prefix: &str) -> Option<&'a Sitrep> {
    sitreps
        .iter()
        .find(|sr| sr.comment.starts_with(prefix) && !sr.pos.is_zero())
}

/// Fill category fields operators expect: an action defaulted from the job
/// type, and the activation source and contact frequency implied by it.
fn derive_categories(job: &mut Job) {
    if (job.action.is_zero() || job.action.0 == "Other") && !job.job_type.is_zero() {
        job.action = job.job_type.to_action();
        debug!(job_type = %job.job_type.0, action = %job.action.0, "defaulted action from type");
    }
    match job.job_type.0.as_str() {
        "Training/Patrol" => {
            job.activated_by = JobSource("Base".to_string());
            job.freq = "Unit Counter Inquiry".to_string();
        }
        "Medical" => {
            job.activated_by = JobSource("QAS".to_string());
            job.freq = "Telephone".to_string();
        }
        _ => {}
    }
    if job.freq.is_empty() {
        job.freq = job.activated_by.to_frequency().to_string();
    }
}

/// Mark the long comment as machine-maintained. An empty comment stays empty
/// so a hand-written one in the database is not clobbered.
fn prefix_comments(job: &mut Job) {
    if !job.comments.is_empty() && !job.comments.starts_with(COMMENT_PROVENANCE_PREFIX) {
        job.comments = format!("{COMMENT_PROVENANCE_PREFIX}{}", job.comments);
    }
}
