//! The activation aggregate.
//!
//! One activation is a single marine-rescue job as TripWatch models it. The
//! upstream payload is flat, so the nested groups below all deserialize with
//! `flatten` against the upstream field names. Fields without a serde rename
//! are derived locally before the aggregate is written out; the schema in
//! [`crate::schema`] decides which fields reach which table.

use serde::Deserialize;

use crate::coerce::{
    lenient_i64, lenient_string, BoatType, FlexibleBool, FlexibleTime, JobAction, JobSource,
    JobType, LengthBand, NumericString, Propulsion, SeaState, StringList, VesselName, WaterLimits,
    WindDirection, WindSpeedBand,
};
use crate::gps::Gps;

/// Upstream status value that excludes an activation from synchronisation.
pub const STATUS_CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Activation {
    pub id: i64,
    #[serde(rename = "created_at")]
    pub created: FlexibleTime,
    #[serde(rename = "updated_at")]
    pub updated: FlexibleTime,
    #[serde(flatten)]
    pub job: Job,
    pub sitreps: Vec<Sitrep>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Job {
    /// Duty roster the job attaches to; resolved against the duty log before
    /// the write, then bound into the roster sequence column.
    #[serde(skip)]
    pub duty_log_id: i64,
    /// The job's own sequence number; zero until the row exists.
    #[serde(skip)]
    pub id: i64,
    #[serde(rename = "activationsstatus", deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(rename = "activationsrvdeparttime")]
    pub start_time: FlexibleTime,
    #[serde(rename = "activationsrvreturntime")]
    pub end_time: FlexibleTime,
    #[serde(rename = "activationstype")]
    pub job_type: JobType,
    #[serde(rename = "activationsdvactionrequested")]
    pub action: JobAction,
    #[serde(rename = "activationspurpose", deserialize_with = "lenient_string")]
    pub purpose: String,
    #[serde(rename = "activationscomments", deserialize_with = "lenient_string")]
    pub comments: String,
    #[serde(rename = "activationsdonationreceived")]
    pub donation: NumericString,
    #[serde(rename = "activationsoperationsareaclassification")]
    pub water_limits: WaterLimits,
    #[serde(rename = "activationsobservedseastate")]
    pub sea_state: SeaState,
    #[serde(skip)]
    pub commercial: FlexibleBool,
    #[serde(rename = "activationsposition")]
    pub pos: Gps,
    #[serde(rename = "activationssource")]
    pub activated_by: JobSource,
    #[serde(skip)]
    pub freq: String,
    #[serde(rename = "activationsdonationreceiptnumber")]
    pub assist_num: NumericString,
    #[serde(flatten)]
    pub vessel: RescueVessel,
    #[serde(flatten)]
    pub assisted: AssistedVessel,
    #[serde(flatten)]
    pub emergency: Emergency,
    #[serde(flatten)]
    pub weather: Weather,
    #[serde(skip)]
    pub dms: DmsPosition,
}

/// The rescue vessel that ran the job.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RescueVessel {
    #[serde(rename = "activationsrvsequence", deserialize_with = "lenient_i64")]
    pub id: i64,
    #[serde(rename = "activationsrvvessel")]
    pub name: VesselName,
    #[serde(rename = "activationsrvenginehours1start")]
    pub start_hours_port: NumericString,
    #[serde(rename = "activationsrvenginehours2start")]
    pub start_hours_stbd: NumericString,
    #[serde(rename = "activationsrvenginehours1end")]
    pub end_hours_port: NumericString,
    #[serde(rename = "activationsrvenginehours2end")]
    pub end_hours_stbd: NumericString,
    #[serde(rename = "activationsrvmaster", deserialize_with = "lenient_string")]
    pub master: String,
    #[serde(rename = "activationsrvcrew")]
    pub crew_list: StringList,
}

/// The vessel that was assisted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssistedVessel {
    #[serde(rename = "activationsdvvesselsregistration", deserialize_with = "lenient_string")]
    pub rego: String,
    #[serde(rename = "activationsdvvesselsname", deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "activationsdvvesselslength")]
    pub length: LengthBand,
    #[serde(rename = "activationsdvvesselstype")]
    pub boat_type: BoatType,
    #[serde(rename = "activationsdvvesselsenginetype")]
    pub propulsion: Propulsion,
    #[serde(rename = "activationsdvvesselsenginequantity", deserialize_with = "lenient_i64")]
    pub engine_qty: i64,
    #[serde(rename = "activationsdvpobadult", deserialize_with = "lenient_i64")]
    pub num_adults: i64,
    #[serde(rename = "activationsdvpobchildren", deserialize_with = "lenient_i64")]
    pub num_kids: i64,
    #[serde(rename = "activationsdvcontactnumber")]
    pub phone: NumericString,
    #[serde(rename = "activationsdvradiochannel")]
    pub radio_chan: NumericString,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Emergency {
    /// Derived from `notified` before the write.
    #[serde(skip)]
    pub flag: FlexibleBool,
    #[serde(rename = "activationspoliceincidentnumber", deserialize_with = "lenient_string")]
    pub police_num: String,
    #[serde(rename = "activationspolicenotified")]
    pub notified: FlexibleBool,
    #[serde(rename = "activationspolicenotifiedcontact", deserialize_with = "lenient_string")]
    pub police_name: String,
    #[serde(rename = "activationspolicenotifiedtime")]
    pub time: FlexibleTime,
    #[serde(rename = "activationsqasattending")]
    pub agencies: StringList,
}

/// Weather at the time of the job. The banded fields are parsed out of the
/// forecast text, not taken from upstream fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Weather {
    #[serde(rename = "activationsactivationweatherforecast", deserialize_with = "lenient_string")]
    pub forecast: String,
    #[serde(skip)]
    pub wind_speed: WindSpeedBand,
    #[serde(skip)]
    pub wind_dir: WindDirection,
    #[serde(skip)]
    pub rain_state: String,
}

/// Chosen position broken down the way the duty database stores it: decimal
/// degrees plus unsigned degree/minute/second components.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DmsPosition {
    pub lat: f64,
    pub long: f64,
    pub lat_d: i64,
    pub lat_m: i64,
    pub lat_s: f64,
    pub long_d: i64,
    pub long_m: i64,
    pub long_s: f64,
}

/// A timestamped situation report attached to an activation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Sitrep {
    #[serde(rename = "updated_at")]
    pub updated: FlexibleTime,
    #[serde(rename = "activationstransactionscurrentposition")]
    pub pos: Gps,
    #[serde(rename = "activationstransactionsnote", deserialize_with = "lenient_string")]
    pub comment: String,
}

/// One child row of a job's crew list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobCrewRow {
    pub duty_crew_id: i64,
    pub job_id: i64,
    pub member_id: i64,
    pub rank_id: i64,
    pub is_master: FlexibleBool,
    pub is_on_job: FlexibleBool,
}
