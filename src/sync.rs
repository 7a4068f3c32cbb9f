//! Orchestration: project one activation into the duty database, and run the
//! poll cycle that does so for everything updated since the last pass.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::crew;
use crate::derive;
use crate::errors::LinkError;
use crate::extract::extract;
use crate::models::{Activation, STATUS_CANCELLED};
use crate::schema::{activation_schema, JOB_SEQUENCE_COLUMN};
use crate::store::TableStore;
use crate::tripwatch::ActivationSource;
use crate::upsert;

/// A whole cycle, listing included, must finish inside this deadline.
pub const CYCLE_DEADLINE: Duration = Duration::from_secs(60);

/// Overlap subtracted from the listing watermark so records updated while a
/// cycle ran are not missed.
const LISTING_OVERLAP_SECS: i64 = 60;

/// How far back the watermark starts at boot, bounding the catch-up window
/// after an outage.
const BOOT_LOOKBACK_HOURS: i64 = 12;

const LATEST_DUTY_LOG_SQL: &str =
    "SELECT DUTYSEQUENCE, MAX(DUTYDATE), CREW FROM DUTYLOG GROUP BY DUTYSEQUENCE, CREW";

/// Injectable time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Who a failure belongs to, for the log line.
#[derive(Debug, Clone, Default)]
pub struct ActivationRef {
    pub id: i64,
    pub vessel: String,
    pub start: String,
}

impl ActivationRef {
    fn of(activation: &Activation) -> Self {
        ActivationRef {
            id: activation.id,
            vessel: activation.job.vessel.name.0.clone(),
            start: activation.job.start_time.to_string(),
        }
    }
}

impl fmt::Display for ActivationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "activation {} on {} at {}", self.id, self.vessel, self.start)
    }
}

/// One classified per-activation failure from a cycle.
#[derive(Debug)]
pub struct CycleFailure {
    pub activation: ActivationRef,
    pub error: LinkError,
}

/// Projects one activation: derive, resolve the duty roster, extract, apply
/// each table, then reconcile the crew.
pub struct Projector<'a> {
    store: &'a dyn TableStore,
}

impl<'a> Projector<'a> {
    pub fn new(store: &'a dyn TableStore) -> Self {
        Projector { store }
    }

    pub fn project(&self, activation: &mut Activation) -> Result<(), LinkError> {
        derive::apply(activation)?;

        let duty = latest_duty_log(self.store)?;
        activation.job.duty_log_id = duty.id;
        debug!(duty_log = duty.id, crew = %duty.crew, "resolved duty roster");

        let tables = extract(activation_schema(), activation);
        let mut job_id = activation.job.id;
        let mut failure: Option<LinkError> = None;
        for (table, cols) in &tables {
            match upsert::apply_table(self.store, table, cols) {
                Ok(applied) => {
                    for (column, value) in applied.allocated {
                        if column == JOB_SEQUENCE_COLUMN {
                            job_id = value;
                        }
                    }
                }
                Err(err) => {
                    // Other tables still get their chance; the first failure
                    // is what the caller sees.
                    if failure.is_some() {
                        warn!(table = %table, error = %err, "additional table failure");
                    }
                    failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        crew::reconcile(self.store, &activation.job, job_id, duty.id)
    }
}

/// The duty roster the next job attaches to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DutyLogEntry {
    pub id: i64,
    pub date: Option<NaiveDateTime>,
    pub crew: String,
}

/// Most recent duty-log row. The grouped query is streamed and the row with
/// the highest date wins, later rows breaking ties; an empty duty log means
/// the database was never commissioned.
pub fn latest_duty_log(store: &dyn TableStore) -> Result<DutyLogEntry, LinkError> {
    let rows = store
        .query(LATEST_DUTY_LOG_SQL, &[])
        .map_err(|e| LinkError::statement("DUTYLOG", LATEST_DUTY_LOG_SQL, e))?;
    let mut latest: Option<DutyLogEntry> = None;
    for row in rows {
        let entry = DutyLogEntry {
            id: row.int(0)?,
            date: row.datetime(1)?,
            crew: row.text(2)?.trim().to_string(),
        };
        match &latest {
            Some(best) if entry.date < best.date => {}
            _ => latest = Some(entry),
        }
    }
    latest.ok_or_else(|| LinkError::internal("duty log is empty"))
}

/// The long-lived poll service: lists updated activations and projects each,
/// advancing the watermark whether or not the cycle succeeded.
pub struct SyncService {
    source: Box<dyn ActivationSource + Send + Sync>,
    store: Box<dyn TableStore>,
    clock: Box<dyn Clock>,
    last_updated: DateTime<Utc>,
}

impl SyncService {
    pub fn new(
        source: Box<dyn ActivationSource + Send + Sync>,
        store: Box<dyn TableStore>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let last_updated = clock.now() - chrono::Duration::hours(BOOT_LOOKBACK_HOURS);
        SyncService {
            source,
            store,
            clock,
            last_updated,
        }
    }

    /// Run one poll cycle under the cycle deadline. Failures are returned,
    /// never raised: the loop must keep going.
    pub async fn run_cycle(&mut self) -> Vec<CycleFailure> {
        let since = self.last_updated - chrono::Duration::seconds(LISTING_OVERLAP_SECS);
        let outcome = tokio::time::timeout(CYCLE_DEADLINE, self.process(since)).await;
        self.last_updated = self.clock.now();
        match outcome {
            Ok(failures) => failures,
            Err(_) => vec![CycleFailure {
                activation: ActivationRef::default(),
                error: LinkError::Timeout,
            }],
        }
    }

    async fn process(&self, since: DateTime<Utc>) -> Vec<CycleFailure> {
        let mut failures = Vec::new();
        let activations = match self.source.list_updated_since(since).await {
            Ok(list) => list,
            Err(err) => {
                failures.push(CycleFailure {
                    activation: ActivationRef::default(),
                    error: err,
                });
                return failures;
            }
        };

        let projector = Projector::new(&*self.store);
        for mut activation in activations {
            if activation.job.status.eq_ignore_ascii_case(STATUS_CANCELLED) {
                debug!(id = activation.id, "skipping cancelled activation");
                continue;
            }
            if let Err(error) = projector.project(&mut activation) {
                failures.push(CycleFailure {
                    activation: ActivationRef::of(&activation),
                    error,
                });
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{SqliteStore, SqlValue};

    use super::*;

    #[test]
    fn latest_duty_log_keeps_the_highest_date() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec(
                "CREATE TABLE DUTYLOG (DUTYSEQUENCE INTEGER, DUTYDATE TEXT, CREW TEXT)",
                &[],
            )
            .unwrap();
        for (seq, date, crew) in [
            (1, "2021-12-31", "BLUE"),
            (2, "2022-01-02", "WHITE"),
            (1, "2021-11-20", "BLUE"),
        ] {
            store
                .exec(
                    "INSERT INTO DUTYLOG VALUES (?, ?, ?)",
                    &[
                        SqlValue::Int(seq),
                        SqlValue::Text(date.to_string()),
                        SqlValue::Text(crew.to_string()),
                    ],
                )
                .unwrap();
        }
        let entry = latest_duty_log(&store).unwrap();
        assert_eq!(entry.id, 2);
        assert_eq!(entry.crew, "WHITE");
    }

    #[test]
    fn empty_duty_log_is_an_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec(
                "CREATE TABLE DUTYLOG (DUTYSEQUENCE INTEGER, DUTYDATE TEXT, CREW TEXT)",
                &[],
            )
            .unwrap();
        assert!(latest_duty_log(&store).is_err());
    }

    #[test]
    fn activation_ref_reads_like_the_log_line() {
        let mut a = Activation::default();
        a.id = 42;
        a.job.vessel.name = crate::coerce::VesselName("MR1".to_string());
        let r = ActivationRef::of(&a);
        assert_eq!(r.to_string(), "activation 42 on MR1 at unset");
    }
}
