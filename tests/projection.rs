//! End-to-end projection scenarios against a seeded store.
//!
//! The fixtures mirror a freshly-commissioned duty database: two duty-log
//! entries, a handful of members rostered onto the current duty, and three
//! pre-existing job rows so the job sequence has a ceiling to allocate from.
//! Stored timestamps are in the database's fixed UTC+10 zone.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use tripwatch_link::coerce::{FlexibleTime, SeaState, StringList, VesselName};
use tripwatch_link::errors::LinkError;
use tripwatch_link::models::Activation;
use tripwatch_link::store::{SqlValue, SqliteStore, TableStore};
use tripwatch_link::sync::{Clock, Projector, SyncService};
use tripwatch_link::tripwatch::ActivationSource;

const DUTYJOBS_DDL: &str = "CREATE TABLE DUTYJOBS (
    JOBDUTYSEQUENCE INTEGER,
    JOBJOBSEQUENCE INTEGER,
    JOBTIMEOUT TEXT,
    JOBTIMEIN TEXT,
    JOBTYPE TEXT,
    JOBACTIONTAKEN TEXT,
    JOBDETAILS TEXT,
    JOBDETAILS_LONG TEXT,
    JOBDONATION REAL,
    JOBWATERLIMITS TEXT,
    JOBSEAS TEXT,
    JOBCOMMERCIALVESSEL TEXT,
    JOBACTIVATION TEXT,
    JOBFREQUENCY TEXT,
    JOBASSISTNO REAL,
    JOBDUTYVESSELNO INTEGER,
    JOBDUTYVESSELNAME TEXT,
    JOBHOURSSTART REAL,
    JOBHOURSEND REAL,
    JOBVESSELREGO TEXT,
    JOBVESSELNAME TEXT,
    JOBLOA TEXT,
    JOBVESSELTYPE TEXT,
    JOBPROPULSION TEXT,
    JOBADULTS INTEGER,
    JOBCHILDREN INTEGER,
    JOBEMERGENCY TEXT,
    JOBQASNO TEXT,
    JOBPOLICE TEXT,
    JOBLATDEC REAL,
    JOBLONDEC REAL,
    JOBLATDEG INTEGER,
    JOBLATMIN INTEGER,
    JOBLATSEC REAL,
    JOBLONDEG INTEGER,
    JOBLONMIN INTEGER,
    JOBLONSEC REAL,
    JOBWINDSPEED TEXT,
    JOBWINDDIRECTION TEXT,
    JOBWEATHER TEXT
)";

fn seeded_store() -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .exec(
            "CREATE TABLE DUTYLOG (DUTYSEQUENCE INTEGER, DUTYDATE TEXT, CREW TEXT)",
            &[],
        )
        .unwrap();
    store
        .exec(
            "CREATE TABLE MEMBERS (MEMBERNOLOCAL INTEGER, SURNAME TEXT, FIRSTNAME TEXT, EMAILMRQ TEXT)",
            &[],
        )
        .unwrap();
    store
        .exec(
            "CREATE TABLE DUTYCREWS (DUTYSEQUENCE INTEGER, CREWMEMBER INTEGER, CREWRANKING INTEGER)",
            &[],
        )
        .unwrap();
    store
        .exec(
            "CREATE TABLE DUTYJOBSCREW (
                CREWDUTYSEQUENCE INTEGER,
                CREWJOBSEQUENCE INTEGER,
                CREWMEMBER INTEGER,
                CREWRANKING INTEGER,
                SKIPPER TEXT,
                CREWONJOB TEXT
            )",
            &[],
        )
        .unwrap();
    store.exec(DUTYJOBS_DDL, &[]).unwrap();

    store
        .exec(
            "INSERT INTO DUTYLOG VALUES (1, '2021-12-31', 'BLUE'), (2, '2022-01-02', 'WHITE')",
            &[],
        )
        .unwrap();
    store
        .exec(
            "INSERT INTO MEMBERS VALUES
                (1, 'Fudd', 'Elmer', 'elmer.fudd@mrq.org.au'),
                (2, 'Martian', 'Marvin', 'marvin.the.martian@mrq.org.au'),
                (3, 'Bunny', 'Bugs', 'bugs.bunny@mrq.org.au'),
                (4, 'Devil', 'Tasmanian', 'tasmanian.devil@mrq.org.au'),
                (5, 'Bird', 'Tweety', 'tweety.bird@mrq.org.au')",
            &[],
        )
        .unwrap();
    store
        .exec(
            "INSERT INTO DUTYCREWS VALUES
                (2, 1, 5), (2, 2, 12), (2, 3, 3), (2, 4, 7), (2, 5, 9)",
            &[],
        )
        .unwrap();
    // Three pre-existing jobs; the sequence ceiling is 3. Timestamps are
    // the stored UTC+10 renderings of the scenarios' UTC departure times.
    store
        .exec(
            "INSERT INTO DUTYJOBS (JOBDUTYSEQUENCE, JOBJOBSEQUENCE, JOBTIMEOUT, JOBDUTYVESSELNAME, JOBSEAS) VALUES
                (1, 1, '2022-01-01 16:00:35', 'MR2', 'rough'),
                (1, 2, '2022-01-05 10:00:00', 'MR1', 'calm'),
                (2, 3, '2022-01-01 23:10:00', 'MR5', 'calm')",
            &[],
        )
        .unwrap();
    Arc::new(store)
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn activation(
    id: i64,
    start: Option<DateTime<Utc>>,
    vessel_id: i64,
    vessel: &str,
    seas: &str,
    master: &str,
    crew: &[&str],
) -> Activation {
    let mut a = Activation::default();
    a.id = id;
    a.job.start_time = FlexibleTime(start);
    a.job.sea_state = SeaState(seas.to_string());
    a.job.vessel.id = vessel_id;
    a.job.vessel.name = VesselName(vessel.to_string());
    a.job.vessel.master = master.to_string();
    a.job.vessel.crew_list = StringList(crew.iter().map(|e| e.to_string()).collect());
    a
}

fn job_count(store: &SqliteStore) -> i64 {
    store
        .query("SELECT COUNT(*) FROM DUTYJOBS", &[])
        .unwrap()[0]
        .int(0)
        .unwrap()
}

/// (member id, skipper flag) pairs persisted for a job.
fn crew_rows(store: &SqliteStore, job_id: i64) -> Vec<(i64, String)> {
    store
        .query(
            "SELECT CREWMEMBER, SKIPPER FROM DUTYJOBSCREW WHERE CREWJOBSEQUENCE=? ORDER BY CREWMEMBER",
            &[SqlValue::Int(job_id)],
        )
        .unwrap()
        .iter()
        .map(|row| (row.int(0).unwrap(), row.text(1).unwrap()))
        .collect()
}

#[test]
fn fresh_insert_allocates_the_next_sequence_and_adds_crew() {
    let store = seeded_store();
    let projector = Projector::new(&*store);

    let mut a = activation(
        482,
        Some(utc(2022, 2, 12, 16, 1, 56)),
        2,
        "Marine Rescue 2",
        "rough",
        "",
        &["bugs.bunny@mrq.org.au"],
    );
    projector.project(&mut a).unwrap();

    let rows = store
        .query(
            "SELECT JOBDUTYSEQUENCE, JOBJOBSEQUENCE, JOBSEAS FROM DUTYJOBS
             WHERE JOBTIMEOUT='2022-02-13 02:01:56' AND JOBDUTYVESSELNAME='Marine Rescue 2'",
            &[],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].int(0).unwrap(), 2, "attached to the latest duty log");
    assert_eq!(rows[0].int(1).unwrap(), 4, "sequence allocated past the ceiling");
    assert_eq!(rows[0].text(2).unwrap(), "rough");

    // Crew resolved through the member and roster tables.
    let crew = store
        .query(
            "SELECT CREWMEMBER, CREWRANKING, SKIPPER, CREWONJOB FROM DUTYJOBSCREW WHERE CREWJOBSEQUENCE=4",
            &[],
        )
        .unwrap();
    assert_eq!(crew.len(), 1);
    assert_eq!(crew[0].int(0).unwrap(), 3);
    assert_eq!(crew[0].int(1).unwrap(), 3);
    assert_eq!(crew[0].text(2).unwrap(), "N");
    assert_eq!(crew[0].text(3).unwrap(), "Y");
}

#[test]
fn update_preserves_the_existing_sequence() {
    let store = seeded_store();
    let projector = Projector::new(&*store);

    let mut a = activation(
        42,
        Some(utc(2022, 1, 1, 6, 0, 35)),
        2,
        "MR2",
        "calm",
        "",
        &["bugs.bunny@mrq.org.au"],
    );
    projector.project(&mut a).unwrap();

    let rows = store
        .query(
            "SELECT JOBJOBSEQUENCE, JOBSEAS FROM DUTYJOBS
             WHERE JOBTIMEOUT='2022-01-01 16:00:35' AND JOBDUTYVESSELNAME='MR2'",
            &[],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].int(0).unwrap(), 1);
    assert_eq!(rows[0].text(1).unwrap(), "calm");
    assert_eq!(job_count(&store), 3, "no new row");
}

#[test]
fn projection_is_idempotent() {
    let store = seeded_store();
    let projector = Projector::new(&*store);

    let mut a = activation(
        482,
        Some(utc(2022, 2, 12, 16, 1, 56)),
        2,
        "Marine Rescue 2",
        "rough",
        "",
        &["bugs.bunny@mrq.org.au"],
    );
    projector.project(&mut a).unwrap();
    let jobs_after_first = job_count(&store);
    let crew_after_first = crew_rows(&store, 4);

    let mut again = a.clone();
    again.job.duty_log_id = 0;
    projector.project(&mut again).unwrap();
    assert_eq!(job_count(&store), jobs_after_first);
    assert_eq!(crew_rows(&store, 4), crew_after_first);
}

#[test]
fn master_swap_flips_the_skipper_flag_in_place() {
    let store = seeded_store();
    let projector = Projector::new(&*store);
    let start = Some(utc(2022, 1, 1, 13, 10, 0));

    let mut a = activation(
        88,
        start,
        4,
        "MR5",
        "",
        "marvin.the.martian@mrq.org.au",
        &["tasmanian.devil@mrq.org.au", "elmer.fudd@mrq.org.au"],
    );
    projector.project(&mut a).unwrap();
    assert_eq!(
        crew_rows(&store, 3),
        vec![
            (1, "N".to_string()),
            (2, "Y".to_string()),
            (4, "N".to_string()),
        ]
    );

    let mut a = activation(
        88,
        start,
        4,
        "MR5",
        "",
        "tasmanian.devil@mrq.org.au",
        &["marvin.the.martian@mrq.org.au", "elmer.fudd@mrq.org.au"],
    );
    projector.project(&mut a).unwrap();
    assert_eq!(
        crew_rows(&store, 3),
        vec![
            (1, "N".to_string()),
            (2, "N".to_string()),
            (4, "Y".to_string()),
        ],
        "same cardinality, flags flipped"
    );
}

#[test]
fn shrinking_the_crew_deletes_departed_rows() {
    let store = seeded_store();
    let projector = Projector::new(&*store);
    let start = Some(utc(2022, 1, 1, 13, 10, 0));

    let mut a = activation(
        88,
        start,
        4,
        "MR5",
        "",
        "marvin.the.martian@mrq.org.au",
        &["tasmanian.devil@mrq.org.au", "elmer.fudd@mrq.org.au"],
    );
    projector.project(&mut a).unwrap();

    // The devil leaves, tweety takes over as master.
    let mut a = activation(
        88,
        start,
        4,
        "MR5",
        "",
        "tweety.bird@mrq.org.au",
        &["marvin.the.martian@mrq.org.au", "elmer.fudd@mrq.org.au"],
    );
    projector.project(&mut a).unwrap();
    assert_eq!(
        crew_rows(&store, 3),
        vec![
            (1, "N".to_string()),
            (2, "N".to_string()),
            (5, "Y".to_string()),
        ]
    );
}

#[test]
fn unresolvable_crew_emails_are_silently_dropped() {
    let store = seeded_store();
    let projector = Projector::new(&*store);

    let mut a = activation(
        90,
        Some(utc(2022, 1, 1, 13, 10, 0)),
        4,
        "MR5",
        "",
        "",
        &["bugs.bunny@mrq.org.au", "road.runner@mrq.org.au"],
    );
    projector.project(&mut a).unwrap();
    assert_eq!(crew_rows(&store, 3), vec![(3, "N".to_string())]);
}

#[test]
fn missing_match_field_aborts_without_writing() {
    let store = seeded_store();
    let projector = Projector::new(&*store);

    let mut a = activation(99, None, 2, "MR2", "calm", "", &[]);
    let err = projector.project(&mut a).unwrap_err();
    assert!(err.is_missing_match_key());
    assert_eq!(job_count(&store), 3);
}

#[test]
fn unseeded_job_table_reports_sequence_unavailable() {
    let store = seeded_store();
    store.exec("DELETE FROM DUTYJOBS", &[]).unwrap();
    let projector = Projector::new(&*store);

    let mut a = activation(
        7,
        Some(utc(2022, 2, 12, 16, 1, 56)),
        2,
        "MR2",
        "calm",
        "",
        &[],
    );
    let err = projector.project(&mut a).unwrap_err();
    assert!(err.is_sequence_unavailable());
}

struct FakeSource {
    activations: Vec<Activation>,
}

#[async_trait]
impl ActivationSource for FakeSource {
    async fn list_updated_since(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Activation>, LinkError> {
        Ok(self.activations.clone())
    }

    async fn get(&self, id: i64) -> Result<Activation, LinkError> {
        self.activations
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(LinkError::NotFound)
    }
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[tokio::test]
async fn cycle_skips_cancelled_activations_and_continues_past_failures() {
    let store = seeded_store();

    let mut cancelled = activation(
        10,
        Some(utc(2022, 3, 1, 0, 0, 0)),
        2,
        "MR2",
        "calm",
        "",
        &[],
    );
    cancelled.job.status = "Cancelled".to_string();
    let broken = activation(11, None, 2, "MR2", "calm", "", &[]);
    let good = activation(
        482,
        Some(utc(2022, 2, 12, 16, 1, 56)),
        2,
        "Marine Rescue 2",
        "rough",
        "",
        &[],
    );

    let mut service = SyncService::new(
        Box::new(FakeSource {
            activations: vec![cancelled, broken, good],
        }),
        Box::new(store.clone()),
        Box::new(FixedClock(utc(2022, 3, 2, 0, 0, 0))),
    );

    let failures = service.run_cycle().await;
    assert_eq!(failures.len(), 1);
    assert!(failures[0].error.is_missing_match_key());
    assert_eq!(failures[0].activation.id, 11);

    // The good activation landed despite the failure before it.
    let rows = store
        .query(
            "SELECT JOBJOBSEQUENCE FROM DUTYJOBS WHERE JOBTIMEOUT='2022-02-13 02:01:56'",
            &[],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    // The cancelled one never did.
    assert_eq!(job_count(&store), 4);
}
