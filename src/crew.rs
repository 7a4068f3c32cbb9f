//! Reconcile a job's crew child rows against the upstream crew list.
//!
//! The desired crew is the master plus the listed crew emails, resolved to
//! member ids against the members on the current duty roster. Members found
//! get a child row inserted or updated (the master flag can flip in place);
//! persisted rows for emails no longer listed are deleted. Emails that do
//! not resolve are skipped: a member who is not on the duty roster cannot be
//! crewed onto the job.

use tracing::debug;

use crate::coerce::FlexibleBool;
use crate::errors::LinkError;
use crate::extract::extract;
use crate::models::{Job, JobCrewRow};
use crate::schema::job_crew_schema;
use crate::store::{SqlValue, TableStore};
use crate::upsert;

const FIND_JOB_SQL: &str =
    "SELECT JOBJOBSEQUENCE FROM DUTYJOBS WHERE JOBTIMEOUT=? AND JOBDUTYVESSELNAME=?";

const RESOLVE_MEMBER_SQL: &str = "SELECT M.MEMBERNOLOCAL, D.DUTYSEQUENCE, D.CREWRANKING \
     FROM MEMBERS M JOIN DUTYCREWS D ON D.CREWMEMBER = M.MEMBERNOLOCAL \
     WHERE LOWER(M.EMAILMRQ) = ? AND D.DUTYSEQUENCE = ?";

const PERSISTED_CREW_SQL: &str = "SELECT C.CREWDUTYSEQUENCE, C.CREWMEMBER, M.EMAILMRQ \
     FROM DUTYJOBSCREW C JOIN MEMBERS M ON M.MEMBERNOLOCAL = C.CREWMEMBER \
     WHERE C.CREWJOBSEQUENCE = ?";

const DELETE_CREW_SQL: &str =
    "DELETE FROM DUTYJOBSCREW WHERE CREWDUTYSEQUENCE=? AND CREWJOBSEQUENCE=? AND CREWMEMBER=?";

/// Bring the persisted crew of `job` in line with the upstream list.
/// `job_id` is zero when the job row pre-existed; it is then looked up by
/// the job's natural key.
pub fn reconcile(
    store: &dyn TableStore,
    job: &Job,
    job_id: i64,
    duty_sequence_id: i64,
) -> Result<(), LinkError> {
    let job_id = if job_id != 0 {
        job_id
    } else {
        find_job_id(store, job)?
    };

    let desired = desired_emails(job);
    for email in &desired {
        let Some(entry) = resolve_member(store, email, duty_sequence_id)? else {
            debug!(email = %email, duty_sequence_id, "email not on duty roster, skipping");
            continue;
        };
        let row = JobCrewRow {
            duty_crew_id: entry.duty_crew_id,
            job_id,
            member_id: entry.member_id,
            rank_id: entry.rank_id,
            is_master: FlexibleBool::from_bool(email == &job.vessel.master),
            is_on_job: FlexibleBool::yes(),
        };
        for (table, cols) in extract(job_crew_schema(), &row) {
            upsert::apply_table(store, table, &cols)?;
        }
    }

    delete_departed(store, job_id, &desired)
}

/// Master plus crew, without blanks or duplicates.
fn desired_emails(job: &Job) -> Vec<String> {
    let mut desired: Vec<String> = Vec::with_capacity(job.vessel.crew_list.0.len() + 1);
    for email in job
        .vessel
        .crew_list
        .iter()
        .chain(std::iter::once(&job.vessel.master))
    {
        let email = email.trim();
        if !email.is_empty() && !desired.iter().any(|e| e == email) {
            desired.push(email.to_string());
        }
    }
    desired
}

fn find_job_id(store: &dyn TableStore, job: &Job) -> Result<i64, LinkError> {
    let args = [
        job.start_time.to_sql(),
        SqlValue::Text(job.vessel.name.0.clone()),
    ];
    let rows = store
        .query(FIND_JOB_SQL, &args)
        .map_err(|e| LinkError::statement("DUTYJOBS", FIND_JOB_SQL, e))?;
    if rows.len() > 1 {
        return Err(LinkError::internal(format!(
            "job lookup for vessel {} matched {} rows",
            job.vessel.name.0,
            rows.len()
        )));
    }
    match rows.first() {
        Some(row) => row.int(0),
        None => Err(LinkError::internal(format!(
            "no job row for vessel {} at {}",
            job.vessel.name.0, job.start_time
        ))),
    }
}

struct RosterEntry {
    member_id: i64,
    duty_crew_id: i64,
    rank_id: i64,
}

fn resolve_member(
    store: &dyn TableStore,
    email: &str,
    duty_sequence_id: i64,
) -> Result<Option<RosterEntry>, LinkError> {
    let args = [
        SqlValue::Text(email.to_lowercase()),
        SqlValue::Int(duty_sequence_id),
    ];
    let rows = store
        .query(RESOLVE_MEMBER_SQL, &args)
        .map_err(|e| LinkError::statement("MEMBERS", RESOLVE_MEMBER_SQL, e))?;
    let Some(row) = rows.first() else {
        return Ok(None);
    };
    Ok(Some(RosterEntry {
        member_id: row.int(0)?,
        duty_crew_id: row.int(1)?,
        rank_id: row.int(2)?,
    }))
}

/// Delete persisted crew rows whose email is no longer wanted. Each delete
/// must hit exactly one row; anything else means the child table diverged.
fn delete_departed(
    store: &dyn TableStore,
    job_id: i64,
    desired: &[String],
) -> Result<(), LinkError> {
    let wanted: Vec<String> = desired.iter().map(|e| e.to_lowercase()).collect();
    let rows = store
        .query(PERSISTED_CREW_SQL, &[SqlValue::Int(job_id)])
        .map_err(|e| LinkError::statement("DUTYJOBSCREW", PERSISTED_CREW_SQL, e))?;
    for row in rows {
        let duty_crew_id = row.int(0)?;
        let member_id = row.int(1)?;
        let email = row.text(2)?.trim().to_lowercase();
        if wanted.iter().any(|e| e == &email) {
            continue;
        }
        let args = [
            SqlValue::Int(duty_crew_id),
            SqlValue::Int(job_id),
            SqlValue::Int(member_id),
        ];
        let affected = store
            .exec(DELETE_CREW_SQL, &args)
            .map_err(|e| LinkError::statement("DUTYJOBSCREW", DELETE_CREW_SQL, e))?;
        if affected != 1 {
            return Err(LinkError::statement(
                "DUTYJOBSCREW",
                DELETE_CREW_SQL,
                LinkError::internal(format!(
                    "crew delete for member {member_id} affected {affected} rows"
                )),
            ));
        }
        debug!(member_id, email = %email, "removed departed crew row");
    }
    Ok(())
}
