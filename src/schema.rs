//! Declarative column schema for the aggregate.
//!
//! The original system mapped struct fields to tables with tagged runtime
//! reflection. Here the mapping is lifted into a first-class tree built once
//! at startup: groups name (or inherit) a target table, leaves carry the
//! column name, the match/sequence flags, an optional maximum length and a
//! reader that pulls the live value out of the aggregate. The extractor walks
//! this tree, never the aggregate type itself.
//!
//! Leaf declaration order is load-bearing: sequence columns are allocated in
//! the order they appear, and the roster sequence must come before the job's
//! own sequence.

use std::sync::OnceLock;

use crate::models::{Activation, JobCrewRow};
use crate::store::SqlValue;

/// Sentinel table assigned to the aggregate root. Nothing is ever written to
/// it; leaves only end up here if they are declared outside any table group.
pub const PARENT_TABLE: &str = "parent";

/// The main job table and its crew child table.
pub const JOBS_TABLE: &str = "DUTYJOBS";
pub const JOB_CREW_TABLE: &str = "DUTYJOBSCREW";

/// Column the upsert engine allocates for new job rows.
pub const JOB_SEQUENCE_COLUMN: &str = "JOBJOBSEQUENCE";

pub struct ColumnSpec<T> {
    pub column: &'static str,
    pub is_match: bool,
    pub is_sequence: bool,
    pub max_len: Option<usize>,
    pub read: fn(&T) -> SqlValue,
}

pub enum Node<T> {
    Group {
        table: Option<&'static str>,
        children: Vec<Node<T>>,
    },
    Leaf(ColumnSpec<T>),
}

impl<T> Node<T> {
    /// Mark this leaf as a match column (locates the row for UPDATE).
    fn matching(mut self) -> Self {
        if let Node::Leaf(spec) = &mut self {
            spec.is_match = true;
        }
        self
    }

    /// Mark this leaf as a sequence column (allocated at INSERT time).
    fn sequence(mut self) -> Self {
        if let Node::Leaf(spec) = &mut self {
            spec.is_sequence = true;
        }
        self
    }
}

pub fn group<T>(table: Option<&'static str>, children: Vec<Node<T>>) -> Node<T> {
    Node::Group { table, children }
}

pub fn column<T>(column: &'static str, read: fn(&T) -> SqlValue) -> Node<T> {
    Node::Leaf(ColumnSpec {
        column,
        is_match: false,
        is_sequence: false,
        max_len: None,
        read,
    })
}

pub fn column_n<T>(column: &'static str, max_len: usize, read: fn(&T) -> SqlValue) -> Node<T> {
    Node::Leaf(ColumnSpec {
        column,
        is_match: false,
        is_sequence: false,
        max_len: Some(max_len),
        read,
    })
}

pub struct Schema<T> {
    pub root: Node<T>,
}

impl<T> Schema<T> {
    pub fn new(root: Node<T>) -> Self {
        Schema { root }
    }
}

/// Schema of the activation aggregate, built once.
pub fn activation_schema() -> &'static Schema<Activation> {
    static SCHEMA: OnceLock<Schema<Activation>> = OnceLock::new();
    SCHEMA.get_or_init(build_activation_schema)
}

/// Schema of one job-crew child row, built once.
pub fn job_crew_schema() -> &'static Schema<JobCrewRow> {
    static SCHEMA: OnceLock<Schema<JobCrewRow>> = OnceLock::new();
    SCHEMA.get_or_init(build_job_crew_schema)
}

fn build_activation_schema() -> Schema<Activation> {
    Schema::new(group(
        Some(PARENT_TABLE),
        vec![group(
            Some(JOBS_TABLE),
            vec![
                // Roster sequence first, job sequence second. Don't reorder.
                column("JOBDUTYSEQUENCE", |a: &Activation| {
                    SqlValue::Int(a.job.duty_log_id)
                })
                .sequence(),
                column(JOB_SEQUENCE_COLUMN, |a: &Activation| SqlValue::Int(a.job.id))
                    .sequence(),
                column("JOBTIMEOUT", |a: &Activation| a.job.start_time.to_sql()).matching(),
                column("JOBTIMEIN", |a: &Activation| a.job.end_time.to_sql()),
                column_n("JOBTYPE", 20, |a: &Activation| a.job.job_type.to_sql()),
                column_n("JOBACTIONTAKEN", 20, |a: &Activation| a.job.action.to_sql()),
                column_n("JOBDETAILS", 96, |a: &Activation| {
                    SqlValue::Text(a.job.purpose.clone())
                }),
                column_n("JOBDETAILS_LONG", 4096, |a: &Activation| {
                    SqlValue::Text(a.job.comments.clone())
                }),
                column("JOBDONATION", |a: &Activation| a.job.donation.to_sql()),
                column_n("JOBWATERLIMITS", 20, |a: &Activation| {
                    a.job.water_limits.to_sql()
                }),
                column_n("JOBSEAS", 20, |a: &Activation| a.job.sea_state.to_sql()),
                column_n("JOBCOMMERCIALVESSEL", 1, |a: &Activation| {
                    a.job.commercial.to_sql()
                }),
                column_n("JOBACTIVATION", 20, |a: &Activation| {
                    a.job.activated_by.to_sql()
                }),
                column_n("JOBFREQUENCY", 30, |a: &Activation| {
                    SqlValue::Text(a.job.freq.clone())
                }),
                column("JOBASSISTNO", |a: &Activation| a.job.assist_num.to_sql()),
                // Rescue vessel: inherits the job table.
                group(
                    None,
                    vec![
                        column("JOBDUTYVESSELNO", |a: &Activation| {
                            SqlValue::Int(a.job.vessel.id)
                        }),
                        column_n("JOBDUTYVESSELNAME", 30, |a: &Activation| {
                            a.job.vessel.name.to_sql()
                        })
                        .matching(),
                        column("JOBHOURSSTART", |a: &Activation| {
                            a.job.vessel.start_hours_port.to_sql()
                        }),
                        column("JOBHOURSEND", |a: &Activation| {
                            a.job.vessel.end_hours_port.to_sql()
                        }),
                    ],
                ),
                // Assisted vessel.
                group(
                    None,
                    vec![
                        column_n("JOBVESSELREGO", 10, |a: &Activation| {
                            SqlValue::Text(a.job.assisted.rego.clone())
                        }),
                        column_n("JOBVESSELNAME", 30, |a: &Activation| {
                            SqlValue::Text(a.job.assisted.name.clone())
                        }),
                        column_n("JOBLOA", 10, |a: &Activation| a.job.assisted.length.to_sql()),
                        column_n("JOBVESSELTYPE", 20, |a: &Activation| {
                            a.job.assisted.boat_type.to_sql()
                        }),
                        column_n("JOBPROPULSION", 20, |a: &Activation| {
                            a.job.assisted.propulsion.to_sql()
                        }),
                        column("JOBADULTS", |a: &Activation| {
                            SqlValue::Int(a.job.assisted.num_adults)
                        }),
                        column("JOBCHILDREN", |a: &Activation| {
                            SqlValue::Int(a.job.assisted.num_kids)
                        }),
                    ],
                ),
                // Emergency details.
                group(
                    None,
                    vec![
                        column_n("JOBEMERGENCY", 1, |a: &Activation| {
                            a.job.emergency.flag.to_sql()
                        }),
                        column_n("JOBQASNO", 10, |a: &Activation| {
                            SqlValue::Text(a.job.emergency.police_num.clone())
                        }),
                        column_n("JOBPOLICE", 1, |a: &Activation| {
                            a.job.emergency.notified.to_sql()
                        }),
                    ],
                ),
                // Chosen position, decimal and DMS.
                group(
                    None,
                    vec![
                        column("JOBLATDEC", |a: &Activation| SqlValue::Float(a.job.dms.lat)),
                        column("JOBLONDEC", |a: &Activation| SqlValue::Float(a.job.dms.long)),
                        column("JOBLATDEG", |a: &Activation| SqlValue::Int(a.job.dms.lat_d)),
                        column("JOBLATMIN", |a: &Activation| SqlValue::Int(a.job.dms.lat_m)),
                        column("JOBLATSEC", |a: &Activation| SqlValue::Float(a.job.dms.lat_s)),
                        column("JOBLONDEG", |a: &Activation| SqlValue::Int(a.job.dms.long_d)),
                        column("JOBLONMIN", |a: &Activation| SqlValue::Int(a.job.dms.long_m)),
                        column("JOBLONSEC", |a: &Activation| SqlValue::Float(a.job.dms.long_s)),
                    ],
                ),
                // Weather.
                group(
                    None,
                    vec![
                        column_n("JOBWINDSPEED", 20, |a: &Activation| {
                            a.job.weather.wind_speed.to_sql()
                        }),
                        column_n("JOBWINDDIRECTION", 3, |a: &Activation| {
                            a.job.weather.wind_dir.to_sql()
                        }),
                        column_n("JOBWEATHER", 20, |a: &Activation| {
                            SqlValue::Text(a.job.weather.rain_state.clone())
                        }),
                    ],
                ),
            ],
        )],
    ))
}

fn build_job_crew_schema() -> Schema<JobCrewRow> {
    Schema::new(group(
        Some(JOB_CREW_TABLE),
        vec![
            column("CREWDUTYSEQUENCE", |r: &JobCrewRow| {
                SqlValue::Int(r.duty_crew_id)
            })
            .matching(),
            column("CREWJOBSEQUENCE", |r: &JobCrewRow| SqlValue::Int(r.job_id)).matching(),
            column("CREWMEMBER", |r: &JobCrewRow| SqlValue::Int(r.member_id)).matching(),
            column("CREWRANKING", |r: &JobCrewRow| SqlValue::Int(r.rank_id)),
            column_n("SKIPPER", 1, |r: &JobCrewRow| r.is_master.to_sql()),
            column_n("CREWONJOB", 1, |r: &JobCrewRow| r.is_on_job.to_sql()),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_columns<T>(node: &Node<T>, out: &mut Vec<(&'static str, bool, bool)>) {
        match node {
            Node::Group { children, .. } => {
                for child in children {
                    collect_columns(child, out);
                }
            }
            Node::Leaf(spec) => out.push((spec.column, spec.is_match, spec.is_sequence)),
        }
    }

    #[test]
    fn sequence_columns_keep_declaration_order() {
        let mut cols = Vec::new();
        collect_columns(&activation_schema().root, &mut cols);
        let sequences: Vec<&str> = cols
            .iter()
            .filter(|(_, _, seq)| *seq)
            .map(|(name, _, _)| *name)
            .collect();
        assert_eq!(sequences, vec!["JOBDUTYSEQUENCE", "JOBJOBSEQUENCE"]);
    }

    #[test]
    fn job_table_declares_its_match_keys() {
        let mut cols = Vec::new();
        collect_columns(&activation_schema().root, &mut cols);
        let matches: Vec<&str> = cols
            .iter()
            .filter(|(_, m, _)| *m)
            .map(|(name, _, _)| *name)
            .collect();
        assert_eq!(matches, vec!["JOBTIMEOUT", "JOBDUTYVESSELNAME"]);
    }

    #[test]
    fn crew_rows_match_on_the_identifying_triple() {
        let mut cols = Vec::new();
        collect_columns(&job_crew_schema().root, &mut cols);
        let matches: Vec<&str> = cols
            .iter()
            .filter(|(_, m, _)| *m)
            .map(|(name, _, _)| *name)
            .collect();
        assert_eq!(
            matches,
            vec!["CREWDUTYSEQUENCE", "CREWJOBSEQUENCE", "CREWMEMBER"]
        );
    }
}
