//! Database access for the legacy duty database.
//!
//! The projector core only sees the [`TableStore`] trait: parametric SQL with
//! `?` placeholders, one method to execute and one to query. The bundled
//! implementation wraps a rusqlite connection behind a mutex; the dialect it
//! exposes is restricted to what the production database also supports (no
//! `INSERT ... RETURNING`, `SELECT MAX` on an empty table yields one NULL
//! row).

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, OpenFlags, ToSql};
use tracing::info;

use crate::errors::LinkError;

/// Timestamp layout the duty database stores: naive local time.
pub const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DB_UTC_OFFSET_SECS: i32 = 10 * 60 * 60;

/// Fixed UTC+10 zone of the duty database. No daylight-saving shift.
pub fn db_timezone() -> FixedOffset {
    FixedOffset::east_opt(DB_UTC_OFFSET_SECS).expect("constant offset is in range")
}

/// Render a timestamp the way it is bound as a parameter: converted to the
/// database's fixed zone and formatted without zone information.
pub fn db_time_string(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&db_timezone())
        .format(DB_TIME_FORMAT)
        .to_string()
}

/// A single value bound to, or read from, a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Whether this value equals the zero value of its type. Zero fields are
    /// left out of writes so direct edits in the database survive.
    pub fn is_zero(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Int(v) => *v == 0,
            SqlValue::Float(v) => *v == 0.0,
            SqlValue::Text(s) => s.is_empty(),
            SqlValue::Timestamp(_) => false,
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Int(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
            SqlValue::Timestamp(ts) => ToSqlOutput::Owned(Value::Text(db_time_string(*ts))),
        })
    }
}

/// One result row, positionally accessed.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<SqlValue>);

impl Row {
    fn get(&self, idx: usize) -> Result<&SqlValue, LinkError> {
        self.0
            .get(idx)
            .ok_or_else(|| LinkError::internal(format!("row has no column {idx}")))
    }

    pub fn int(&self, idx: usize) -> Result<i64, LinkError> {
        Ok(self.opt_int(idx)?.unwrap_or(0))
    }

    pub fn opt_int(&self, idx: usize) -> Result<Option<i64>, LinkError> {
        match self.get(idx)? {
            SqlValue::Null => Ok(None),
            SqlValue::Int(v) => Ok(Some(*v)),
            SqlValue::Float(v) => Ok(Some(*v as i64)),
            other => Err(LinkError::internal(format!(
                "column {idx} is not an integer: {other:?}"
            ))),
        }
    }

    pub fn text(&self, idx: usize) -> Result<String, LinkError> {
        match self.get(idx)? {
            SqlValue::Null => Ok(String::new()),
            SqlValue::Text(s) => Ok(s.clone()),
            SqlValue::Int(v) => Ok(v.to_string()),
            SqlValue::Float(v) => Ok(v.to_string()),
            SqlValue::Timestamp(ts) => Ok(db_time_string(*ts)),
        }
    }

    /// Parse a stored timestamp or date column.
    pub fn datetime(&self, idx: usize) -> Result<Option<NaiveDateTime>, LinkError> {
        let raw = self.text(idx)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(parse_db_datetime(raw))
    }
}

/// Stored values are either full timestamps or bare dates.
pub fn parse_db_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DB_TIME_FORMAT)
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Narrow seam between the projector and the concrete database driver.
pub trait TableStore: Send + Sync {
    /// Run a statement, returning the number of affected rows.
    fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<u64, LinkError>;

    /// Run a query, materialising every row.
    fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<Row>, LinkError>;
}

impl<T: TableStore + ?Sized> TableStore for std::sync::Arc<T> {
    fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<u64, LinkError> {
        (**self).exec(sql, args)
    }

    fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<Row>, LinkError> {
        (**self).query(sql, args)
    }
}

/// SQLite-backed [`TableStore`].
///
/// The connection is shared behind a std mutex: every statement is short,
/// nothing async happens while the lock is held, and the orchestrator is
/// single-threaded anyway.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LinkError> {
        let path = path.as_ref();
        info!("opening duty database at {}", path.display());
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, LinkError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Confirm the connection is usable before the loop starts.
    pub fn ping(&self) -> Result<(), LinkError> {
        self.query("SELECT 1", &[]).map(|_| ())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, LinkError> {
        self.conn
            .lock()
            .map_err(|e| LinkError::LockError(e.to_string()))
    }
}

impl TableStore for SqliteStore {
    fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<u64, LinkError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let affected = stmt.execute(rusqlite::params_from_iter(args.iter()))?;
        Ok(affected as u64)
    }

    fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<Row>, LinkError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(rusqlite::params_from_iter(args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                values.push(match row.get_ref(idx)? {
                    ValueRef::Null => SqlValue::Null,
                    ValueRef::Integer(v) => SqlValue::Int(v),
                    ValueRef::Real(v) => SqlValue::Float(v),
                    ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(_) => SqlValue::Null,
                });
            }
            out.push(Row(values));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn timestamps_bind_in_fixed_plus_ten() {
        let ts = Utc.with_ymd_and_hms(2022, 1, 1, 6, 0, 35).unwrap();
        assert_eq!(db_time_string(ts), "2022-01-01 16:00:35");
    }

    #[test]
    fn zero_values() {
        assert!(SqlValue::Null.is_zero());
        assert!(SqlValue::Int(0).is_zero());
        assert!(SqlValue::Float(0.0).is_zero());
        assert!(SqlValue::Text(String::new()).is_zero());
        assert!(!SqlValue::Int(3).is_zero());
        assert!(!SqlValue::Text("Y".to_string()).is_zero());
        let ts = Utc.with_ymd_and_hms(2022, 1, 1, 6, 0, 35).unwrap();
        assert!(!SqlValue::Timestamp(ts).is_zero());
    }

    #[test]
    fn max_on_empty_table_yields_one_null_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec("CREATE TABLE DUTYJOBS (JOBJOBSEQUENCE INTEGER)", &[])
            .unwrap();
        let rows = store
            .query("SELECT MAX(JOBJOBSEQUENCE) FROM DUTYJOBS", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].opt_int(0).unwrap(), None);
    }

    #[test]
    fn exec_reports_affected_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec("CREATE TABLE MEMBERS (MEMBERNOLOCAL INTEGER, EMAILMRQ TEXT)", &[])
            .unwrap();
        let n = store
            .exec(
                "INSERT INTO MEMBERS (MEMBERNOLOCAL, EMAILMRQ) VALUES (?, ?)",
                &[
                    SqlValue::Int(1),
                    SqlValue::Text("elmer.fudd@mrq.org.au".to_string()),
                ],
            )
            .unwrap();
        assert_eq!(n, 1);
        let n = store
            .exec(
                "UPDATE MEMBERS SET EMAILMRQ=? WHERE MEMBERNOLOCAL=?",
                &[SqlValue::Text("elmer@mrq.org.au".to_string()), SqlValue::Int(2)],
            )
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn stored_dates_parse_with_and_without_time() {
        assert_eq!(
            parse_db_datetime("2022-01-02 06:00:35"),
            chrono::NaiveDate::from_ymd_opt(2022, 1, 2)
                .unwrap()
                .and_hms_opt(6, 0, 35)
        );
        assert_eq!(
            parse_db_datetime("2022-01-02"),
            chrono::NaiveDate::from_ymd_opt(2022, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_db_datetime("not a date"), None);
    }
}
