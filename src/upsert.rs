//! Update-or-insert against a dialect with no native upsert.
//!
//! Phase A updates the row located by the match columns; zero affected rows
//! means the row does not exist yet, so phase B inserts it, allocating any
//! zero-valued sequence column from `SELECT MAX + 1`. The two phases are
//! deliberately independent statements: the production dialect returns no
//! generated keys, and a crash between them only leaves a sequence hole that
//! the next poll's re-projection tolerates.

use tracing::debug;

use crate::errors::LinkError;
use crate::extract::ColumnBinding;
use crate::store::{SqlValue, TableStore};

/// Result of applying one table: sequence values allocated during insert.
#[derive(Debug, Default, PartialEq)]
pub struct Applied {
    pub allocated: Vec<(&'static str, i64)>,
}

/// Apply one table's column set with the two-phase protocol.
pub fn apply_table(
    store: &dyn TableStore,
    table: &str,
    cols: &[ColumnBinding],
) -> Result<Applied, LinkError> {
    if cols.is_empty() {
        return Err(LinkError::SchemaError {
            table: table.to_string(),
            detail: "empty column set".to_string(),
        });
    }
    let match_cols: Vec<&ColumnBinding> = cols.iter().filter(|c| c.is_match).collect();
    if match_cols.is_empty() {
        return Err(LinkError::SchemaError {
            table: table.to_string(),
            detail: "no match columns declared".to_string(),
        });
    }
    if let Some(missing) = match_cols.iter().find(|c| c.value.is_zero()) {
        return Err(LinkError::MissingMatchKey {
            table: table.to_string(),
            column: missing.column.to_string(),
        });
    }

    if update_existing(store, table, cols, &match_cols)? {
        return Ok(Applied::default());
    }
    insert_new(store, table, cols)
}

/// Phase A. Returns whether an existing row was updated.
fn update_existing(
    store: &dyn TableStore,
    table: &str,
    cols: &[ColumnBinding],
    match_cols: &[&ColumnBinding],
) -> Result<bool, LinkError> {
    let set_cols: Vec<&ColumnBinding> = cols.iter().filter(|c| !c.is_sequence).collect();
    if set_cols.is_empty() {
        return Err(LinkError::SchemaError {
            table: table.to_string(),
            detail: "no non-sequence columns to set".to_string(),
        });
    }

    let assignments: Vec<String> = set_cols.iter().map(|c| format!("{}=?", c.column)).collect();
    let conditions: Vec<String> = match_cols.iter().map(|c| format!("{}=?", c.column)).collect();
    let sql = format!(
        "UPDATE {table} SET {} WHERE {}",
        assignments.join(","),
        conditions.join(" AND ")
    );
    let args: Vec<SqlValue> = set_cols
        .iter()
        .map(|c| c.value.clone())
        .chain(match_cols.iter().map(|c| c.value.clone()))
        .collect();

    let affected = store
        .exec(&sql, &args)
        .map_err(|e| LinkError::statement(table, &sql, e))?;
    debug!(table, affected, "update phase");
    Ok(affected >= 1)
}

/// Phase B. Inserts all emitted columns, allocating sequences as needed.
fn insert_new(
    store: &dyn TableStore,
    table: &str,
    cols: &[ColumnBinding],
) -> Result<Applied, LinkError> {
    let mut allocated = Vec::new();
    let mut values = Vec::with_capacity(cols.len());
    for col in cols {
        if col.is_sequence && col.value.is_zero() {
            let next = allocate_sequence(store, table, col.column)?;
            allocated.push((col.column, next));
            values.push(SqlValue::Int(next));
        } else {
            values.push(col.value.clone());
        }
    }

    let names: Vec<&str> = cols.iter().map(|c| c.column).collect();
    let placeholders: Vec<&str> = cols.iter().map(|_| "?").collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(","),
        placeholders.join(",")
    );
    let affected = store
        .exec(&sql, &values)
        .map_err(|e| LinkError::statement(table, &sql, e))?;
    if affected != 1 {
        return Err(LinkError::statement(
            table,
            &sql,
            LinkError::internal(format!("insert affected {affected} rows, expected 1")),
        ));
    }
    debug!(table, ?allocated, "insert phase");
    Ok(Applied { allocated })
}

/// Next value for a sequence column. The probe must return a row even on an
/// empty table; a stored maximum of zero means the table was never seeded by
/// the operators, which the caller must surface rather than repair.
fn allocate_sequence(
    store: &dyn TableStore,
    table: &str,
    column: &'static str,
) -> Result<i64, LinkError> {
    let sql = format!("SELECT MAX({column}) FROM {table}");
    let rows = store
        .query(&sql, &[])
        .map_err(|e| LinkError::statement(table, &sql, e))?;
    let row = rows.first().ok_or_else(|| {
        LinkError::statement(
            table,
            &sql,
            LinkError::internal("sequence probe returned no rows"),
        )
    })?;
    let max = row.opt_int(0)?.unwrap_or(0);
    if max == 0 {
        return Err(LinkError::SequenceUnavailable {
            table: table.to_string(),
            column: column.to_string(),
        });
    }
    Ok(max + 1)
}
