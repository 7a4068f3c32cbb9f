//! Column extraction: walk the schema against a live aggregate and emit the
//! per-table column sets to write.

use std::collections::HashMap;

use crate::schema::{Node, Schema};
use crate::store::SqlValue;

/// One column ready to bind, with the flags the upsert engine needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBinding {
    pub column: &'static str,
    pub is_match: bool,
    pub is_sequence: bool,
    pub value: SqlValue,
}

/// Walk `schema` depth-first over `aggregate`, grouping emitted columns by
/// table. A field holding its type's zero value is left out so that values
/// already edited in the database survive a re-synchronisation; sequence
/// columns are always emitted so the upsert engine can allocate them, and
/// zero match columns are emitted so it can reject the table.
///
/// Column order within a table follows declaration order, but the table map
/// itself is unordered; callers must not rely on a stable table sequence.
pub fn extract<T>(schema: &Schema<T>, aggregate: &T) -> HashMap<&'static str, Vec<ColumnBinding>> {
    let mut tables = HashMap::new();
    walk(&schema.root, crate::schema::PARENT_TABLE, aggregate, &mut tables);
    tables
}

fn walk<T>(
    node: &Node<T>,
    table: &'static str,
    aggregate: &T,
    tables: &mut HashMap<&'static str, Vec<ColumnBinding>>,
) {
    match node {
        Node::Group { table: own, children } => {
            let table = (*own).unwrap_or(table);
            for child in children {
                walk(child, table, aggregate, tables);
            }
        }
        Node::Leaf(spec) => {
            let mut value = (spec.read)(aggregate);
            if let (SqlValue::Text(s), Some(max)) = (&mut value, spec.max_len) {
                truncate_in_place(s, max);
            }
            if value.is_zero() && !spec.is_sequence && !spec.is_match {
                return;
            }
            tables.entry(table).or_default().push(ColumnBinding {
                column: spec.column,
                is_match: spec.is_match,
                is_sequence: spec.is_sequence,
                value,
            });
        }
    }
}

fn truncate_in_place(s: &mut String, max: usize) {
    if s.chars().count() > max {
        *s = s.chars().take(max).collect();
    }
}
