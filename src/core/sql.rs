//! SQL text for the warehouse.
//!
//! Identifiers are always double-quoted and values are always bound. Every
//! value is bound as text and cast to the target column's type, so a JSON
//! payload can be inserted without knowing the Postgres type up front.

use crate::domain::model::{Record, TableColumn};
use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Postgres accepts at most this many bind parameters in one statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

pub const COLUMNS_QUERY: &str = r#"
    SELECT a.attname::text, format_type(a.atttypid, a.atttypmod)
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relname = $2
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Columns of `columns` that appear as keys in `record`, in record order.
pub fn matching_columns<'a>(record: &Record, columns: &'a [TableColumn]) -> Vec<&'a TableColumn> {
    record
        .data
        .keys()
        .filter_map(|key| columns.iter().find(|c| &c.name == key))
        .collect()
}

/// Like [`matching_columns`], but an insert with no columns at all is an error.
pub fn insert_columns<'a>(
    record: &Record,
    columns: &'a [TableColumn],
    schema: &str,
    table: &str,
) -> Result<Vec<&'a TableColumn>> {
    let matching = matching_columns(record, columns);
    if matching.is_empty() {
        return Err(EtlError::ValidationError {
            message: format!("None of the item keys are columns of {}.{}", schema, table),
        });
    }
    Ok(matching)
}

/// Bind values for `rows`, row-major in `columns` order. Keys a row lacks
/// bind NULL.
pub fn row_params(rows: &[Record], columns: &[&TableColumn]) -> Vec<Option<String>> {
    rows.iter()
        .flat_map(|row| {
            columns
                .iter()
                .map(move |column| row.get(&column.name).and_then(|v| encode_value(v, column)))
        })
        .collect()
}

/// Splits `rows` so no single INSERT exceeds [`MAX_BIND_PARAMS`].
pub fn insert_batches(rows: &[Record], column_count: usize) -> std::slice::Chunks<'_, Record> {
    rows.chunks(rows_per_statement(column_count).max(1))
}

/// Text form of `value` for a `CAST($n AS <column type>)` parameter.
pub fn encode_value(value: &Value, column: &TableColumn) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) if column.is_array() => Some(pg_array_literal(items)),
        other => Some(other.to_string()),
    }
}

pub fn pg_array_literal(items: &[Value]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Null => "NULL".to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::String(s) => quote_array_element(s),
            other => quote_array_element(&other.to_string()),
        })
        .collect();
    format!("{{{}}}", elements.join(","))
}

fn quote_array_element(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn cast_param(index: usize, column: &TableColumn) -> String {
    format!("CAST(${} AS {})", index, column.sql_type)
}

/// Multi-row `INSERT` with `rows` value tuples over `columns`.
pub fn insert_statement(schema: &str, table: &str, columns: &[&TableColumn], rows: usize) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();

    let tuples: Vec<String> = (0..rows)
        .map(|row| {
            let params: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(i, column)| cast_param(row * columns.len() + i + 1, column))
                .collect();
            format!("({})", params.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualified(schema, table),
        cols.join(", "),
        tuples.join(", ")
    )
}

/// How many rows of `column_count` values fit in one statement.
pub fn rows_per_statement(column_count: usize) -> usize {
    if column_count == 0 {
        return 0;
    }
    (MAX_BIND_PARAMS / column_count).max(1)
}

/// `"id"::text = $first AND "key"::text = $first+1 ...`
pub fn item_predicate(secondary: &[(&str, &str)], first_param: usize) -> String {
    let mut clauses = vec![format!("{}::text = ${}", quote_ident("id"), first_param)];
    for (offset, (key, _)) in secondary.iter().enumerate() {
        clauses.push(format!(
            "{}::text = ${}",
            quote_ident(key),
            first_param + offset + 1
        ));
    }
    clauses.join(" AND ")
}

pub fn delete_statement(schema: &str, table: &str, secondary: &[(&str, &str)]) -> String {
    format!(
        "DELETE FROM {} WHERE {}",
        qualified(schema, table),
        item_predicate(secondary, 1)
    )
}

pub fn select_item_statement(schema: &str, table: &str, secondary: &[(&str, &str)]) -> String {
    format!(
        "SELECT row_to_json(t)::text FROM {} AS t WHERE {} LIMIT 1",
        qualified(schema, table),
        item_predicate(secondary, 1)
    )
}

pub fn update_column_statement(schema: &str, table: &str, column: &TableColumn) -> String {
    format!(
        "UPDATE {} SET {} = {} WHERE {}",
        qualified(schema, table),
        quote_ident(&column.name),
        cast_param(1, column),
        item_predicate(&[], 2)
    )
}

pub fn refresh_view_statement(schema: &str, view: &str) -> String {
    format!("REFRESH MATERIALIZED VIEW {}", qualified(schema, view))
}

pub fn truncate_statement(schema: &str, table: &str) -> String {
    format!("TRUNCATE {}", qualified(schema, table))
}

pub fn backup_table_name(table: &str) -> String {
    format!("{}_backup", table)
}

/// Replace `target` with a full copy of `source`.
pub fn copy_table_statements(schema: &str, source: &str, target: &str) -> [String; 2] {
    [
        format!("DROP TABLE IF EXISTS {}", qualified(schema, target)),
        format!(
            "CREATE TABLE {} AS SELECT * FROM {}",
            qualified(schema, target),
            qualified(schema, source)
        ),
    ]
}

/// Refill `target` from `source` in place. The table itself, with its
/// indexes, constraints, grants and dependent views, stays untouched.
pub fn restore_table_statements(schema: &str, source: &str, target: &str) -> [String; 2] {
    [
        truncate_statement(schema, target),
        format!(
            "INSERT INTO {} SELECT * FROM {}",
            qualified(schema, target),
            qualified(schema, source)
        ),
    ]
}

pub fn last_event_load_statement(schema: &str) -> String {
    format!(
        "SELECT max({})::text FROM {} WHERE {} IS NOT NULL",
        quote_ident("load_datetime"),
        qualified(schema, "events"),
        quote_ident("start_datetime")
    )
}

/// Parses the text form of a `timestamp` or `timestamptz`. Timestamps
/// without a zone are taken as UTC, which is how the loader writes them.
pub fn parse_db_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
