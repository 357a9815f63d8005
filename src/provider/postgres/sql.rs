//! SQL builders for the postgres provider
//!
//! Identifiers are always double-quoted; values are always bound.

use crate::types::{KeyPredicate, KeyValue};

/// Quote an identifier, keeping `schema.table` qualification
pub fn quote_ident(ident: &str) -> String {
    ident
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Cast applied to a bound key parameter
///
/// Binding with an explicit type lets an `int8` parameter compare against
/// `int2`/`int4` key columns and text against `varchar`.
fn param_cast(value: &KeyValue) -> &'static str {
    match value {
        KeyValue::Int(_) => "int8",
        KeyValue::Uuid(_) => "uuid",
        KeyValue::Text(_) | KeyValue::Null => "text",
    }
}

/// `SELECT row_to_json(t) ... LIMIT 1` for a key predicate
pub fn select_by_key(table: &str, predicate: &KeyPredicate) -> String {
    let conditions: Vec<String> = predicate
        .iter()
        .enumerate()
        .map(|(i, (column, value))| {
            format!(
                "t.{} = ${}::{}",
                quote_ident(column),
                i + 1,
                param_cast(value)
            )
        })
        .collect();

    format!(
        "SELECT row_to_json(t) FROM {} t WHERE {} LIMIT 1",
        quote_ident(table),
        conditions.join(" AND ")
    )
}

/// Insert one audit record, returning its id
pub fn insert_audit(table: &str) -> String {
    format!(
        "INSERT INTO {} (table_name, action, new_data, old_data, created_at) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
        quote_ident(table)
    )
}

/// Idempotent DDL for the audit table and its `table_name` index
pub fn create_audit_table(table: &str) -> String {
    let index = format!("idx_{}_table_name", table.replace('.', "_"));
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    table_name TEXT NOT NULL,
    action TEXT NOT NULL,
    new_data JSONB,
    old_data JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS {index} ON {table} (table_name);
"#,
        table = quote_ident(table),
        index = quote_ident(&index)
    )
}
