//! Pooled postgres session used for isolated lookups and audit inserts

use super::sql;
use crate::error::{AuditError, Result};
use crate::provider::IsolatedSession;
use crate::types::{AuditRecord, KeyPredicate, KeyValue};
use async_trait::async_trait;
use tokio_postgres::types::ToSql;

/// One pooled connection in autocommit mode
///
/// Never shares a transaction with the caller: every statement commits on
/// its own, and reads see committed rows only.
pub struct PostgresSession {
    client: deadpool_postgres::Object,
    audit_table: String,
}

impl PostgresSession {
    pub(super) fn new(client: deadpool_postgres::Object, audit_table: String) -> Self {
        Self {
            client,
            audit_table,
        }
    }
}

fn key_param(value: &KeyValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        KeyValue::Int(v) => Box::new(*v),
        KeyValue::Uuid(v) => Box::new(*v),
        KeyValue::Text(v) => Box::new(v.clone()),
        KeyValue::Null => Box::new(None::<String>),
    }
}

fn json_column(bytes: Option<&[u8]>) -> Option<serde_json::Value> {
    bytes
        .filter(|b| !b.is_empty())
        .and_then(|b| serde_json::from_slice(b).ok())
}

#[async_trait]
impl IsolatedSession for PostgresSession {
    async fn find_one(
        &mut self,
        table: &str,
        predicate: &KeyPredicate,
    ) -> Result<Option<serde_json::Value>> {
        if predicate.is_empty() {
            return Ok(None);
        }

        let query = sql::select_by_key(table, predicate);
        let params: Vec<Box<dyn ToSql + Sync + Send>> =
            predicate.iter().map(|(_, v)| key_param(v)).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let row = self
            .client
            .query_opt(query.as_str(), &refs)
            .await
            .map_err(|e| AuditError::Lookup {
                table: table.to_string(),
                reason: e.to_string(),
            })?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get(0)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn insert_audit(&mut self, record: &AuditRecord) -> Result<u64> {
        let query = sql::insert_audit(&self.audit_table);
        let new_data = json_column(record.new_state.as_deref());
        let old_data = json_column(record.prior_state.as_deref());

        let row = self
            .client
            .query_one(
                query.as_str(),
                &[
                    &record.table_name,
                    &record.action.as_str(),
                    &new_data,
                    &old_data,
                    &record.created_at,
                ],
            )
            .await
            .map_err(|e| AuditError::Persist {
                table: record.table_name.clone(),
                reason: e.to_string(),
            })?;

        let id: i64 = row.try_get(0)?;
        u64::try_from(id).map_err(|_| AuditError::Persist {
            table: record.table_name.clone(),
            reason: format!("negative audit id {}", id),
        })
    }
}
