//! Session providers: isolated read/write paths into the persistence layer
//!
//! The audit interceptor never touches the caller's session. It asks a
//! `SessionFactory` for an isolated session, independent of the in-flight
//! operation's transaction, for each prior-state lookup and each insert.

use crate::error::Result;
use crate::types::{AuditRecord, KeyPredicate};
use async_trait::async_trait;

pub mod memory;
pub mod postgres;

/// Hands out sessions isolated from any caller transaction
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a fresh isolated session
    async fn isolated(&self) -> Result<Box<dyn IsolatedSession>>;

    /// Provider name (e.g., "memory", "postgres")
    fn name(&self) -> &str {
        "unknown"
    }

    /// Table that `insert_audit` writes to, when the provider stores records in one
    ///
    /// The interceptor never audits mutations of this table.
    fn audit_table(&self) -> Option<&str> {
        None
    }
}

/// A unit of work outside the triggering operation
///
/// Reads observe committed state only. Writes are committed on their own
/// and are not seen by the data-access layer's lifecycle hooks.
#[async_trait]
pub trait IsolatedSession: Send {
    /// Fetch the first row of `table` matching every predicate component
    ///
    /// Returns the row as a JSON object keyed by column name.
    async fn find_one(
        &mut self,
        table: &str,
        predicate: &KeyPredicate,
    ) -> Result<Option<serde_json::Value>>;

    /// Insert an audit record, returning the storage-assigned id
    async fn insert_audit(&mut self, record: &AuditRecord) -> Result<u64>;
}
