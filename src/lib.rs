//! # a3s-audit
//!
//! Best-effort audit trail for relational data-access layers.
//!
//! ## Overview
//!
//! `a3s-audit` hooks into the create/update/delete lifecycle of a data-access
//! layer and writes one `AuditRecord` per mutation: the table, the action,
//! the entity's state after the operation and the row's state before it.
//! Audit failures never reach the caller; the primary operation always
//! behaves as if auditing were absent.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_audit::provider::memory::MemoryDatabase;
//! use a3s_audit::{register_audit_hooks, Entity, EntitySchema, KeyValue};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Widget {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for Widget {
//!     fn schema() -> EntitySchema {
//!         EntitySchema::of::<Widget>("Widget", "widgets", ["id"])
//!     }
//!
//!     fn key_value(&self, column: &str) -> Option<KeyValue> {
//!         (column == "id").then(|| KeyValue::Int(self.id))
//!     }
//! }
//!
//! # async fn example() -> a3s_audit::Result<()> {
//! let db = MemoryDatabase::new();
//! db.register_entity::<Widget>()?;
//! register_audit_hooks(db.hooks())?;
//!
//! let mut widget = Widget { id: 7, name: "a".to_string() };
//! db.create(&mut widget).await?;
//!
//! let records = db.audit_records().await;
//! assert_eq!(records[0].table_name, "widgets");
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - **memory**: In-process data-access layer with hook-driven commits
//! - **postgres**: Isolated sessions over a `deadpool-postgres` pool
//!
//! ## Architecture
//!
//! - **Entity** trait: table name, primary-key access, JSON snapshots
//! - **HookRegistry**: named lifecycle hooks anchored after the primary stage
//! - **SessionFactory** trait: isolated reads and inserts outside the caller's transaction
//! - **AuditInterceptor**: eligibility guard, snapshot capture, record persistence

pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod interceptor;
pub mod provider;
pub mod schema;
pub mod types;

// Re-export core types
pub use config::{AuditConfig, PartialKeyPolicy, PostgresConfig};
pub use context::OperationContext;
pub use entity::{Entity, EntitySchema, Snapshot};
pub use error::{AuditError, Result};
pub use hooks::{Hook, HookRegistry, LifecyclePoint};
pub use interceptor::{
    register_audit_hooks, register_audit_hooks_with, AuditInterceptor, AuditObserver,
    MemoryObserver, TracingObserver,
};
pub use provider::{IsolatedSession, SessionFactory};
pub use schema::{MemorySchemaRegistry, SchemaRegistry};
pub use types::{
    AuditAction, AuditOutcome, AuditRecord, KeyPredicate, KeyValue, SkipReason, AUDIT_ENTITY,
    AUDIT_TABLE,
};

// Re-export providers for convenience
pub use provider::memory::{MemoryDatabase, MemorySessions};
pub use provider::postgres::{PostgresSession, PostgresSessions};
