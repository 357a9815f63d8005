//! In-memory data-access layer
//!
//! A small single-process persistence layer that drives lifecycle hooks the
//! way a relational ORM does: each mutation is staged, the hook chain for its
//! lifecycle point runs, then the staged write commits (or is discarded when
//! the primary stage failed). Isolated sessions only ever see committed rows,
//! so a hook's lookup observes the state before the in-flight mutation.
//!
//! Mutations are serialized by a writer gate held from staging through
//! commit, so existence checks stay valid while hooks run. Hooks must not
//! write through the same database; isolated sessions never take the gate.
//!
//! Intended for tests and embedded use. Data is lost on drop.

use crate::context::OperationContext;
use crate::entity::{Entity, EntitySchema, Snapshot};
use crate::error::{AuditError, Result};
use crate::hooks::{HookRegistry, LifecyclePoint};
use crate::provider::{IsolatedSession, SessionFactory};
use crate::schema::{MemorySchemaRegistry, SchemaRegistry};
use crate::types::{AuditRecord, KeyPredicate, KeyValue};
use async_trait::async_trait;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct MemoryState {
    /// table → committed rows
    tables: HashMap<String, Vec<serde_json::Value>>,

    /// table → last generated integer key
    sequences: HashMap<String, i64>,

    /// Audit records, in insert order
    audit: Vec<AuditRecord>,
}

#[derive(Default)]
struct Faults {
    fail_audit_inserts: AtomicBool,
    fail_lookups: AtomicBool,
}

/// Isolated-session factory over the committed state
#[derive(Clone)]
pub struct MemorySessions {
    state: Arc<RwLock<MemoryState>>,
    faults: Arc<Faults>,
}

#[async_trait]
impl SessionFactory for MemorySessions {
    async fn isolated(&self) -> Result<Box<dyn IsolatedSession>> {
        Ok(Box::new(MemorySession {
            state: self.state.clone(),
            faults: self.faults.clone(),
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySession {
    state: Arc<RwLock<MemoryState>>,
    faults: Arc<Faults>,
}

#[async_trait]
impl IsolatedSession for MemorySession {
    async fn find_one(
        &mut self,
        table: &str,
        predicate: &KeyPredicate,
    ) -> Result<Option<serde_json::Value>> {
        if self.faults.fail_lookups.load(Ordering::SeqCst) {
            return Err(AuditError::Lookup {
                table: table.to_string(),
                reason: "injected lookup failure".to_string(),
            });
        }

        let state = self.state.read().await;
        Ok(state
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| predicate.matches(row)))
            .cloned())
    }

    async fn insert_audit(&mut self, record: &AuditRecord) -> Result<u64> {
        if self.faults.fail_audit_inserts.load(Ordering::SeqCst) {
            return Err(AuditError::Persist {
                table: record.table_name.clone(),
                reason: "injected insert failure".to_string(),
            });
        }

        let mut state = self.state.write().await;
        let id = state.audit.len() as u64 + 1;
        let mut stored = record.clone();
        stored.id = id;
        state.audit.push(stored);
        Ok(id)
    }
}

/// A write prepared by the primary stage, applied on commit
enum StagedWrite {
    Insert {
        table: String,
        row: serde_json::Value,
    },
    Replace {
        table: String,
        predicate: KeyPredicate,
        row: serde_json::Value,
    },
    Remove {
        table: String,
        predicate: KeyPredicate,
    },
}

/// In-memory database with ORM-style lifecycle hooks
pub struct MemoryDatabase {
    schemas: MemorySchemaRegistry,
    hooks: HookRegistry,
    sessions: MemorySessions,

    /// Held across stage, hooks and commit of one mutation
    writer: Mutex<()>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Create an empty database with no hooks
    pub fn new() -> Self {
        Self {
            schemas: MemorySchemaRegistry::new(),
            hooks: HookRegistry::new(),
            sessions: MemorySessions {
                state: Arc::new(RwLock::new(MemoryState::default())),
                faults: Arc::new(Faults::default()),
            },
            writer: Mutex::new(()),
        }
    }

    /// Make an entity type known to the schema registry
    pub fn register_entity<E: Entity + 'static>(&self) -> Result<()> {
        self.schemas.register(E::schema())
    }

    /// The lifecycle hook registry
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// The schema registry
    pub fn schemas(&self) -> &dyn SchemaRegistry {
        &self.schemas
    }

    /// Isolated-session factory over committed state
    pub fn sessions(&self) -> &MemorySessions {
        &self.sessions
    }

    /// Make every audit insert through isolated sessions fail
    pub fn fail_audit_inserts(&self, fail: bool) {
        self.sessions
            .faults
            .fail_audit_inserts
            .store(fail, Ordering::SeqCst);
    }

    /// Make every lookup through isolated sessions fail
    pub fn fail_lookups(&self, fail: bool) {
        self.sessions.faults.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Insert an entity, assigning an integer key when its single key is unset
    pub async fn create<E: Entity + 'static>(&self, entity: &mut E) -> Result<()> {
        let schema = E::schema();
        let resolved = self.schemas.get(TypeId::of::<E>())?;
        let _writer = self.writer.lock().await;
        let staged = self.stage_create(&schema, entity).await;
        self.finish(LifecyclePoint::Create, resolved, &*entity, staged).await
    }

    /// Replace the stored row with the entity's current state
    pub async fn update<E: Entity + 'static>(&self, entity: &E) -> Result<()> {
        let schema = E::schema();
        let resolved = self.schemas.get(TypeId::of::<E>())?;
        let _writer = self.writer.lock().await;
        let staged = self.stage_update(&schema, entity).await;
        self.finish(LifecyclePoint::Update, resolved, entity, staged).await
    }

    /// Remove the stored row matching the entity's key
    pub async fn delete<E: Entity + 'static>(&self, entity: &E) -> Result<()> {
        let schema = E::schema();
        let resolved = self.schemas.get(TypeId::of::<E>())?;
        let _writer = self.writer.lock().await;
        let staged = self.stage_delete(&schema, entity).await;
        self.finish(LifecyclePoint::Delete, resolved, entity, staged).await
    }

    /// Fetch a committed row
    pub async fn row(&self, table: &str, predicate: &KeyPredicate) -> Option<serde_json::Value> {
        let state = self.sessions.state.read().await;
        state
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| predicate.matches(row)))
            .cloned()
    }

    /// Number of committed rows in a table
    pub async fn row_count(&self, table: &str) -> usize {
        let state = self.sessions.state.read().await;
        state.tables.get(table).map(Vec::len).unwrap_or(0)
    }

    /// All audit records written so far, oldest first
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.sessions.state.read().await.audit.clone()
    }

    /// Run the hook chain for a staged write, then commit or discard it
    ///
    /// `resolved` is the registry's schema for the entity type; it is `None`
    /// for unregistered types even though the write itself proceeds.
    async fn finish(
        &self,
        point: LifecyclePoint,
        resolved: Option<Arc<EntitySchema>>,
        entity: &dyn Entity,
        staged: Result<StagedWrite>,
    ) -> Result<()> {
        match staged {
            Ok(write) => {
                let ctx = OperationContext::new(point, resolved, entity, &self.sessions);
                self.hooks.run(&ctx).await;
                self.commit(write).await;
                Ok(())
            }
            Err(e) => {
                let ctx =
                    OperationContext::new(point, resolved, entity, &self.sessions).with_error(&e);
                self.hooks.run(&ctx).await;
                tracing::debug!(point = %point, error = %e, "Primary operation failed");
                Err(e)
            }
        }
    }

    async fn commit(&self, write: StagedWrite) {
        let mut state = self.sessions.state.write().await;
        match write {
            StagedWrite::Insert { table, row } => {
                state.tables.entry(table).or_default().push(row);
            }
            StagedWrite::Replace {
                table,
                predicate,
                row,
            } => {
                if let Some(existing) = state
                    .tables
                    .get_mut(&table)
                    .and_then(|rows| rows.iter_mut().find(|r| predicate.matches(r)))
                {
                    *existing = row;
                }
            }
            StagedWrite::Remove { table, predicate } => {
                if let Some(rows) = state.tables.get_mut(&table) {
                    rows.retain(|r| !predicate.matches(r));
                }
            }
        }
    }

    async fn stage_create<E: Entity>(
        &self,
        schema: &EntitySchema,
        entity: &mut E,
    ) -> Result<StagedWrite> {
        if let [field] = schema.primary_fields.as_slice() {
            let unset = entity.key_value(field).map(|v| v.is_zero()).unwrap_or(true);
            if unset {
                let id = self.next_key(&schema.table, field).await;
                entity.assign_generated_key(KeyValue::Int(id));
            }
        }

        let predicate = full_key(schema, &*entity)?;
        let row = entity.snapshot_value()?;

        if self.row(&schema.table, &predicate).await.is_some() {
            return Err(AuditError::Conflict(format!(
                "{} already has a row where {}",
                schema.table, predicate
            )));
        }

        Ok(StagedWrite::Insert {
            table: schema.table.clone(),
            row,
        })
    }

    async fn stage_update<E: Entity>(&self, schema: &EntitySchema, entity: &E) -> Result<StagedWrite> {
        let predicate = full_key(schema, entity)?;
        let row = entity.snapshot_value()?;

        if self.row(&schema.table, &predicate).await.is_none() {
            return Err(AuditError::NotFound(format!(
                "{} has no row where {}",
                schema.table, predicate
            )));
        }

        Ok(StagedWrite::Replace {
            table: schema.table.clone(),
            predicate,
            row,
        })
    }

    async fn stage_delete<E: Entity>(&self, schema: &EntitySchema, entity: &E) -> Result<StagedWrite> {
        let predicate = full_key(schema, entity)?;

        if self.row(&schema.table, &predicate).await.is_none() {
            return Err(AuditError::NotFound(format!(
                "{} has no row where {}",
                schema.table, predicate
            )));
        }

        Ok(StagedWrite::Remove {
            table: schema.table.clone(),
            predicate,
        })
    }

    /// Allocate the next integer key; allocations are not rolled back
    async fn next_key(&self, table: &str, column: &str) -> i64 {
        let mut state = self.sessions.state.write().await;
        let max_stored = state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter_map(|r| r.get(column).and_then(|v| v.as_i64()))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        let seq = state.sequences.entry(table.to_string()).or_insert(0);
        *seq = (*seq).max(max_stored) + 1;
        *seq
    }
}

/// Equality predicate over every primary-key column
///
/// The primary path never narrows: an unset component is an error.
fn full_key(schema: &EntitySchema, entity: &dyn Entity) -> Result<KeyPredicate> {
    let mut predicate = KeyPredicate::new();
    for (column, value) in schema.key_values(entity) {
        if value.is_zero() {
            return Err(AuditError::Config(format!(
                "{}.{} must be set",
                schema.table, column
            )));
        }
        predicate.push(column, value);
    }
    Ok(predicate)
}
