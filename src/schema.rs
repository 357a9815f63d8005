//! Entity schema registry: resolve metadata for registered entity types
//!
//! The data-access layer resolves an operation's schema here before running
//! lifecycle hooks. An unregistered type resolves to `None`, which the audit
//! interceptor treats as "nothing safe to snapshot".

use crate::error::{AuditError, Result};
use crate::entity::EntitySchema;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Trait for entity schema registries
pub trait SchemaRegistry: Send + Sync {
    /// Register (or replace) the schema for an entity type
    fn register(&self, schema: EntitySchema) -> Result<()>;

    /// Resolve the schema for a type
    fn get(&self, type_id: TypeId) -> Result<Option<Arc<EntitySchema>>>;

    /// Resolve the schema by logical entity name
    fn get_by_name(&self, name: &str) -> Result<Option<Arc<EntitySchema>>>;

    /// List all registered tables, sorted
    fn list_tables(&self) -> Result<Vec<String>>;
}

/// In-memory schema registry
///
/// Stores schemas in a `HashMap` protected by `RwLock`.
pub struct MemorySchemaRegistry {
    /// type → schema
    schemas: RwLock<HashMap<TypeId, Arc<EntitySchema>>>,
}

impl MemorySchemaRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned(e: impl std::fmt::Display) -> AuditError {
    AuditError::Config(format!("Schema registry lock poisoned: {}", e))
}

impl SchemaRegistry for MemorySchemaRegistry {
    fn register(&self, schema: EntitySchema) -> Result<()> {
        if schema.name.is_empty() {
            return Err(AuditError::Config("Entity name cannot be empty".to_string()));
        }
        if schema.table.is_empty() {
            return Err(AuditError::Config(format!(
                "Entity '{}' has no table name",
                schema.name
            )));
        }
        if schema.primary_fields.is_empty() {
            return Err(AuditError::Config(format!(
                "Entity '{}' declares no primary-key fields",
                schema.name
            )));
        }

        let mut schemas = self.schemas.write().map_err(poisoned)?;
        if let Some(other) = schemas
            .values()
            .find(|s| s.table == schema.table && s.type_id != schema.type_id)
        {
            return Err(AuditError::Config(format!(
                "Table '{}' is already mapped to entity '{}'",
                schema.table, other.name
            )));
        }

        tracing::debug!(entity = %schema.name, table = %schema.table, "Entity schema registered");
        schemas.insert(schema.type_id, Arc::new(schema));
        Ok(())
    }

    fn get(&self, type_id: TypeId) -> Result<Option<Arc<EntitySchema>>> {
        let schemas = self.schemas.read().map_err(poisoned)?;
        Ok(schemas.get(&type_id).cloned())
    }

    fn get_by_name(&self, name: &str) -> Result<Option<Arc<EntitySchema>>> {
        let schemas = self.schemas.read().map_err(poisoned)?;
        Ok(schemas.values().find(|s| s.name == name).cloned())
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        let schemas = self.schemas.read().map_err(poisoned)?;
        let mut tables: Vec<String> = schemas.values().map(|s| s.table.clone()).collect();
        tables.sort();
        Ok(tables)
    }
}
