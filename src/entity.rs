//! Describable entities, the capability the interceptor depends on
//!
//! Any persisted type becomes auditable by implementing `Entity`: it names
//! its table and primary-key columns and hands out key values by column.
//! Snapshotting comes for free for every `Serialize` type.

use crate::error::Result;
use crate::types::KeyValue;
use serde::Serialize;
use std::any::TypeId;

/// Serialize an entity into an opaque snapshot
///
/// Object-safe so hooks can snapshot `&dyn Entity`. Implemented for every
/// `Serialize` type; failures are reported, never panicked.
pub trait Snapshot: Send + Sync {
    /// Encode the current state as JSON bytes
    fn snapshot(&self) -> Result<Vec<u8>>;

    /// Encode the current state as a JSON value
    fn snapshot_value(&self) -> Result<serde_json::Value>;
}

impl<T: Serialize + Send + Sync> Snapshot for T {
    fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn snapshot_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A persisted type the audit interceptor can describe generically
pub trait Entity: Snapshot {
    /// Static schema metadata for this type
    fn schema() -> EntitySchema
    where
        Self: Sized;

    /// Current value of a primary-key column, if the column is known
    fn key_value(&self, column: &str) -> Option<KeyValue>;

    /// Receive a storage-generated key after insert
    ///
    /// Default is a no-op for entities with caller-assigned keys.
    fn assign_generated_key(&mut self, _key: KeyValue) {}
}

/// Structural description of an entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    /// Rust type identity, used by the recursion guard
    pub type_id: TypeId,

    /// Logical entity name (e.g., "Widget")
    pub name: String,

    /// Backing table (e.g., "widgets")
    pub table: String,

    /// Primary-key column names, in key order
    pub primary_fields: Vec<String>,
}

impl EntitySchema {
    /// Describe type `T`
    pub fn of<T: 'static>(
        name: impl Into<String>,
        table: impl Into<String>,
        primary_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: name.into(),
            table: table.into(),
            primary_fields: primary_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this schema describes type `T`
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Read every primary-key component from an instance
    ///
    /// Columns the entity cannot resolve come back as `KeyValue::Null`.
    pub fn key_values(&self, entity: &dyn Entity) -> Vec<(String, KeyValue)> {
        self.primary_fields
            .iter()
            .map(|field| {
                let value = entity.key_value(field).unwrap_or(KeyValue::Null);
                (field.clone(), value)
            })
            .collect()
    }
}
