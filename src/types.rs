//! Core audit types for the a3s-audit system
//!
//! All serialized types use camelCase JSON for wire compatibility.

use crate::entity::{Entity, EntitySchema};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default table the audit records are written to
pub const AUDIT_TABLE: &str = "audit_logs";

/// Entity name of the audit record itself
pub const AUDIT_ENTITY: &str = "AuditLog";

/// Mutation kind recorded on an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    /// All actions, in lifecycle order
    pub const ALL: [AuditAction; 3] = [AuditAction::Create, AuditAction::Update, AuditAction::Delete];

    /// Upper-case tag stored in the `action` column
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }

    /// Whether the post-operation entity is snapshotted
    pub fn captures_new_state(&self) -> bool {
        matches!(self, AuditAction::Create | AuditAction::Update)
    }

    /// Whether the pre-operation row is looked up
    pub fn captures_prior_state(&self) -> bool {
        matches!(self, AuditAction::Update | AuditAction::Delete)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            other => Err(format!("Unknown audit action: {}", other)),
        }
    }
}

/// A single audit record
///
/// Produced once per intercepted mutation and never modified afterwards.
/// Snapshots are opaque JSON bytes; `None` means the state was not
/// captured (not applicable for the action, not found, or not serializable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Storage-assigned identifier (0 until inserted)
    #[serde(default)]
    pub id: u64,

    /// Table the mutation targeted
    pub table_name: String,

    /// Which lifecycle hook produced this record
    pub action: AuditAction,

    /// Entity state after the operation (CREATE, UPDATE)
    pub new_state: Option<Vec<u8>>,

    /// Row state before the operation (UPDATE, DELETE)
    pub prior_state: Option<Vec<u8>>,

    /// When the record was produced
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a record stamped with the current time
    pub fn new(
        table_name: impl Into<String>,
        action: AuditAction,
        new_state: Option<Vec<u8>>,
        prior_state: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id: 0,
            table_name: table_name.into(),
            action,
            new_state,
            prior_state,
            created_at: Utc::now(),
        }
    }

    /// Decode the new-state snapshot as JSON
    pub fn new_state_json(&self) -> Option<serde_json::Value> {
        decode_snapshot(self.new_state.as_deref())
    }

    /// Decode the prior-state snapshot as JSON
    pub fn prior_state_json(&self) -> Option<serde_json::Value> {
        decode_snapshot(self.prior_state.as_deref())
    }
}

fn decode_snapshot(bytes: Option<&[u8]>) -> Option<serde_json::Value> {
    bytes
        .filter(|b| !b.is_empty())
        .and_then(|b| serde_json::from_slice(b).ok())
}

impl Entity for AuditRecord {
    fn schema() -> EntitySchema {
        EntitySchema::of::<AuditRecord>(AUDIT_ENTITY, AUDIT_TABLE, ["id"])
    }

    fn key_value(&self, column: &str) -> Option<KeyValue> {
        match column {
            "id" => i64::try_from(self.id).ok().map(KeyValue::Int),
            _ => None,
        }
    }

    fn assign_generated_key(&mut self, key: KeyValue) {
        if let KeyValue::Int(id) = key {
            self.id = u64::try_from(id).unwrap_or_default();
        }
    }
}

/// A primary-key component value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Null,
    Int(i64),
    Uuid(uuid::Uuid),
    Text(String),
}

impl KeyValue {
    /// Whether this is the type's zero/default value
    pub fn is_zero(&self) -> bool {
        match self {
            KeyValue::Null => true,
            KeyValue::Int(v) => *v == 0,
            KeyValue::Uuid(v) => v.is_nil(),
            KeyValue::Text(v) => v.is_empty(),
        }
    }

    /// JSON representation, as it appears in a serialized row
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            KeyValue::Null => serde_json::Value::Null,
            KeyValue::Int(v) => serde_json::Value::from(*v),
            KeyValue::Uuid(v) => serde_json::Value::String(v.to_string()),
            KeyValue::Text(v) => serde_json::Value::String(v.clone()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Null => f.write_str("NULL"),
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Uuid(v) => write!(f, "{}", v),
            KeyValue::Text(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Int(v.into())
    }
}

impl From<u32> for KeyValue {
    fn from(v: u32) -> Self {
        KeyValue::Int(v.into())
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Text(v)
    }
}

impl From<uuid::Uuid> for KeyValue {
    fn from(v: uuid::Uuid) -> Self {
        KeyValue::Uuid(v)
    }
}

impl<T: Into<KeyValue>> From<Option<T>> for KeyValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(KeyValue::Null)
    }
}

/// Equality predicate over primary-key columns
///
/// Components are kept in schema order so generated SQL is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPredicate {
    components: Vec<(String, KeyValue)>,
}

impl KeyPredicate {
    /// Create an empty predicate
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality component
    pub fn with(mut self, column: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        self.push(column, value);
        self
    }

    /// Add an equality component in place
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<KeyValue>) {
        self.components.push((column.into(), value.into()));
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True when no component is present (an unconstrained lookup)
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Iterate over `(column, value)` components
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyValue)> {
        self.components.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Check a JSON row against every component
    ///
    /// An empty predicate matches nothing.
    pub fn matches(&self, row: &serde_json::Value) -> bool {
        !self.is_empty()
            && self
                .iter()
                .all(|(column, value)| row.get(column) == Some(&value.to_json()))
    }
}

impl fmt::Display for KeyPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(c, v)| format!("{} = {}", c, v))
            .collect();
        f.write_str(&parts.join(" AND "))
    }
}

/// Why an interception produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The primary operation already carried an error
    OperationFailed,
    /// No schema metadata was resolved for the entity
    MissingSchema,
    /// The target is the audit table itself
    AuditTable,
    /// The action is disabled in configuration
    ActionDisabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::OperationFailed => "operation failed",
            SkipReason::MissingSchema => "missing schema",
            SkipReason::AuditTable => "audit table",
            SkipReason::ActionDisabled => "action disabled",
        };
        f.write_str(s)
    }
}

/// Result of a single interception
///
/// Reported to the configured observer only, never to the caller of
/// the primary mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// A record was written; `partial` when a snapshot could not be serialized
    Recorded { id: u64, partial: bool },
    /// The operation was not eligible for auditing
    Skipped(SkipReason),
    /// A record was assembled but could not be written
    Failed { reason: String },
}

impl AuditOutcome {
    /// Whether a record was persisted
    pub fn is_recorded(&self) -> bool {
        matches!(self, AuditOutcome::Recorded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_display_and_parse() {
        assert_eq!(AuditAction::Create.to_string(), "CREATE");
        assert_eq!(AuditAction::Update.to_string(), "UPDATE");
        assert_eq!(AuditAction::Delete.to_string(), "DELETE");
        assert_eq!("delete".parse::<AuditAction>().unwrap(), AuditAction::Delete);
        assert!("upsert".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_action_capture_matrix() {
        assert!(AuditAction::Create.captures_new_state());
        assert!(!AuditAction::Create.captures_prior_state());
        assert!(AuditAction::Update.captures_new_state());
        assert!(AuditAction::Update.captures_prior_state());
        assert!(!AuditAction::Delete.captures_new_state());
        assert!(AuditAction::Delete.captures_prior_state());
    }

    #[test]
    fn test_action_serializes_uppercase() {
        assert_eq!(serde_json::to_value(AuditAction::Update).unwrap(), json!("UPDATE"));
    }

    #[test]
    fn test_key_value_zero() {
        assert!(KeyValue::Null.is_zero());
        assert!(KeyValue::Int(0).is_zero());
        assert!(KeyValue::Text(String::new()).is_zero());
        assert!(KeyValue::Uuid(uuid::Uuid::nil()).is_zero());
        assert!(!KeyValue::Int(7).is_zero());
        assert!(!KeyValue::from("w-1").is_zero());
        assert!(!KeyValue::Uuid(uuid::Uuid::new_v4()).is_zero());
        assert_eq!(KeyValue::from(None::<i64>), KeyValue::Null);
    }

    #[test]
    fn test_predicate_matches_row() {
        let pred = KeyPredicate::new().with("id", 7).with("region", "eu");
        assert_eq!(pred.len(), 2);
        assert!(pred.matches(&json!({"id": 7, "region": "eu", "name": "a"})));
        assert!(!pred.matches(&json!({"id": 7, "region": "us"})));
        assert!(!pred.matches(&json!({"id": 7})));
        assert_eq!(pred.to_string(), "id = 7 AND region = \"eu\"");
    }

    #[test]
    fn test_empty_predicate_matches_nothing() {
        assert!(!KeyPredicate::new().matches(&json!({"id": 1})));
    }

    #[test]
    fn test_record_decodes_snapshots() {
        let record = AuditRecord::new(
            "widgets",
            AuditAction::Update,
            Some(br#"{"id":7,"name":"b"}"#.to_vec()),
            Some(Vec::new()),
        );
        assert_eq!(record.id, 0);
        assert_eq!(record.new_state_json(), Some(json!({"id": 7, "name": "b"})));
        assert_eq!(record.prior_state_json(), None);
    }

    #[test]
    fn test_audit_record_is_an_entity() {
        let schema = AuditRecord::schema();
        assert_eq!(schema.name, AUDIT_ENTITY);
        assert_eq!(schema.table, AUDIT_TABLE);

        let mut record = AuditRecord::new("widgets", AuditAction::Create, None, None);
        record.assign_generated_key(KeyValue::Int(42));
        assert_eq!(record.key_value("id"), Some(KeyValue::Int(42)));
    }
}
