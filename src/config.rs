//! Configuration for the audit interceptor and its backends

use crate::types::{AuditAction, AUDIT_ENTITY, AUDIT_TABLE};
use serde::{Deserialize, Serialize};

/// How a composite primary key with some zero-valued components is looked up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialKeyPolicy {
    /// Skip the prior-state lookup unless every key component is set
    #[default]
    RequireAll,
    /// Look up by the non-zero components only
    ///
    /// May match a different row than intended when some components are unset.
    Narrow,
}

/// Audit interceptor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditConfig {
    /// Table audit records are written to; mutations on it are never audited
    pub audit_table: String,

    /// Entity name of the audit record; mutations on it are never audited
    pub audit_entity: String,

    /// Prefix for registered hook names (`<prefix>:create`, ...)
    pub hook_prefix: String,

    /// Actions to record
    pub actions: Vec<AuditAction>,

    /// Composite-key lookup policy
    pub partial_keys: PartialKeyPolicy,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            audit_table: AUDIT_TABLE.to_string(),
            audit_entity: AUDIT_ENTITY.to_string(),
            hook_prefix: "audit".to_string(),
            actions: AuditAction::ALL.to_vec(),
            partial_keys: PartialKeyPolicy::default(),
        }
    }
}

impl AuditConfig {
    /// Restrict auditing to the given actions
    pub fn with_actions(mut self, actions: impl IntoIterator<Item = AuditAction>) -> Self {
        self.actions = actions.into_iter().collect();
        self
    }

    /// Set the composite-key lookup policy
    pub fn with_partial_keys(mut self, policy: PartialKeyPolicy) -> Self {
        self.partial_keys = policy;
        self
    }

    /// Use a different audit table
    pub fn with_audit_table(mut self, table: impl Into<String>) -> Self {
        self.audit_table = table.into();
        self
    }

    /// Name of the hook registered for an action
    pub fn hook_name(&self, action: AuditAction) -> String {
        format!("{}:{}", self.hook_prefix, action.as_str().to_ascii_lowercase())
    }

    /// Whether an action is recorded
    pub fn records(&self, action: AuditAction) -> bool {
        self.actions.contains(&action)
    }
}

/// PostgreSQL connection settings for isolated audit sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,

    /// Maximum pooled connections
    pub max_pool_size: usize,

    /// Seconds to wait for a pooled connection before giving up
    pub wait_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            max_pool_size: 4,
            wait_timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.audit_table, "audit_logs");
        assert_eq!(config.audit_entity, "AuditLog");
        assert_eq!(config.partial_keys, PartialKeyPolicy::RequireAll);
        assert!(AuditAction::ALL.iter().all(|a| config.records(*a)));
    }

    #[test]
    fn test_hook_names() {
        let config = AuditConfig::default();
        assert_eq!(config.hook_name(AuditAction::Create), "audit:create");
        assert_eq!(config.hook_name(AuditAction::Delete), "audit:delete");

        let custom = AuditConfig {
            hook_prefix: "compliance".to_string(),
            ..Default::default()
        };
        assert_eq!(custom.hook_name(AuditAction::Update), "compliance:update");
    }

    #[test]
    fn test_with_actions() {
        let config = AuditConfig::default().with_actions([AuditAction::Delete]);
        assert!(config.records(AuditAction::Delete));
        assert!(!config.records(AuditAction::Create));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: AuditConfig = serde_json::from_str(
            r#"{"auditTable": "audit_trail", "partialKeys": "narrow", "actions": ["CREATE"]}"#,
        )
        .unwrap();
        assert_eq!(config.audit_table, "audit_trail");
        assert_eq!(config.audit_entity, "AuditLog");
        assert_eq!(config.partial_keys, PartialKeyPolicy::Narrow);
        assert_eq!(config.actions, vec![AuditAction::Create]);
    }

    #[test]
    fn test_postgres_defaults() {
        let pg: PostgresConfig = serde_json::from_str(r#"{"database": "app"}"#).unwrap();
        assert_eq!(pg.port, 5432);
        assert_eq!(pg.database, "app");
        assert_eq!(pg.max_pool_size, 4);
    }
}
