//! Audit interceptor
//!
//! One `AuditInterceptor` is registered per action. Each run is a single
//! pass: check eligibility, snapshot the entity and (for update/delete) the
//! prior row, then insert the record through an isolated session. Every
//! failure on that path is absorbed here; the outcome goes to the observer
//! and never back to the data-access layer.

use crate::config::{AuditConfig, PartialKeyPolicy};
use crate::context::OperationContext;
use crate::entity::{Entity, EntitySchema, Snapshot};
use crate::error::Result;
use crate::hooks::{Hook, HookRegistry, LifecyclePoint};
use crate::types::{AuditAction, AuditOutcome, AuditRecord, KeyPredicate, SkipReason};
use async_trait::async_trait;
use std::any::TypeId;
use std::sync::{Arc, Mutex};

/// Receives the outcome of every interception
///
/// Observers cannot influence the primary operation.
pub trait AuditObserver: Send + Sync {
    /// Called once per interception; `table` is `None` when no schema resolved
    fn observe(&self, table: Option<&str>, action: AuditAction, outcome: &AuditOutcome);
}

/// Default observer: emits structured tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AuditObserver for TracingObserver {
    fn observe(&self, table: Option<&str>, action: AuditAction, outcome: &AuditOutcome) {
        let table = table.unwrap_or("<unresolved>");
        match outcome {
            AuditOutcome::Recorded { id, partial } => {
                tracing::debug!(table = %table, action = %action, id, partial, "Audit record written");
            }
            AuditOutcome::Skipped(reason) => {
                tracing::trace!(table = %table, action = %action, reason = %reason, "Audit skipped");
            }
            AuditOutcome::Failed { reason } => {
                tracing::warn!(table = %table, action = %action, error = %reason, "Audit record dropped");
            }
        }
    }
}

/// Observer that keeps every outcome in memory, for tests and diagnostics
#[derive(Debug, Default)]
pub struct MemoryObserver {
    outcomes: Mutex<Vec<(Option<String>, AuditAction, AuditOutcome)>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// All observed outcomes, oldest first
    pub fn outcomes(&self) -> Vec<(Option<String>, AuditAction, AuditOutcome)> {
        self.outcomes
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default()
    }

    /// The most recent outcome
    pub fn last(&self) -> Option<AuditOutcome> {
        self.outcomes
            .lock()
            .ok()
            .and_then(|o| o.last().map(|(_, _, outcome)| outcome.clone()))
    }
}

impl AuditObserver for MemoryObserver {
    fn observe(&self, table: Option<&str>, action: AuditAction, outcome: &AuditOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push((table.map(str::to_string), action, outcome.clone()));
        }
    }
}

/// Lifecycle hook that writes one audit record per eligible mutation
pub struct AuditInterceptor {
    action: AuditAction,
    config: Arc<AuditConfig>,
    observer: Arc<dyn AuditObserver>,
}

impl AuditInterceptor {
    /// Create an interceptor for one action
    pub fn new(
        action: AuditAction,
        config: Arc<AuditConfig>,
        observer: Arc<dyn AuditObserver>,
    ) -> Self {
        Self {
            action,
            config,
            observer,
        }
    }

    /// The action this interceptor records
    pub fn action(&self) -> AuditAction {
        self.action
    }

    /// Run the guard → capture → persist pass
    pub async fn intercept(&self, ctx: &OperationContext<'_>) -> AuditOutcome {
        let schema = match self.eligible(ctx) {
            Ok(schema) => schema,
            Err(reason) => {
                let outcome = AuditOutcome::Skipped(reason);
                let table = ctx.schema.as_ref().map(|s| s.table.as_str());
                self.observer.observe(table, self.action, &outcome);
                return outcome;
            }
        };

        let mut partial = false;

        let new_state = if self.action.captures_new_state() {
            match ctx.entity.snapshot() {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::debug!(table = %schema.table, error = %e, "New state not serializable");
                    partial = true;
                    None
                }
            }
        } else {
            None
        };

        let prior_state = if self.action.captures_prior_state() {
            self.capture_prior(ctx, &schema, &mut partial).await
        } else {
            None
        };

        let record = AuditRecord::new(schema.table.clone(), self.action, new_state, prior_state);

        let outcome = match self.persist(ctx, &record).await {
            Ok(id) => AuditOutcome::Recorded { id, partial },
            Err(e) => {
                tracing::debug!(table = %schema.table, action = %self.action, error = %e, "Audit insert failed");
                AuditOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        self.observer.observe(Some(&schema.table), self.action, &outcome);
        outcome
    }

    fn eligible(&self, ctx: &OperationContext<'_>) -> std::result::Result<Arc<EntitySchema>, SkipReason> {
        if ctx.has_error() {
            return Err(SkipReason::OperationFailed);
        }

        let schema = ctx.schema.clone().ok_or(SkipReason::MissingSchema)?;

        if schema.type_id == TypeId::of::<AuditRecord>()
            || schema.name == self.config.audit_entity
            || schema.table == self.config.audit_table
            || ctx.sessions.audit_table() == Some(schema.table.as_str())
        {
            return Err(SkipReason::AuditTable);
        }

        if !self.config.records(self.action) {
            return Err(SkipReason::ActionDisabled);
        }

        Ok(schema)
    }

    /// Build the primary-key predicate for the prior-state lookup
    ///
    /// Returns `None` when the lookup must be skipped: every component is
    /// zero, or (under `RequireAll`) some component is zero.
    pub fn lookup_predicate(&self, schema: &EntitySchema, entity: &dyn Entity) -> Option<KeyPredicate> {
        let keys = schema.key_values(entity);
        let total = keys.len();

        let mut predicate = KeyPredicate::new();
        for (column, value) in keys {
            if !value.is_zero() {
                predicate.push(column, value);
            }
        }

        if predicate.is_empty() {
            return None;
        }
        if predicate.len() < total && self.config.partial_keys == PartialKeyPolicy::RequireAll {
            tracing::debug!(
                table = %schema.table,
                set = predicate.len(),
                total,
                "Partial primary key, prior state not looked up"
            );
            return None;
        }

        Some(predicate)
    }

    async fn capture_prior(
        &self,
        ctx: &OperationContext<'_>,
        schema: &EntitySchema,
        partial: &mut bool,
    ) -> Option<Vec<u8>> {
        let predicate = self.lookup_predicate(schema, ctx.entity)?;

        let row = match self.lookup(ctx, &schema.table, &predicate).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                tracing::debug!(table = %schema.table, key = %predicate, "Prior row not found");
                return None;
            }
            Err(e) => {
                tracing::debug!(table = %schema.table, key = %predicate, error = %e, "Prior-state lookup failed");
                return None;
            }
        };

        match serde_json::to_vec(&row) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!(table = %schema.table, error = %e, "Prior state not serializable");
                *partial = true;
                None
            }
        }
    }

    async fn lookup(
        &self,
        ctx: &OperationContext<'_>,
        table: &str,
        predicate: &KeyPredicate,
    ) -> Result<Option<serde_json::Value>> {
        let mut session = ctx.sessions.isolated().await?;
        session.find_one(table, predicate).await
    }

    async fn persist(&self, ctx: &OperationContext<'_>, record: &AuditRecord) -> Result<u64> {
        let mut session = ctx.sessions.isolated().await?;
        session.insert_audit(record).await
    }
}

#[async_trait]
impl Hook for AuditInterceptor {
    async fn run(&self, ctx: &OperationContext<'_>) {
        self.intercept(ctx).await;
    }
}

/// Wire the create/update/delete audit hooks with default configuration
///
/// Each hook runs after its primary stage. Fails if any hook name is
/// already taken; callers should treat that as a startup error.
pub fn register_audit_hooks(hooks: &HookRegistry) -> Result<()> {
    register_audit_hooks_with(hooks, AuditConfig::default(), Arc::new(TracingObserver))
}

/// Wire the audit hooks with explicit configuration and observer
pub fn register_audit_hooks_with(
    hooks: &HookRegistry,
    config: AuditConfig,
    observer: Arc<dyn AuditObserver>,
) -> Result<()> {
    let config = Arc::new(config);
    let mut names = Vec::with_capacity(AuditAction::ALL.len());

    for action in AuditAction::ALL {
        let point = LifecyclePoint::from(action);
        let name = config.hook_name(action);
        let interceptor = AuditInterceptor::new(action, config.clone(), observer.clone());
        hooks.register(point, &name, point.primary_stage(), Arc::new(interceptor))?;
        names.push(name);
    }

    tracing::info!(hooks = ?names, audit_table = %config.audit_table, "Audit hooks registered");
    Ok(())
}
