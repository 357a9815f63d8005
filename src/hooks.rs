//! Lifecycle hook registry
//!
//! Holds one ordered chain of named hooks per lifecycle point. Every chain
//! is anchored on the primary stage (`core:create`, `core:update`,
//! `core:delete`), so a hook registered after it only ever observes a
//! mutation that has already been applied.

use crate::context::OperationContext;
use crate::error::{AuditError, Result};
use crate::types::AuditAction;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Point in a mutation's lifecycle a hook attaches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePoint {
    Create,
    Update,
    Delete,
}

impl LifecyclePoint {
    /// Name of the primary stage hooks are anchored on
    pub fn primary_stage(&self) -> &'static str {
        match self {
            LifecyclePoint::Create => "core:create",
            LifecyclePoint::Update => "core:update",
            LifecyclePoint::Delete => "core:delete",
        }
    }

    /// Audit action recorded for this point
    pub fn action(&self) -> AuditAction {
        match self {
            LifecyclePoint::Create => AuditAction::Create,
            LifecyclePoint::Update => AuditAction::Update,
            LifecyclePoint::Delete => AuditAction::Delete,
        }
    }
}

impl From<AuditAction> for LifecyclePoint {
    fn from(action: AuditAction) -> Self {
        match action {
            AuditAction::Create => LifecyclePoint::Create,
            AuditAction::Update => LifecyclePoint::Update,
            AuditAction::Delete => LifecyclePoint::Delete,
        }
    }
}

impl fmt::Display for LifecyclePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePoint::Create => f.write_str("create"),
            LifecyclePoint::Update => f.write_str("update"),
            LifecyclePoint::Delete => f.write_str("delete"),
        }
    }
}

/// A callback run after a primary operation
///
/// Hooks cannot fail the operation: there is no error channel back to
/// the data-access layer.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn run(&self, ctx: &OperationContext<'_>);
}

struct RegisteredHook {
    name: String,
    hook: Arc<dyn Hook>,
}

/// Named, ordered hook chains keyed by lifecycle point
#[derive(Default)]
pub struct HookRegistry {
    chains: RwLock<HashMap<LifecyclePoint, Vec<RegisteredHook>>>,
}

impl HookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook to run after `after`
    ///
    /// `after` is either the point's primary stage (the hook is appended
    /// to the chain) or a hook already on the chain (the hook is inserted
    /// right behind it).
    pub fn register(
        &self,
        point: LifecyclePoint,
        name: &str,
        after: &str,
        hook: Arc<dyn Hook>,
    ) -> Result<()> {
        if name.trim().is_empty() {
            return Err(AuditError::InvalidHook(format!(
                "Hook name cannot be empty ({})",
                point
            )));
        }
        if name == point.primary_stage() {
            return Err(AuditError::InvalidHook(format!(
                "'{}' is reserved for the primary stage",
                name
            )));
        }

        let mut chains = self.chains.write().map_err(|e| {
            AuditError::InvalidHook(format!("Hook registry lock poisoned: {}", e))
        })?;
        let chain = chains.entry(point).or_default();

        if chain.iter().any(|h| h.name == name) {
            return Err(AuditError::DuplicateHook {
                point: point.to_string(),
                name: name.to_string(),
            });
        }

        let position = if after == point.primary_stage() {
            chain.len()
        } else {
            match chain.iter().position(|h| h.name == after) {
                Some(idx) => idx + 1,
                None => {
                    return Err(AuditError::InvalidHook(format!(
                        "Unknown anchor '{}' for hook '{}' ({})",
                        after, name, point
                    )))
                }
            }
        };

        chain.insert(
            position,
            RegisteredHook {
                name: name.to_string(),
                hook,
            },
        );

        tracing::debug!(point = %point, hook = %name, after = %after, "Hook registered");
        Ok(())
    }

    /// Whether a hook name is registered at a point
    pub fn is_registered(&self, point: LifecyclePoint, name: &str) -> bool {
        self.chains
            .read()
            .map(|chains| {
                chains
                    .get(&point)
                    .map(|c| c.iter().any(|h| h.name == name))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Hook names at a point, in run order
    pub fn names(&self, point: LifecyclePoint) -> Vec<String> {
        self.chains
            .read()
            .map(|chains| {
                chains
                    .get(&point)
                    .map(|c| c.iter().map(|h| h.name.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Run every hook registered at the context's point, in order
    pub async fn run(&self, ctx: &OperationContext<'_>) {
        // Snapshot the chain so no lock is held across awaits
        let hooks: Vec<Arc<dyn Hook>> = match self.chains.read() {
            Ok(chains) => chains
                .get(&ctx.point)
                .map(|c| c.iter().map(|h| h.hook.clone()).collect())
                .unwrap_or_default(),
            Err(e) => {
                tracing::error!(point = %ctx.point, error = %e, "Hook registry lock poisoned");
                return;
            }
        };

        for hook in hooks {
            hook.run(ctx).await;
        }
    }
}
