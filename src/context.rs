//! Operation context handed to lifecycle hooks

use crate::entity::{Entity, EntitySchema};
use crate::hooks::LifecyclePoint;
use crate::provider::SessionFactory;
use std::sync::Arc;

/// In-flight state of a create/update/delete as seen by a hook
///
/// Built by the data-access layer after the primary stage has run.
/// `sessions` hands out isolated sessions that are independent of the
/// operation's own (still uncommitted) writes.
pub struct OperationContext<'a> {
    /// Which lifecycle point fired
    pub point: LifecyclePoint,

    /// Error raised by the primary operation, if any
    pub error: Option<&'a (dyn std::error::Error + Send + Sync)>,

    /// Resolved schema metadata, `None` for unregistered entity types
    pub schema: Option<Arc<EntitySchema>>,

    /// The entity instance after the primary stage
    pub entity: &'a dyn Entity,

    /// Factory for isolated sessions
    pub sessions: &'a dyn SessionFactory,
}

impl<'a> OperationContext<'a> {
    /// Create a context for a successful primary stage
    pub fn new(
        point: LifecyclePoint,
        schema: Option<Arc<EntitySchema>>,
        entity: &'a dyn Entity,
        sessions: &'a dyn SessionFactory,
    ) -> Self {
        Self {
            point,
            error: None,
            schema,
            entity,
            sessions,
        }
    }

    /// Attach the primary operation's error
    pub fn with_error(mut self, error: &'a (dyn std::error::Error + Send + Sync)) -> Self {
        self.error = Some(error);
        self
    }

    /// Whether the primary operation failed
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
