//! PostgreSQL integration tests
//!
//! These tests require a running PostgreSQL server:
//!   docker run -e POSTGRES_PASSWORD=postgres -p 5432:5432 postgres:16
//!
//! Tests are skipped automatically if PostgreSQL is not available.

use a3s_audit::{
    register_audit_hooks_with, AuditConfig, AuditOutcome, Entity, EntitySchema, HookRegistry,
    KeyValue, LifecyclePoint, MemoryObserver, OperationContext, PostgresConfig, PostgresSessions,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
struct Widget {
    id: i64,
    name: String,
}

impl Entity for Widget {
    fn schema() -> EntitySchema {
        EntitySchema::of::<Widget>("Widget", "widgets", ["id"])
    }

    fn key_value(&self, column: &str) -> Option<KeyValue> {
        (column == "id").then(|| KeyValue::Int(self.id))
    }
}

/// Try to connect to PostgreSQL. Returns None if server is unavailable.
async fn try_postgres_sessions(suffix: &str) -> Option<PostgresSessions> {
    let config = PostgresConfig {
        password: "postgres".to_string(),
        max_pool_size: 2,
        wait_timeout_secs: 2,
        ..Default::default()
    };

    match PostgresSessions::connect(&config).await {
        Ok(sessions) => Some(sessions.with_audit_table(format!("audit_logs_{}", suffix))),
        Err(_) => {
            eprintln!("PostgreSQL not available, skipping integration test");
            None
        }
    }
}

/// Helper to get a session factory with a fresh audit table, or skip the test
macro_rules! pg_sessions {
    ($suffix:expr) => {
        match try_postgres_sessions($suffix).await {
            Some(sessions) => {
                let client = sessions.pool().get().await.unwrap();
                client
                    .batch_execute(&format!(
                        "DROP TABLE IF EXISTS {audit}; \
                         DROP TABLE IF EXISTS widgets_{suffix}; \
                         CREATE TABLE widgets_{suffix} (id BIGINT PRIMARY KEY, name TEXT NOT NULL);",
                        audit = sessions.audit_table(),
                        suffix = $suffix
                    ))
                    .await
                    .unwrap();
                sessions.ensure_audit_table().await.unwrap();
                sessions
            }
            None => return,
        }
    };
}

fn hooks_with_observer() -> (HookRegistry, Arc<MemoryObserver>) {
    let hooks = HookRegistry::new();
    let observer = Arc::new(MemoryObserver::new());
    register_audit_hooks_with(&hooks, AuditConfig::default(), observer.clone()).unwrap();
    (hooks, observer)
}

fn widget_schema(suffix: &str) -> Option<Arc<EntitySchema>> {
    Some(Arc::new(EntitySchema::of::<Widget>(
        "Widget",
        format!("widgets_{}", suffix),
        ["id"],
    )))
}

async fn audit_rows(
    sessions: &PostgresSessions,
) -> Vec<(String, Option<serde_json::Value>, Option<serde_json::Value>)> {
    let client = sessions.pool().get().await.unwrap();
    client
        .query(
            &format!(
                "SELECT action, new_data, old_data FROM {} ORDER BY id",
                sessions.audit_table()
            ),
            &[],
        )
        .await
        .unwrap()
        .iter()
        .map(|row| (row.get(0), row.get(1), row.get(2)))
        .collect()
}

#[tokio::test]
async fn test_postgres_update_captures_committed_prior_state() {
    let sessions = pg_sessions!("update");
    let (hooks, observer) = hooks_with_observer();

    let mut client = sessions.pool().get().await.unwrap();
    client
        .execute("INSERT INTO widgets_update (id, name) VALUES (7, 'a')", &[])
        .await
        .unwrap();

    // The mutation stays uncommitted while the hooks run
    let tx = client.transaction().await.unwrap();
    tx.execute("UPDATE widgets_update SET name = 'b' WHERE id = 7", &[])
        .await
        .unwrap();

    let updated = Widget {
        id: 7,
        name: "b".to_string(),
    };
    let ctx = OperationContext::new(
        LifecyclePoint::Update,
        widget_schema("update"),
        &updated,
        &sessions,
    );
    hooks.run(&ctx).await;
    tx.commit().await.unwrap();

    assert!(observer.last().unwrap().is_recorded());

    let rows = audit_rows(&sessions).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "UPDATE");
    assert_eq!(rows[0].1, Some(serde_json::json!({"id": 7, "name": "b"})));
    assert_eq!(rows[0].2, Some(serde_json::json!({"id": 7, "name": "a"})));
}

#[tokio::test]
async fn test_postgres_create_and_delete() {
    let sessions = pg_sessions!("lifecycle");
    let (hooks, _observer) = hooks_with_observer();

    let w = Widget {
        id: 3,
        name: "x".to_string(),
    };

    let client = sessions.pool().get().await.unwrap();
    client
        .execute("INSERT INTO widgets_lifecycle (id, name) VALUES (3, 'x')", &[])
        .await
        .unwrap();
    let ctx = OperationContext::new(
        LifecyclePoint::Create,
        widget_schema("lifecycle"),
        &w,
        &sessions,
    );
    hooks.run(&ctx).await;

    let ctx = OperationContext::new(
        LifecyclePoint::Delete,
        widget_schema("lifecycle"),
        &w,
        &sessions,
    );
    hooks.run(&ctx).await;
    client
        .execute("DELETE FROM widgets_lifecycle WHERE id = 3", &[])
        .await
        .unwrap();

    let rows = audit_rows(&sessions).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, "CREATE");
    assert_eq!(rows[0].1, Some(serde_json::json!({"id": 3, "name": "x"})));
    assert_eq!(rows[0].2, None);
    assert_eq!(rows[1].0, "DELETE");
    assert_eq!(rows[1].1, None);
    assert_eq!(rows[1].2, Some(serde_json::json!({"id": 3, "name": "x"})));
}

#[tokio::test]
async fn test_postgres_missing_row_records_without_prior_state() {
    let sessions = pg_sessions!("missing");
    let (hooks, observer) = hooks_with_observer();

    let ghost = Widget {
        id: 404,
        name: "ghost".to_string(),
    };
    let ctx = OperationContext::new(
        LifecyclePoint::Update,
        widget_schema("missing"),
        &ghost,
        &sessions,
    );
    hooks.run(&ctx).await;

    assert!(matches!(
        observer.last(),
        Some(AuditOutcome::Recorded { partial: false, .. })
    ));
    let rows = audit_rows(&sessions).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].2, None);
}

#[tokio::test]
async fn test_postgres_insert_failure_is_absorbed() {
    let sessions = pg_sessions!("dropped");
    let (hooks, observer) = hooks_with_observer();

    let client = sessions.pool().get().await.unwrap();
    client
        .batch_execute(&format!("DROP TABLE {}", sessions.audit_table()))
        .await
        .unwrap();

    let w = Widget {
        id: 1,
        name: "a".to_string(),
    };
    let ctx = OperationContext::new(
        LifecyclePoint::Create,
        widget_schema("dropped"),
        &w,
        &sessions,
    );
    hooks.run(&ctx).await;

    assert!(matches!(observer.last(), Some(AuditOutcome::Failed { .. })));
}
