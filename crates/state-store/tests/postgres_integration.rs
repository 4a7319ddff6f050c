//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need Docker.
//! Run with:
//!
//! ```bash
//! cargo test -p state-store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;
use state_store::{
    ActorId, DataRecord, Payload, PostgresStateRegistry, RecordId, StateRegistry,
    StateRegistryExt, StateStoreError, Version,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_records_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh registry with its own pool and cleared table
async fn get_test_registry(domain: &str) -> PostgresStateRegistry {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE records")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStateRegistry::new(pool, domain)
}

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap()
}

fn actor() -> ActorId {
    ActorId::new("pg-tester")
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn create_and_get_record() {
    let registry = get_test_registry("content").await;

    let created = registry
        .create(DataRecord::new("r1", payload(json!({"a": 1})), "seed"))
        .await
        .unwrap();
    assert_eq!(created.version, Version::first());

    let fetched = registry.get(&RecordId::new("r1")).await.unwrap();
    assert_eq!(fetched.payload, payload(json!({"a": 1})));
    assert_eq!(fetched.updated_by.as_str(), "seed");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn duplicate_create_is_rejected() {
    let registry = get_test_registry("content").await;
    registry
        .create(DataRecord::new("r1", Payload::new(), "seed"))
        .await
        .unwrap();

    let result = registry
        .create(DataRecord::new("r1", Payload::new(), "seed"))
        .await;
    assert!(matches!(result, Err(StateStoreError::AlreadyExists(_))));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn scenario_update_then_stale_update() {
    let registry = get_test_registry("content").await;
    let id = RecordId::new("r1");
    registry
        .create(DataRecord::new("r1", payload(json!({"a": 1})), "seed"))
        .await
        .unwrap();

    let first = registry
        .attempt_update(&id, payload(json!({"a": 2})), Version::first(), &actor())
        .await
        .unwrap();
    assert!(!first.has_conflict);
    assert_eq!(first.current_version, Version::new(2));

    let stale = registry
        .attempt_update(&id, payload(json!({"b": 3})), Version::first(), &actor())
        .await
        .unwrap();
    assert!(stale.has_conflict);
    assert_eq!(stale.current_version, Version::new(2));

    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.payload, payload(json!({"a": 2})));
    assert_eq!(record.version, Version::new(2));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn domains_are_isolated() {
    let users = get_test_registry("user").await;
    let content = PostgresStateRegistry::new(users.pool().clone(), "content");

    users
        .create(DataRecord::new("shared-id", Payload::new(), "seed"))
        .await
        .unwrap();

    assert!(users.contains(&RecordId::new("shared-id")).await.unwrap());
    assert!(!content.contains(&RecordId::new("shared-id")).await.unwrap());
    assert_eq!(content.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn force_apply_and_regression() {
    let registry = get_test_registry("content").await;
    let id = RecordId::new("r1");
    registry
        .create(DataRecord::new("r1", Payload::new(), "seed"))
        .await
        .unwrap();

    let record = registry
        .force_apply(&id, payload(json!({"x": 1})), Version::new(4), &actor())
        .await
        .unwrap();
    assert_eq!(record.version, Version::new(4));

    let result = registry
        .force_apply(&id, Payload::new(), Version::new(2), &actor())
        .await;
    assert!(matches!(
        result,
        Err(StateStoreError::VersionRegression { .. })
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn delete_twice_is_a_noop() {
    let registry = get_test_registry("content").await;
    let id = RecordId::new("r1");
    registry
        .create(DataRecord::new("r1", Payload::new(), "seed"))
        .await
        .unwrap();

    assert!(registry.delete(&id).await.unwrap());
    assert!(!registry.delete(&id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn concurrent_writers_apply_exactly_once() {
    let registry = get_test_registry("content").await;
    let id = RecordId::new("hot");
    registry
        .create(DataRecord::new("hot", Payload::new(), "seed"))
        .await
        .unwrap();

    let tasks = (0..8).map(|i| {
        let registry = registry.clone();
        let id = id.clone();
        async move {
            registry
                .attempt_update(
                    &id,
                    payload(json!({ "writer": i })),
                    Version::first(),
                    &ActorId::new(format!("w{i}")),
                )
                .await
                .unwrap()
        }
    });

    let results = futures_util::future::join_all(tasks).await;
    let applied = results.iter().filter(|d| !d.has_conflict).count();

    assert_eq!(applied, 1);
    assert_eq!(registry.get(&id).await.unwrap().version, Version::new(2));
}
