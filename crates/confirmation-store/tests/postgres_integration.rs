//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p confirmation-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use confirmation_store::{
    ConfirmationStore, ConfirmationStoreExt, PostgresConfirmationStore, Version,
    WritePrecondition, WriteResult,
};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
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
                "../../../migrations/001_create_confirmation_records.sql"
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

/// Get a fresh store with its own pool and a cleared table
async fn get_test_store() -> PostgresConfirmationStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE confirmation_records")
        .execute(&pool)
        .await
        .unwrap();

    PostgresConfirmationStore::new(pool)
}

#[tokio::test]
#[serial]
async fn create_if_absent_round_trip() {
    let store = get_test_store().await;

    let first = store
        .put("flights", "F1", json!({"airline": "AA"}), WritePrecondition::DoesNotExist, None)
        .await
        .unwrap();
    assert_eq!(
        first,
        WriteResult::Success {
            version: Version::first()
        }
    );

    let second = store
        .put("flights", "F1", json!({"airline": "BA"}), WritePrecondition::DoesNotExist, None)
        .await
        .unwrap();
    assert_eq!(
        second,
        WriteResult::PreconditionFailed {
            current_version: Some(Version::first())
        }
    );

    let record = store.get("flights", "F1").await.unwrap().unwrap();
    assert_eq!(record.payload, json!({"airline": "AA"}));
    assert_eq!(record.table, "flights");
    assert_eq!(record.key, "F1");
}

#[tokio::test]
#[serial]
async fn compare_and_swap_update() {
    let store = get_test_store().await;
    store
        .put("rentals", "C1", json!("pending"), WritePrecondition::DoesNotExist, None)
        .await
        .unwrap();

    let ok = store
        .put(
            "rentals",
            "C1",
            json!("validated"),
            WritePrecondition::MatchesVersion(Version::first()),
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        ok,
        WriteResult::Success {
            version: Version::new(2)
        }
    );

    let stale = store
        .put(
            "rentals",
            "C1",
            json!("cancelled"),
            WritePrecondition::MatchesVersion(Version::first()),
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        stale,
        WriteResult::PreconditionFailed {
            current_version: Some(Version::new(2))
        }
    );
}

#[tokio::test]
#[serial]
async fn expired_claim_can_be_reclaimed() {
    let store = get_test_store().await;
    store
        .put(
            "trip_idempotency",
            "key-1",
            json!("T1"),
            WritePrecondition::DoesNotExist,
            Some(Duration::from_millis(10)),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!store.exists("trip_idempotency", "key-1").await.unwrap());

    let reclaimed = store
        .put(
            "trip_idempotency",
            "key-1",
            json!("T2"),
            WritePrecondition::DoesNotExist,
            None,
        )
        .await
        .unwrap();
    assert!(reclaimed.is_success());

    let loaded = store
        .get_json::<String>("trip_idempotency", "key-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.value, "T2");
}

#[tokio::test]
#[serial]
async fn concurrent_create_if_absent_has_one_winner() {
    let store = get_test_store().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .put("trips", "T1", json!(i), WritePrecondition::DoesNotExist, None)
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_success() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
#[serial]
async fn delete_only_removes_target() {
    let store = get_test_store().await;
    store
        .put("trip_idempotency", "a", json!("T1"), WritePrecondition::None, None)
        .await
        .unwrap();
    store
        .put("trip_idempotency", "b", json!("T2"), WritePrecondition::None, None)
        .await
        .unwrap();

    assert!(store.delete("trip_idempotency", "a").await.unwrap());
    assert!(!store.exists("trip_idempotency", "a").await.unwrap());
    assert!(store.exists("trip_idempotency", "b").await.unwrap());
}
