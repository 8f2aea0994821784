//! Runs against a live PostgreSQL instance named by `DATABASE_URL`:
//!
//! ```text
//! DATABASE_URL=postgres://... cargo test --test postgres_registry_test -- --ignored
//! ```
//!
//! Every test registers its datasets under a fresh connection name, so runs
//! never collide with each other or with existing data.

mod common;

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use uuid::Uuid;

use common::{columns, init_test_logging};
use lineage_registry_service::catalog::{DatasetUpdate, NewDataset};
use lineage_registry_service::config::{DatabaseConfig, PageConfig, SearchConfig};
use lineage_registry_service::database::PgRegistry;
use lineage_registry_service::search::MatchType;
use lineage_registry_service::{ErrorKind, RegistryEngine};

// Tests in this binary run in parallel; only one of them may apply migrations at a time.
static MIGRATION_LOCK: Mutex<()> = Mutex::const_new(());

async fn pg_engine() -> RegistryEngine<PgRegistry> {
    init_test_logging();
    let _guard = MIGRATION_LOCK.lock().await;
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for Postgres tests");
    let registry = PgRegistry::new(&DatabaseConfig {
        database_url,
        pool_size: 16,
    })
    .await
    .expect("Failed to connect to Postgres");
    RegistryEngine::with_limits(Arc::new(registry), SearchConfig::default(), PageConfig::default())
}

fn unique_connection() -> String {
    format!("test_{}", Uuid::new_v4().simple())
}

async fn register(
    engine: &RegistryEngine<PgRegistry>,
    connection: &str,
    table: &str,
    column_names: &[&str],
) -> String {
    engine
        .create_dataset(
            NewDataset::new(connection, "warehouse", "public", table)
                .with_columns(columns(column_names)),
        )
        .await
        .expect("Failed to register dataset")
        .fqn
        .to_string()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_dataset_round_trip_and_cascade() {
    // Given
    let engine = pg_engine().await;
    let conn = unique_connection();
    let a = register(&engine, &conn, "a", &["id", "amount"]).await;
    let b = register(&engine, &conn, "b", &["id"]).await;
    engine.create_edge(&a, &b).await.expect("a -> b");

    // When
    let fetched = engine.get_dataset(&a).await.unwrap();
    let updated = engine
        .update_dataset(
            &a,
            DatasetUpdate {
                columns: Some(columns(&["id"])),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Then
    assert_eq!(fetched.columns.len(), 2);
    assert_eq!(updated.columns.len(), 1);
    assert_eq!(updated.id, fetched.id);

    let duplicate = engine
        .create_dataset(NewDataset::new(&conn, "warehouse", "public", "A"))
        .await
        .unwrap_err();
    assert_eq!(duplicate.kind(), ErrorKind::Conflict);

    engine.delete_dataset(&a).await.unwrap();
    assert!(engine.get_lineage(&b).await.unwrap().upstream_datasets.is_empty());

    // The recreated dataset starts without the old column rows
    let again = register(&engine, &conn, "a", &[]).await;
    assert!(engine.get_dataset(&again).await.unwrap().columns.is_empty());

    let err = engine
        .create_dataset(NewDataset::new(&conn, "warehouse", "public", &"t".repeat(300)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation, "rejected before reaching the store");

    engine.delete_dataset(&again).await.unwrap();
    engine.delete_dataset(&b).await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_cycle_rejected_in_store() {
    let engine = pg_engine().await;
    let conn = unique_connection();
    let raw = register(&engine, &conn, "orders_raw", &[]).await;
    let clean = register(&engine, &conn, "orders_clean", &[]).await;
    let agg = register(&engine, &conn, "orders_aggregated", &[]).await;

    engine.create_edge(&raw, &clean).await.unwrap();
    engine.create_edge(&clean, &agg).await.unwrap();
    let err = engine.create_edge(&agg, &raw).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CycleConflict);

    let err = engine.create_edge(&raw, &clean).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let middle = engine.get_lineage(&clean).await.unwrap();
    assert_eq!(middle.upstream_datasets[0].fqn.to_string(), raw);
    assert_eq!(middle.downstream_datasets[0].fqn.to_string(), agg);

    for fqn in [&raw, &clean, &agg] {
        engine.delete_dataset(fqn).await.unwrap();
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_search_ranks_and_escapes_wildcards() {
    let engine = pg_engine().await;
    let conn = unique_connection();
    let orders = register(&engine, &conn, "orders_raw", &["id"]).await;
    let shipments = register(&engine, &conn, "shipments", &["order_id"]).await;
    let percent = register(&engine, &conn, "growth_pct", &["rate%"]).await;

    let response = engine.search("order", Some(200)).await.unwrap();
    let ours: Vec<_> = response
        .results
        .iter()
        .filter(|r| r.dataset.fqn.connection_name() == conn)
        .collect();
    assert_eq!(ours.len(), 2);
    assert_eq!(ours[0].dataset.fqn.to_string(), orders);
    assert_eq!(ours[0].match_type, MatchType::TableName);
    assert_eq!(ours[1].dataset.fqn.to_string(), shipments);
    assert_eq!(ours[1].matched_on, "order_id");

    let response = engine.search("e%", Some(200)).await.unwrap();
    assert!(response
        .results
        .iter()
        .all(|r| r.matched_on.to_lowercase().contains("e%")));

    for fqn in [&orders, &shipments, &percent] {
        engine.delete_dataset(fqn).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_ring_is_serialized_by_the_store() {
    // Given
    let engine = Arc::new(pg_engine().await);
    let conn = unique_connection();
    let mut fqns = Vec::new();
    for i in 0..10 {
        fqns.push(register(&engine, &conn, &format!("n{}", i), &[]).await);
    }

    // When: every edge of the ring is submitted at once
    let tasks = (0..fqns.len()).map(|i| {
        let engine = engine.clone();
        let upstream = fqns[i].clone();
        let downstream = fqns[(i + 1) % fqns.len()].clone();
        tokio::spawn(async move { engine.create_edge(&upstream, &downstream).await })
    });
    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    // Then
    let rejected: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().err()).collect();
    assert_eq!(rejected.len(), 1, "{:?}", rejected);
    assert_eq!(rejected[0].kind(), ErrorKind::CycleConflict);
    assert!(engine.audit().await.unwrap().acyclic);

    for fqn in &fqns {
        engine.delete_dataset(fqn).await.unwrap();
    }
}
