//! Integration tests for the PostgreSQL connection
//!
//! These tests require a running PostgreSQL server.
//! They are ignored by default and can be run with:
//! ```
//! cargo test --package cistern-postgres --test connection_integration -- --ignored
//! ```
//!
//! To set up a local PostgreSQL server for testing:
//! ```
//! docker run -d --name postgres-test -p 5432:5432 -e POSTGRES_PASSWORD=postgres postgres:16
//! ```

use cistern_core::{ConnectParams, Connection, TransactionStatus, Value};
use cistern_postgres::PostgresConnection;

/// Initialize logging for tests if not already initialized
fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("cistern_postgres=debug".parse().unwrap()),
            )
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Helper to create test connection parameters
fn test_params() -> ConnectParams {
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("POSTGRES_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5432);
    let dbname = std::env::var("POSTGRES_DATABASE").unwrap_or_else(|_| "postgres".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "postgres".to_string());

    ConnectParams::new(&host, &dbname)
        .with_port(port)
        .with_user(&user)
        .with_password(&password)
}

async fn connect() -> PostgresConnection {
    initialize_logging();
    PostgresConnection::connect(&test_params())
        .await
        .expect("Failed to connect to PostgreSQL")
}

/// Test executing a simple query
#[tokio::test]
#[ignore = "requires running PostgreSQL server"]
async fn test_postgres_select_literal() {
    let conn = connect().await;

    let result = conn
        .execute("SELECT 'world' AS hello")
        .await
        .expect("Query failed");

    assert_eq!(result.columns, vec!["hello".to_string()]);
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.value(0, 0), Some(&Value::String("world".to_string())));

    conn.close().await.expect("Failed to close connection");
    assert!(conn.is_closed());
}

/// Test value extraction across common column types
#[tokio::test]
#[ignore = "requires running PostgreSQL server"]
async fn test_postgres_typed_values() {
    let conn = connect().await;

    let result = conn
        .execute(
            "SELECT 1::int4 AS i, 2.5::float8 AS f, true AS b, \
             12345.678::numeric(8,3) AS n, NULL::text AS missing",
        )
        .await
        .expect("Query failed");

    assert_eq!(result.value(0, 0), Some(&Value::Int32(1)));
    assert_eq!(result.value(0, 1), Some(&Value::Float64(2.5)));
    assert_eq!(result.value(0, 2), Some(&Value::Bool(true)));
    assert_eq!(
        result.value(0, 3),
        Some(&Value::Decimal("12345.678".to_string()))
    );
    assert_eq!(result.value(0, 4), Some(&Value::Null));

    conn.close().await.expect("Failed to close connection");
}

/// Test DML statements report affected rows
#[tokio::test]
#[ignore = "requires running PostgreSQL server"]
async fn test_postgres_dml_affected_rows() {
    let conn = connect().await;

    conn.execute("CREATE TEMP TABLE cistern_dml_test (id int4, label text)")
        .await
        .expect("Failed to create table");

    let result = conn
        .execute("INSERT INTO cistern_dml_test VALUES (1, 'a'), (2, 'b'), (3, 'c')")
        .await
        .expect("Failed to insert");
    assert_eq!(result.affected_rows, 3);
    assert!(!result.has_rows());

    let result = conn
        .execute("UPDATE cistern_dml_test SET label = 'x' WHERE id > 1")
        .await
        .expect("Failed to update");
    assert_eq!(result.affected_rows, 2);

    let result = conn
        .execute("SELECT count(*) AS n FROM cistern_dml_test")
        .await
        .expect("Failed to count");
    assert_eq!(result.value(0, 0), Some(&Value::Int64(3)));

    conn.close().await.expect("Failed to close connection");
}

/// Test transaction status tracking across begin, failure, and rollback
#[tokio::test]
#[ignore = "requires running PostgreSQL server"]
async fn test_postgres_transaction_status_lifecycle() {
    let conn = connect().await;
    assert_eq!(conn.transaction_status(), TransactionStatus::Idle);

    conn.begin().await.expect("Failed to begin");
    assert_eq!(conn.transaction_status(), TransactionStatus::InTransaction);

    // A failing statement aborts the server-side transaction
    let result = conn.execute("SELECT no_such_column").await;
    assert!(result.is_err());
    assert_eq!(conn.transaction_status(), TransactionStatus::Error);

    // Further statements fail until the transaction is rolled back
    let result = conn.execute("SELECT 1").await;
    assert!(result.is_err());

    conn.rollback().await.expect("Failed to rollback");
    assert_eq!(conn.transaction_status(), TransactionStatus::Idle);

    let result = conn.execute("SELECT 1").await.expect("Query failed");
    assert_eq!(result.value(0, 0), Some(&Value::Int32(1)));

    conn.close().await.expect("Failed to close connection");
}

/// Test rollback discards uncommitted changes
#[tokio::test]
#[ignore = "requires running PostgreSQL server"]
async fn test_postgres_rollback_discards_changes() {
    let conn = connect().await;

    conn.execute("CREATE TEMP TABLE cistern_tx_test (id int4)")
        .await
        .expect("Failed to create table");

    conn.begin().await.expect("Failed to begin");
    conn.execute("INSERT INTO cistern_tx_test VALUES (1), (2)")
        .await
        .expect("Failed to insert");
    conn.rollback().await.expect("Failed to rollback");

    let result = conn
        .execute("SELECT count(*) AS n FROM cistern_tx_test")
        .await
        .expect("Failed to count");
    assert_eq!(result.value(0, 0), Some(&Value::Int64(0)));

    conn.close().await.expect("Failed to close connection");
}

/// Test committed changes persist
#[tokio::test]
#[ignore = "requires running PostgreSQL server"]
async fn test_postgres_commit_persists_changes() {
    let conn = connect().await;

    conn.execute("CREATE TEMP TABLE cistern_commit_test (id int4)")
        .await
        .expect("Failed to create table");

    conn.begin().await.expect("Failed to begin");
    conn.execute("INSERT INTO cistern_commit_test VALUES (1)")
        .await
        .expect("Failed to insert");
    conn.commit().await.expect("Failed to commit");
    assert_eq!(conn.transaction_status(), TransactionStatus::Idle);

    let result = conn
        .execute("SELECT count(*) AS n FROM cistern_commit_test")
        .await
        .expect("Failed to count");
    assert_eq!(result.value(0, 0), Some(&Value::Int64(1)));

    conn.close().await.expect("Failed to close connection");
}

/// Test transaction state guards
#[tokio::test]
#[ignore = "requires running PostgreSQL server"]
async fn test_postgres_transaction_state_guards() {
    let conn = connect().await;

    // Commit and rollback require an open transaction
    assert!(conn.commit().await.is_err());
    assert!(conn.rollback().await.is_err());

    conn.begin().await.expect("Failed to begin");

    // A second begin is rejected while a transaction is open
    let result = conn.begin().await;
    assert!(result.is_err());
    assert_eq!(conn.transaction_status(), TransactionStatus::InTransaction);

    conn.rollback().await.expect("Failed to rollback");
    conn.close().await.expect("Failed to close connection");
}
