//! End-to-end executor behavior over a scripted warehouse backend.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vortex_api::config::WarehouseConfig;
use vortex_api::warehouse::{BackendError, QueryExecutor, QueryStatus, WarehouseBackend};

fn warehouse_config() -> WarehouseConfig {
    WarehouseConfig {
        host: "warehouse.internal".to_string(),
        port: 9030,
        user: "reader".to_string(),
        password: String::new(),
        catalog: "lake".to_string(),
        database: "all_data".to_string(),
        max_connections: 8,
        acquire_timeout_secs: 5,
        idle_timeout_secs: 60,
        default_limit: 1000,
        max_limit: 1000,
        allow_multi_statement: false,
    }
}

fn row(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

/// Backend that answers every query with the same rows after a fixed delay.
struct SlowBackend {
    delay: Duration,
    rows: Vec<Map<String, Value>>,
}

#[async_trait]
impl WarehouseBackend for SlowBackend {
    async fn fetch_rows(&self, _sql: &str) -> Result<Vec<Map<String, Value>>, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.rows.clone())
    }

    async fn execute(&self, _sql: &str) -> Result<u64, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok(1)
    }
}

/// Ten concurrent queries against a backend that takes 100ms each must
/// overlap rather than serialize.
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_queries_overlap() {
    let backend = Arc::new(SlowBackend {
        delay: Duration::from_millis(100),
        rows: vec![row("id", 1.into())],
    });
    let executor = Arc::new(QueryExecutor::new(backend, &warehouse_config()));

    let started = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..10 {
        let executor = executor.clone();
        handles.push(tokio::spawn(async move {
            executor.execute_custom_sql("SELECT * FROM t").await
        }));
    }
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, QueryStatus::Success);
    }

    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_millis(500),
        "ten 100ms queries took {:?}, they must not serialize",
        elapsed
    );
}

struct FailingBackend;

#[async_trait]
impl WarehouseBackend for FailingBackend {
    async fn fetch_rows(&self, _sql: &str) -> Result<Vec<Map<String, Value>>, BackendError> {
        Err(BackendError("connection reset by warehouse".to_string()))
    }

    async fn execute(&self, _sql: &str) -> Result<u64, BackendError> {
        Err(BackendError("connection reset by warehouse".to_string()))
    }
}

#[tokio::test]
async fn backend_faults_never_escape_as_panics_or_errors() {
    let executor = QueryExecutor::new(Arc::new(FailingBackend), &warehouse_config());

    let read = executor.execute_custom_sql("SELECT * FROM t").await;
    assert_eq!(read.status, QueryStatus::ExecutionError);
    assert!(read.message.contains("connection reset"));

    let write = executor.execute_custom_sql("INSERT INTO t VALUES (1)").await;
    assert_eq!(write.status, QueryStatus::ExecutionError);
}

#[tokio::test]
async fn outcome_statuses_cover_the_full_contract() {
    let empty = QueryExecutor::new(
        Arc::new(SlowBackend { delay: Duration::ZERO, rows: Vec::new() }),
        &warehouse_config(),
    );

    let no_rows = empty.execute_custom_sql("SELECT * FROM t WHERE 1 = 0").await;
    assert_eq!(no_rows.status, QueryStatus::NoRows);
    assert_eq!(no_rows.status.code(), 1200);
    assert!(!no_rows.status.is_error());

    let invalid = empty.execute_custom_sql("SELECT 1; DELETE FROM t;").await;
    assert_eq!(invalid.status, QueryStatus::ValidationError);
    assert!(invalid.status.is_error());

    let executed = empty.execute_custom_sql("INSERT INTO t VALUES (1)").await;
    assert_eq!(executed.status, QueryStatus::Executed);
    assert_eq!(executed.affected, Some(1));

    let rows = QueryExecutor::new(
        Arc::new(SlowBackend {
            delay: Duration::ZERO,
            rows: vec![row("n", 7.into())],
        }),
        &warehouse_config(),
    );
    let ok = rows.execute_custom_sql("SELECT n FROM t").await;
    assert_eq!(ok.status, QueryStatus::Success);
    assert_eq!(ok.status.code(), 0);
    assert_eq!(ok.rows[0]["n"], Value::from(7));
}

/// The limit injected by the executor is observable at the backend.
#[tokio::test]
async fn default_limit_reaches_the_backend() {
    use std::sync::Mutex;

    struct RecordingBackend {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WarehouseBackend for RecordingBackend {
        async fn fetch_rows(&self, sql: &str) -> Result<Vec<Map<String, Value>>, BackendError> {
            self.seen.lock().unwrap().push(sql.to_string());
            Ok(vec![Map::new()])
        }

        async fn execute(&self, _sql: &str) -> Result<u64, BackendError> {
            Ok(0)
        }
    }

    let backend = Arc::new(RecordingBackend { seen: Mutex::new(Vec::new()) });
    let mut config = warehouse_config();
    config.default_limit = 200;
    config.max_limit = 500;
    let executor = QueryExecutor::new(backend.clone(), &config);

    executor.execute_custom_sql("SELECT * FROM t").await;
    executor.execute_custom_sql("SELECT * FROM t LIMIT 9000").await;

    let seen = backend.seen.lock().unwrap();
    assert_eq!(seen[0], "SELECT * FROM t LIMIT 200;");
    assert_eq!(seen[1], "SELECT * FROM t LIMIT 200");
}
