//! Query execution against the warehouse: rewrite first, classify, run,
//! and always hand the caller a structured outcome.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::WarehouseConfig;

use super::rewriter::add_limit_safe;

/// Connector-level failure reported by a backend (engine rejection,
/// connectivity loss, timeout). Always caught by the executor.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// Seam between the executor and the concrete warehouse connection, so
/// tests can substitute slow or failing engines.
#[async_trait]
pub trait WarehouseBackend: Send + Sync {
    /// Run a read-style statement and return every row as a column map.
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Map<String, Value>>, BackendError>;

    /// Run a write-style statement and return the affected-row count.
    async fn execute(&self, sql: &str) -> Result<u64, BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Read query ran and returned rows.
    Success,
    /// Read query ran fine but matched nothing.
    NoRows,
    /// Write-style statement ran and committed.
    Executed,
    /// Caller input violated a hard rule; nothing was executed.
    ValidationError,
    /// The engine rejected or failed the statement.
    ExecutionError,
}

impl QueryStatus {
    /// Business status code for the response envelope. 0 means success;
    /// the non-zero values are implementation-defined.
    pub fn code(&self) -> u32 {
        match self {
            QueryStatus::Success => 0,
            QueryStatus::ValidationError => 1101,
            QueryStatus::NoRows => 1200,
            QueryStatus::Executed => 1300,
            QueryStatus::ExecutionError => 1400,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryStatus::ValidationError | QueryStatus::ExecutionError)
    }
}

/// Structured result of one `execute_custom_sql` call. Callers always get
/// one of these; no backend fault crosses this boundary uncaught.
#[derive(Debug)]
pub struct QueryOutcome {
    pub status: QueryStatus,
    pub message: String,
    pub rows: Vec<Map<String, Value>>,
    pub affected: Option<u64>,
}

impl QueryOutcome {
    pub fn success(rows: Vec<Map<String, Value>>) -> Self {
        Self {
            status: QueryStatus::Success,
            message: "success".to_string(),
            rows,
            affected: None,
        }
    }

    pub fn no_rows() -> Self {
        Self {
            status: QueryStatus::NoRows,
            message: "query returned no rows".to_string(),
            rows: Vec::new(),
            affected: None,
        }
    }

    pub fn executed(affected: u64) -> Self {
        Self {
            status: QueryStatus::Executed,
            message: "non-query statement executed".to_string(),
            rows: Vec::new(),
            affected: Some(affected),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: QueryStatus::ValidationError,
            message: message.into(),
            rows: Vec::new(),
            affected: None,
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            status: QueryStatus::ExecutionError,
            message: message.into(),
            rows: Vec::new(),
            affected: None,
        }
    }
}

pub struct QueryExecutor {
    backend: Arc<dyn WarehouseBackend>,
    catalog: String,
    database: String,
    default_limit: i64,
    max_limit: i64,
    allow_multi_statement: bool,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn WarehouseBackend>, config: &WarehouseConfig) -> Self {
        Self {
            backend,
            catalog: config.catalog.clone(),
            database: config.database.clone(),
            default_limit: config.default_limit,
            max_limit: config.max_limit,
            allow_multi_statement: config.allow_multi_statement,
        }
    }

    /// Rewrite and run caller-submitted SQL. Rewrite failures surface as
    /// validation outcomes with no execution attempted; backend failures
    /// surface as execution outcomes.
    pub async fn execute_custom_sql(&self, sql: &str) -> QueryOutcome {
        let safe_sql = match add_limit_safe(
            sql,
            self.default_limit,
            self.allow_multi_statement,
            self.max_limit,
        ) {
            Ok(safe_sql) => safe_sql,
            Err(e) => {
                warn!(error = %e, "SQL rejected before execution");
                return QueryOutcome::validation(e.to_string());
            }
        };

        debug!(sql = %safe_sql, "executing SQL");

        if is_read_statement(&safe_sql) {
            match self.backend.fetch_rows(&safe_sql).await {
                Ok(rows) if rows.is_empty() => QueryOutcome::no_rows(),
                Ok(rows) => QueryOutcome::success(rows),
                Err(e) => {
                    error!(error = %e, "SQL execution failed");
                    QueryOutcome::execution(format!("SQL execution failed: {}", e))
                }
            }
        } else {
            match self.backend.execute(&safe_sql).await {
                Ok(affected) => QueryOutcome::executed(affected),
                Err(e) => {
                    error!(error = %e, "SQL execution failed");
                    QueryOutcome::execution(format!("SQL execution failed: {}", e))
                }
            }
        }
    }

    /// Liveness probe: ping plus engine version, bypassing the rewriter.
    pub async fn test_connection(&self) -> QueryOutcome {
        let probe = async {
            let ping = self.backend.fetch_rows("SELECT 1 AS ping").await?;
            let version = self.backend.fetch_rows("SELECT version() AS version").await?;
            Ok::<_, BackendError>((ping, version))
        };
        match probe.await {
            Ok((mut ping, version)) => {
                ping.extend(version);
                QueryOutcome::success(ping)
            }
            Err(e) => {
                error!(error = %e, "connection test failed");
                QueryOutcome::execution(format!("connection test failed: {}", e))
            }
        }
    }

    pub async fn show_databases(&self) -> QueryOutcome {
        self.execute_custom_sql("SHOW DATABASES").await
    }

    pub async fn show_catalogs(&self) -> QueryOutcome {
        self.execute_custom_sql("SHOW CATALOGS").await
    }

    /// Describe a table's columns within the configured catalog/database.
    pub async fn show_table_columns(&self, table: &str) -> QueryOutcome {
        if !is_valid_identifier(table) {
            return QueryOutcome::validation(format!("invalid table name: {}", table));
        }
        let sql = format!("SHOW COLUMNS FROM {}.{}.{}", self.catalog, self.database, table);
        self.execute_custom_sql(&sql).await
    }
}

/// Leading-keyword classification of the (already rewritten) SQL text.
fn is_read_statement(sql: &str) -> bool {
    let first = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    matches!(first.as_str(), "SELECT" | "SHOW" | "DESCRIBE" | "DESC")
}

/// Bare identifier check to keep interpolated table names injection-free.
fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Backend that records received SQL and replays canned responses.
    struct ScriptedBackend {
        rows: Vec<Map<String, Value>>,
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn returning(rows: Vec<Map<String, Value>>) -> Self {
            Self { rows, fail: false, seen: Mutex::new(Vec::new()) }
        }

        fn failing() -> Self {
            Self { rows: Vec::new(), fail: true, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl WarehouseBackend for ScriptedBackend {
        async fn fetch_rows(&self, sql: &str) -> Result<Vec<Map<String, Value>>, BackendError> {
            self.seen.lock().unwrap().push(sql.to_string());
            if self.fail {
                return Err(BackendError("engine says no".to_string()));
            }
            Ok(self.rows.clone())
        }

        async fn execute(&self, sql: &str) -> Result<u64, BackendError> {
            self.seen.lock().unwrap().push(sql.to_string());
            if self.fail {
                return Err(BackendError("engine says no".to_string()));
            }
            Ok(3)
        }
    }

    fn warehouse_config() -> WarehouseConfig {
        WarehouseConfig {
            host: "warehouse.internal".to_string(),
            port: 9030,
            user: "reader".to_string(),
            password: String::new(),
            catalog: "lake".to_string(),
            database: "all_data".to_string(),
            max_connections: 4,
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

    #[tokio::test]
    async fn select_goes_through_rewriter_and_returns_rows() {
        let backend = Arc::new(ScriptedBackend::returning(vec![row("id", 1.into())]));
        let executor = QueryExecutor::new(backend.clone(), &warehouse_config());

        let outcome = executor.execute_custom_sql("SELECT * FROM t").await;
        assert_eq!(outcome.status, QueryStatus::Success);
        assert_eq!(outcome.rows.len(), 1);

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0], "SELECT * FROM t LIMIT 1000;");
    }

    #[tokio::test]
    async fn empty_result_is_distinguished_from_failure() {
        let backend = Arc::new(ScriptedBackend::returning(Vec::new()));
        let executor = QueryExecutor::new(backend, &warehouse_config());

        let outcome = executor.execute_custom_sql("SELECT * FROM empty_t").await;
        assert_eq!(outcome.status, QueryStatus::NoRows);
        assert!(!outcome.status.is_error());
        assert!(outcome.rows.is_empty());
    }

    #[tokio::test]
    async fn multi_statement_rejected_without_execution() {
        let backend = Arc::new(ScriptedBackend::returning(Vec::new()));
        let executor = QueryExecutor::new(backend.clone(), &warehouse_config());

        let outcome = executor.execute_custom_sql("SELECT 1; DROP TABLE t;").await;
        assert_eq!(outcome.status, QueryStatus::ValidationError);
        assert!(backend.seen.lock().unwrap().is_empty(), "nothing must reach the backend");
    }

    #[tokio::test]
    async fn backend_failure_becomes_execution_outcome() {
        let backend = Arc::new(ScriptedBackend::failing());
        let executor = QueryExecutor::new(backend, &warehouse_config());

        let outcome = executor.execute_custom_sql("SELECT * FROM t").await;
        assert_eq!(outcome.status, QueryStatus::ExecutionError);
        assert!(outcome.message.contains("engine says no"));
    }

    #[tokio::test]
    async fn write_statement_returns_affected_count() {
        let backend = Arc::new(ScriptedBackend::returning(Vec::new()));
        let executor = QueryExecutor::new(backend, &warehouse_config());

        let outcome = executor.execute_custom_sql("INSERT INTO t VALUES (1)").await;
        assert_eq!(outcome.status, QueryStatus::Executed);
        assert_eq!(outcome.affected, Some(3));
    }

    #[tokio::test]
    async fn show_table_columns_validates_table_name() {
        let backend = Arc::new(ScriptedBackend::returning(Vec::new()));
        let executor = QueryExecutor::new(backend.clone(), &warehouse_config());

        let outcome = executor.show_table_columns("t; DROP TABLE x").await;
        assert_eq!(outcome.status, QueryStatus::ValidationError);
        assert!(backend.seen.lock().unwrap().is_empty());

        executor.show_table_columns("events_v1").await;
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0], "SHOW COLUMNS FROM lake.all_data.events_v1");
    }

    #[test]
    fn read_statement_classification() {
        assert!(is_read_statement("SELECT 1"));
        assert!(is_read_statement("  show databases"));
        assert!(is_read_statement("DESC t"));
        assert!(!is_read_statement("INSERT INTO t VALUES (1)"));
        assert!(!is_read_statement("ALTER TABLE t ADD COLUMN c INT"));
    }
}
