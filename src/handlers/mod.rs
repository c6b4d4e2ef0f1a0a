//! HTTP handlers for the query API.

use axum::extract::Path;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::config;
use crate::error::ApiError;
use crate::fs::manager::fs_manager;
use crate::serializer::ResultMaterializer;
use crate::warehouse::{shared_executor, QueryOutcome, QueryStatus};

/// Response envelope shared by every query endpoint. `trace_id` is only
/// populated for outcomes worth correlating with server logs.
#[derive(Debug, Serialize)]
pub struct StandardResponse {
    pub code: u32,
    pub message: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl StandardResponse {
    fn from_outcome(outcome: QueryOutcome) -> Self {
        let data = match outcome.status {
            QueryStatus::Success => {
                let config = config::config();
                let materializer = ResultMaterializer::new(
                    &config.serializer,
                    fs_manager(),
                    config.storage.presign_expiry_secs,
                );
                Value::Array(
                    materializer
                        .materialize(outcome.rows)
                        .into_iter()
                        .map(Value::Object)
                        .collect(),
                )
            }
            QueryStatus::Executed => json!({ "affected": outcome.affected }),
            _ => Value::Null,
        };

        let trace_id = match outcome.status {
            QueryStatus::Success | QueryStatus::Executed => None,
            _ => Some(Uuid::new_v4().to_string()),
        };

        Self {
            code: outcome.status.code(),
            message: outcome.message,
            data,
            trace_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SqlQueryRequest {
    pub sql: String,
}

/// POST /api/v1/sql_query
pub async fn sql_query(
    Json(request): Json<SqlQueryRequest>,
) -> Result<Json<StandardResponse>, ApiError> {
    if request.sql.trim().is_empty() {
        return Ok(Json(StandardResponse {
            code: QueryStatus::ValidationError.code(),
            message: "sql must not be empty".to_string(),
            data: Value::Null,
            trace_id: Some(Uuid::new_v4().to_string()),
        }));
    }

    let executor = shared_executor().await?;
    let outcome = executor.execute_custom_sql(&request.sql).await;
    info!(status = ?outcome.status, rows = outcome.rows.len(), "sql_query handled");
    Ok(Json(StandardResponse::from_outcome(outcome)))
}

/// GET /api/v1/databases
pub async fn list_databases() -> Result<Json<StandardResponse>, ApiError> {
    let executor = shared_executor().await?;
    Ok(Json(StandardResponse::from_outcome(executor.show_databases().await)))
}

/// GET /api/v1/catalogs
pub async fn list_catalogs() -> Result<Json<StandardResponse>, ApiError> {
    let executor = shared_executor().await?;
    Ok(Json(StandardResponse::from_outcome(executor.show_catalogs().await)))
}

/// GET /api/v1/tables/:table/columns
pub async fn table_columns(
    Path(table): Path<String>,
) -> Result<Json<StandardResponse>, ApiError> {
    let executor = shared_executor().await?;
    Ok(Json(StandardResponse::from_outcome(
        executor.show_table_columns(&table).await,
    )))
}
