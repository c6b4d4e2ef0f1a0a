use axum::{
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use vortex_api::handlers;
use vortex_api::warehouse::{shared_executor, QueryStatus};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up WAREHOUSE_HOST, STORAGE_ENDPOINT, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Initialize configuration (this loads the config singleton)
    let config = vortex_api::config::config();
    tracing::info!("Starting Vortex API in {:?} mode", config.environment);

    let app = app();

    // Allow tests or deployments to override port via env
    let port = std::env::var("VORTEX_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Vortex API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app() -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Query API
        .route("/api/v1/sql_query", post(handlers::sql_query))
        .route("/api/v1/databases", get(handlers::list_databases))
        .route("/api/v1/catalogs", get(handlers::list_catalogs))
        .route("/api/v1/tables/:table/columns", get(handlers::table_columns))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Vortex API",
            "version": version,
            "description": "Warehouse query gateway with bounded SQL and signed media URLs",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "sql_query": "POST /api/v1/sql_query",
                "databases": "GET /api/v1/databases",
                "catalogs": "GET /api/v1/catalogs",
                "table_columns": "GET /api/v1/tables/:table/columns",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    let probe = match shared_executor().await {
        Ok(executor) => executor.test_connection().await,
        Err(e) => {
            return (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                axum::response::Json(json!({
                    "success": false,
                    "error": "warehouse unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "warehouse_error": e.to_string()
                    }
                })),
            );
        }
    };

    if probe.status == QueryStatus::Success {
        (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "warehouse": "ok"
                }
            })),
        )
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "warehouse unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "warehouse_error": probe.message
                }
            })),
        )
    }
}
