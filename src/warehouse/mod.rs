//! Warehouse access: SQL safety rewriting, the sqlx connector, and the
//! executor that turns caller SQL into structured outcomes.

pub mod connector;
pub mod executor;
pub mod rewriter;

pub use connector::{build_connection_string, shared_executor, SqlxWarehouse};
pub use executor::{BackendError, QueryExecutor, QueryOutcome, QueryStatus, WarehouseBackend};
pub use rewriter::{add_limit_safe, RewriteError};
