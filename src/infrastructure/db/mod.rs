pub mod executor;

use crate::domain::error::Result;
use crate::domain::query::{GeneratedQuery, Row};
use async_trait::async_trait;

pub use executor::SqlxExecutor;

/// Read-only statement runner consumed by the query pipeline.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a valid generated query and return its rows in order.
    async fn execute(&self, query: &GeneratedQuery) -> Result<Vec<Row>>;
}
