//! sqlx-backed query executor for PostgreSQL and SQLite.
//!
//! Security considerations:
//! - Only single SELECT statements are executed
//! - Values are always bound, never spliced
//! - Every statement runs under the configured timeout

use super::QueryExecutor;
use crate::application::use_cases::filter_builders::DbType;
use crate::application::use_cases::security_guard::verify_select_only;
use crate::domain::app_config::DatabaseConfig;
use crate::domain::error::{AppError, Result};
use crate::domain::query::{GeneratedQuery, Row};
use crate::domain::schema::{SQLITE_SCHEMA, SQLITE_SEED};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Column, PgPool, Postgres, Row as _, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Bind JSON parameters in order onto a sqlx query.
macro_rules! bind_json_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                Value::String(s) => query.bind(s.clone()),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        query.bind(i)
                    } else if let Some(f) = n.as_f64() {
                        query.bind(f)
                    } else {
                        query.bind(n.to_string())
                    }
                }
                Value::Bool(b) => query.bind(*b),
                Value::Null => query.bind(Option::<String>::None),
                other => query.bind(other.to_string()),
            };
        }
        query
    }};
}

/// Decode one column as JSON, trying the common types in order.
macro_rules! column_value {
    ($row:expr, $index:expr) => {{
        let row = $row;
        let index = $index;
        if let Ok(v) = row.try_get::<Option<String>, _>(index) {
            v.map(Value::String).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
            v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
            v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
            v.and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
            v.map(Value::Bool).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
            v.map(|dt| Value::String(dt.to_rfc3339())).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
            v.map(|dt| Value::String(dt.to_string())).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
            v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null)
        } else {
            Value::Null
        }
    }};
}

macro_rules! row_to_map {
    ($row:expr) => {{
        let row = $row;
        let mut map: Row = HashMap::with_capacity(row.columns().len());
        for (i, column) in row.columns().iter().enumerate() {
            map.insert(column.name().to_string(), column_value!(row, i));
        }
        map
    }};
}

enum DbPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

pub struct SqlxExecutor {
    pool: DbPool,
    query_timeout: Duration,
}

impl SqlxExecutor {
    /// Open a pool for `config.url`. The scheme picks the driver.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let db_type = DbType::from_url(&config.url).ok_or_else(|| {
            AppError::Config(format!("Unsupported database url: {}", config.url))
        })?;

        let pool = match db_type {
            DbType::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                    .connect(&config.url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {}", e);
                        AppError::DatabaseError(format!("Failed to connect: {}", e))
                    })?;
                DbPool::Postgres(pool)
            }
            DbType::Sqlite => {
                let options = SqliteConnectOptions::from_str(&config.url)
                    .map_err(|e| AppError::Config(format!("Invalid SQLite url: {}", e)))?
                    .create_if_missing(true);
                // each connection to an in-memory database gets its own copy
                let max_connections = if config.url.contains(":memory:") {
                    1
                } else {
                    config.max_connections
                };
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await
                    .map_err(|e| AppError::DatabaseError(format!("Failed to open SQLite: {}", e)))?;
                DbPool::Sqlite(pool)
            }
        };

        info!("Connected to {:?} database", db_type);
        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        })
    }

    pub fn db_type(&self) -> DbType {
        match self.pool {
            DbPool::Postgres(_) => DbType::Postgres,
            DbPool::Sqlite(_) => DbType::Sqlite,
        }
    }

    /// Create the library tables in a SQLite database and load demo rows
    /// into an empty one. PostgreSQL databases are left untouched.
    pub async fn bootstrap_demo_data(&self) -> Result<()> {
        let DbPool::Sqlite(pool) = &self.pool else {
            return Ok(());
        };

        for statement in SQLITE_SCHEMA {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to create schema: {}", e)))?;
        }

        let books: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        if books > 0 {
            return Ok(());
        }

        for statement in SQLITE_SEED {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to seed data: {}", e)))?;
        }
        info!("Seeded demo library data");
        Ok(())
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| {
                AppError::DatabaseError(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::DatabaseError(format!("Query execution failed: {}", e)))
    }

    pub async fn close(&self) {
        match &self.pool {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }
}

#[async_trait]
impl QueryExecutor for SqlxExecutor {
    async fn execute(&self, query: &GeneratedQuery) -> Result<Vec<Row>> {
        if !query.is_valid {
            return Err(AppError::ValidationError(
                "Refusing to execute an invalid query".to_string(),
            ));
        }
        verify_select_only(&query.query_text)?;

        let rows: Vec<Row> = match &self.pool {
            DbPool::Postgres(pool) => {
                let q = bind_json_params!(sqlx::query::<Postgres>(&query.query_text), &query.params);
                let rows = self.with_timeout(q.fetch_all(pool)).await?;
                rows.iter().map(|row| row_to_map!(row)).collect()
            }
            DbPool::Sqlite(pool) => {
                let q = bind_json_params!(sqlx::query::<Sqlite>(&query.query_text), &query.params);
                let rows = self.with_timeout(q.fetch_all(pool)).await?;
                rows.iter().map(|row| row_to_map!(row)).collect()
            }
        };

        debug!("Query returned {} rows", rows.len());
        Ok(rows)
    }
}
