//! SQLite flow store implementation.
//!
//! Implements `FlowStore` from `flowplane-core`. Values are stored as JSON
//! text and deserialized on read. Entries reference their flow and go away
//! with it.

use chrono::Utc;
use flowplane_core::storage::FlowStore;
use flowplane_types::error::RepositoryError;
use flowplane_types::flow::FlowId;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, query_err};

/// SQLite-backed implementation of `FlowStore`.
pub struct SqliteFlowStore {
    pool: DatabasePool,
}

impl SqliteFlowStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl FlowStore for SqliteFlowStore {
    async fn get(&self, flow_id: &FlowId, key: &str) -> Result<Option<serde_json::Value>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM flow_store WHERE flow_id = ? AND key = ?")
            .bind(flow_id.to_string())
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let value_str: String = row.try_get("value").map_err(query_err)?;
                let value = serde_json::from_str(&value_str)
                    .map_err(|e| RepositoryError::Query(format!("invalid JSON value: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, flow_id: &FlowId, key: &str, value: &serde_json::Value) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let value_str = serde_json::to_string(value)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize value: {e}")))?;

        sqlx::query(
            r#"INSERT INTO flow_store (flow_id, key, value, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (flow_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(flow_id.to_string())
        .bind(key)
        .bind(&value_str)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.message().contains("FOREIGN KEY") {
                    return RepositoryError::NotFound;
                }
            }
            query_err(e)
        })?;

        Ok(())
    }

    async fn delete(&self, flow_id: &FlowId, key: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM flow_store WHERE flow_id = ? AND key = ?")
            .bind(flow_id.to_string())
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(())
    }
}
