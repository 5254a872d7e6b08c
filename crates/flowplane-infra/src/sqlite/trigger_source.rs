//! SQLite trigger source repository implementation.
//!
//! Rows are soft-deleted. A partial unique index on `(flow_id, simulate)`
//! over live rows backs the one-active-registration rule.

use chrono::Utc;
use flowplane_core::repository::trigger_source::TriggerSourceRepository;
use flowplane_types::error::RepositoryError;
use flowplane_types::flow::{FlowId, FlowVersionId};
use flowplane_types::trigger::{TriggerSource, TriggerSourceType};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_err};

/// SQLite-backed implementation of `TriggerSourceRepository`.
pub struct SqliteTriggerSourceRepository {
    pool: DatabasePool,
}

impl SqliteTriggerSourceRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn get<'r, T>(row: &'r sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(query_err)
}

fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> Result<TriggerSource, RepositoryError> {
    let id: String = get(row, "id")?;
    let flow_id: String = get(row, "flow_id")?;
    let flow_version_id: String = get(row, "flow_version_id")?;
    let trigger_type: String = get(row, "trigger_type")?;
    let schedule: Option<String> = get(row, "schedule")?;
    let handshake: Option<String> = get(row, "handshake")?;
    let created_at: String = get(row, "created_at")?;
    let deleted_at: Option<String> = get(row, "deleted_at")?;

    Ok(TriggerSource {
        id: Uuid::parse_str(&id).map_err(|e| RepositoryError::Query(format!("invalid source id: {e}")))?,
        flow_id: flow_id
            .parse::<FlowId>()
            .map_err(|e| RepositoryError::Query(format!("invalid flow id: {e}")))?,
        flow_version_id: flow_version_id
            .parse::<FlowVersionId>()
            .map_err(|e| RepositoryError::Query(format!("invalid version id: {e}")))?,
        project_id: get(row, "project_id")?,
        simulate: get(row, "simulate")?,
        trigger_type: trigger_type
            .parse::<TriggerSourceType>()
            .map_err(RepositoryError::Query)?,
        piece_name: get(row, "piece_name")?,
        trigger_name: get(row, "trigger_name")?,
        schedule: schedule
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid schedule JSON: {e}")))?,
        handshake: handshake
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid handshake JSON: {e}")))?,
        created_at: parse_datetime(&created_at)?,
        deleted_at: deleted_at.as_deref().map(parse_datetime).transpose()?,
    })
}

impl TriggerSourceRepository for SqliteTriggerSourceRepository {
    async fn get_active(&self, flow_id: &FlowId, simulate: bool) -> Result<Option<TriggerSource>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM trigger_sources WHERE flow_id = ? AND simulate = ? AND deleted_at IS NULL",
        )
        .bind(flow_id.to_string())
        .bind(simulate)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.as_ref().map(row_to_source).transpose()
    }

    async fn replace_active(&self, source: &TriggerSource) -> Result<(), RepositoryError> {
        let schedule = source
            .schedule
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("failed to serialize schedule: {e}")))?;
        let handshake = source
            .handshake
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("failed to serialize handshake: {e}")))?;

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            "UPDATE trigger_sources SET deleted_at = ? WHERE flow_id = ? AND simulate = ? AND deleted_at IS NULL",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(source.flow_id.to_string())
        .bind(source.simulate)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        sqlx::query(
            r#"INSERT INTO trigger_sources
               (id, flow_id, flow_version_id, project_id, simulate, trigger_type, piece_name,
                trigger_name, schedule, handshake, created_at, deleted_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)"#,
        )
        .bind(source.id.to_string())
        .bind(source.flow_id.to_string())
        .bind(source.flow_version_id.to_string())
        .bind(&source.project_id)
        .bind(source.simulate)
        .bind(source.trigger_type.as_str())
        .bind(&source.piece_name)
        .bind(&source.trigger_name)
        .bind(schedule)
        .bind(handshake)
        .bind(format_datetime(&source.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.message().contains("UNIQUE") {
                    return RepositoryError::Conflict(format!(
                        "flow {} already has an active trigger source",
                        source.flow_id
                    ));
                }
            }
            query_err(e)
        })?;

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn soft_delete(&self, id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE trigger_sources SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(format_datetime(&Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(())
    }

    async fn list_active_polling(&self) -> Result<Vec<TriggerSource>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM trigger_sources
               WHERE deleted_at IS NULL AND simulate = 0 AND trigger_type = ?
               ORDER BY created_at"#,
        )
        .bind(TriggerSourceType::Polling.as_str())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(row_to_source).collect()
    }
}
