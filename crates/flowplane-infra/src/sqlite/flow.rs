//! SQLite flow repository implementation.
//!
//! Implements `FlowRepository` from `flowplane-core` using sqlx with split
//! read/write pools. The operation claim is a single conditional UPDATE on
//! the writer connection, which makes it a compare-and-set.

use chrono::Utc;
use flowplane_core::repository::flow::FlowRepository;
use flowplane_types::error::RepositoryError;
use flowplane_types::flow::{
    Flow, FlowId, FlowOperationStatus, FlowStatus, FlowTrigger, FlowVersion, FlowVersionId,
    FlowVersionState,
};
use serde_json::Value;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_err};

/// SQLite-backed implementation of `FlowRepository`.
pub struct SqliteFlowRepository {
    pool: DatabasePool,
}

impl SqliteFlowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct FlowRow {
    id: String,
    project_id: String,
    folder_id: Option<String>,
    status: String,
    operation_status: String,
    published_version_id: Option<String>,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl FlowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            folder_id: row.try_get("folder_id")?,
            status: row.try_get("status")?,
            operation_status: row.try_get("operation_status")?,
            published_version_id: row.try_get("published_version_id")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_flow(self) -> Result<Flow, RepositoryError> {
        let id = self
            .id
            .parse::<FlowId>()
            .map_err(|e| RepositoryError::Query(format!("invalid flow id: {e}")))?;
        let status = self
            .status
            .parse::<FlowStatus>()
            .map_err(RepositoryError::Query)?;
        let operation_status = self
            .operation_status
            .parse::<FlowOperationStatus>()
            .map_err(RepositoryError::Query)?;
        let published_version_id = self
            .published_version_id
            .map(|s| s.parse::<FlowVersionId>())
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid version id: {e}")))?;
        let metadata = self
            .metadata
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid metadata JSON: {e}")))?;

        Ok(Flow {
            id,
            project_id: self.project_id,
            folder_id: self.folder_id,
            status,
            operation_status,
            published_version_id,
            metadata,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct VersionRow {
    id: String,
    flow_id: String,
    display_name: String,
    state: String,
    trigger_json: String,
    steps: String,
    valid: bool,
    updated_by: Option<String>,
    created_at: String,
    updated_at: String,
}

impl VersionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            flow_id: row.try_get("flow_id")?,
            display_name: row.try_get("display_name")?,
            state: row.try_get("state")?,
            trigger_json: row.try_get("trigger_json")?,
            steps: row.try_get("steps")?,
            valid: row.try_get("valid")?,
            updated_by: row.try_get("updated_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_version(self) -> Result<FlowVersion, RepositoryError> {
        let trigger: FlowTrigger = serde_json::from_str(&self.trigger_json)
            .map_err(|e| RepositoryError::Query(format!("invalid trigger JSON: {e}")))?;
        let steps = serde_json::from_str(&self.steps)
            .map_err(|e| RepositoryError::Query(format!("invalid steps JSON: {e}")))?;

        Ok(FlowVersion {
            id: self
                .id
                .parse::<FlowVersionId>()
                .map_err(|e| RepositoryError::Query(format!("invalid version id: {e}")))?,
            flow_id: self
                .flow_id
                .parse::<FlowId>()
                .map_err(|e| RepositoryError::Query(format!("invalid flow id: {e}")))?,
            display_name: self.display_name,
            state: self
                .state
                .parse::<FlowVersionState>()
                .map_err(RepositoryError::Query)?,
            trigger,
            steps,
            valid: self.valid,
            updated_by: self.updated_by,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn row_to_flow(row: &sqlx::sqlite::SqliteRow) -> Result<Flow, RepositoryError> {
    FlowRow::from_row(row).map_err(query_err)?.into_flow()
}

fn row_to_version(row: &sqlx::sqlite::SqliteRow) -> Result<FlowVersion, RepositoryError> {
    VersionRow::from_row(row).map_err(query_err)?.into_version()
}

fn to_json(value: &impl serde::Serialize) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::Query(format!("failed to serialize value: {e}")))
}

const INSERT_VERSION: &str = r#"INSERT INTO flow_versions
    (id, flow_id, display_name, state, trigger_json, steps, valid, updated_by, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET
        display_name = excluded.display_name,
        trigger_json = excluded.trigger_json,
        steps = excluded.steps,
        valid = excluded.valid,
        updated_by = excluded.updated_by,
        updated_at = excluded.updated_at
    WHERE flow_versions.state = 'DRAFT'"#;

// ---------------------------------------------------------------------------
// FlowRepository implementation
// ---------------------------------------------------------------------------

impl FlowRepository for SqliteFlowRepository {
    async fn create_flow_with_version(&self, flow: &Flow, version: &FlowVersion) -> Result<(), RepositoryError> {
        let metadata = flow.metadata.as_ref().map(to_json).transpose()?;
        let trigger = to_json(&version.trigger)?;
        let steps = to_json(&version.steps)?;

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            r#"INSERT INTO flows
               (id, project_id, folder_id, status, operation_status, published_version_id, metadata, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(flow.id.to_string())
        .bind(&flow.project_id)
        .bind(&flow.folder_id)
        .bind(flow.status.as_str())
        .bind(flow.operation_status.as_str())
        .bind(flow.published_version_id.map(|v| v.to_string()))
        .bind(metadata)
        .bind(format_datetime(&flow.created_at))
        .bind(format_datetime(&flow.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.message().contains("UNIQUE") {
                    return RepositoryError::Conflict(format!("flow {} already exists", flow.id));
                }
            }
            query_err(e)
        })?;

        sqlx::query(INSERT_VERSION)
            .bind(version.id.to_string())
            .bind(version.flow_id.to_string())
            .bind(&version.display_name)
            .bind(version.state.as_str())
            .bind(&trigger)
            .bind(&steps)
            .bind(version.valid)
            .bind(&version.updated_by)
            .bind(format_datetime(&version.created_at))
            .bind(format_datetime(&version.updated_at))
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn get_flow(&self, id: &FlowId) -> Result<Option<Flow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM flows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(row_to_flow).transpose()
    }

    async fn list_flows(&self, project_id: &str) -> Result<Vec<Flow>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM flows WHERE project_id = ? ORDER BY created_at DESC, id DESC")
            .bind(project_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(row_to_flow).collect()
    }

    async fn update_folder(&self, id: &FlowId, folder_id: Option<&str>) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE flows SET folder_id = ?, updated_at = ? WHERE id = ?")
            .bind(folder_id)
            .bind(format_datetime(&Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_metadata(&self, id: &FlowId, metadata: Option<&Value>) -> Result<(), RepositoryError> {
        let metadata = metadata.map(to_json).transpose()?;

        let result = sqlx::query("UPDATE flows SET metadata = ?, updated_at = ? WHERE id = ?")
            .bind(metadata)
            .bind(format_datetime(&Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn claim_operation(
        &self,
        id: &FlowId,
        expected: FlowOperationStatus,
        new: FlowOperationStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE flows SET operation_status = ?, updated_at = ? WHERE id = ? AND operation_status = ?",
        )
        .bind(new.as_str())
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM flows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_err)?;
        match exists {
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn finish_operation(
        &self,
        id: &FlowId,
        status: Option<FlowStatus>,
    ) -> Result<Option<Flow>, RepositoryError> {
        let row = sqlx::query(
            r#"UPDATE flows SET operation_status = 'NONE', status = COALESCE(?, status), updated_at = ?
               WHERE id = ?
               RETURNING *"#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_err)?;

        row.as_ref().map(row_to_flow).transpose()
    }

    async fn delete_flow_cascade(&self, id: &FlowId) -> Result<bool, RepositoryError> {
        let id = id.to_string();
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        for statement in [
            "DELETE FROM flow_store WHERE flow_id = ?",
            "DELETE FROM trigger_sources WHERE flow_id = ?",
            "DELETE FROM flow_versions WHERE flow_id = ?",
        ] {
            sqlx::query(statement)
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
        }

        let result = sqlx::query("DELETE FROM flows WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_version(&self, id: &FlowVersionId) -> Result<Option<FlowVersion>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM flow_versions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(row_to_version).transpose()
    }

    async fn get_latest_version(&self, flow_id: &FlowId) -> Result<Option<FlowVersion>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM flow_versions WHERE flow_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(flow_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.as_ref().map(row_to_version).transpose()
    }

    async fn save_version(&self, version: &FlowVersion) -> Result<(), RepositoryError> {
        let result = sqlx::query(INSERT_VERSION)
            .bind(version.id.to_string())
            .bind(version.flow_id.to_string())
            .bind(&version.display_name)
            .bind(version.state.as_str())
            .bind(to_json(&version.trigger)?)
            .bind(to_json(&version.steps)?)
            .bind(version.valid)
            .bind(&version.updated_by)
            .bind(format_datetime(&version.created_at))
            .bind(format_datetime(&version.updated_at))
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!("version {} is locked", version.id)));
        }
        Ok(())
    }

    async fn publish_version(&self, flow_id: &FlowId, version_id: &FlowVersionId) -> Result<Flow, RepositoryError> {
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let locked = sqlx::query(
            "UPDATE flow_versions SET state = 'LOCKED', updated_at = ? WHERE id = ? AND flow_id = ?",
        )
        .bind(&now)
        .bind(version_id.to_string())
        .bind(flow_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;
        if locked.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        let row = sqlx::query("UPDATE flows SET published_version_id = ?, updated_at = ? WHERE id = ? RETURNING *")
            .bind(version_id.to_string())
            .bind(&now)
            .bind(flow_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_err)?
            .ok_or(RepositoryError::NotFound)?;
        let flow = row_to_flow(&row)?;

        tx.commit().await.map_err(query_err)?;
        Ok(flow)
    }
}
