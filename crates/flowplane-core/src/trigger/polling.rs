//! Timestamp-cursor deduplication for polling triggers.
//!
//! Each polling trigger keeps a `lastFetchEpochMS` cursor in the flow store.
//! A poll emits only items strictly newer than the cursor, then moves the
//! cursor to the newest timestamp seen, including items that were not
//! emitted. Items arriving late with a timestamp at or below the cursor are
//! dropped.
//!
//! The very first poll (cursor absent) fetches a bounded page, emits nothing
//! and only seeds the cursor, so enabling a flow does not replay history.

use std::sync::Arc;

use serde_json::Value;

use flowplane_types::error::FlowError;
use flowplane_types::event::FlowEvent;
use flowplane_types::flow::{FlowId, FlowTrigger, FlowVersion};
use flowplane_types::trigger::{PollRequest, PollingItem, TriggerSource};

use crate::engine::BoxTriggerEngine;
use crate::event::EventBus;
use crate::repository::flow::FlowRepository;
use crate::storage::FlowStore;

/// Store key of a trigger's polling cursor.
pub fn cursor_key(trigger_name: &str) -> String {
    format!("polling/{trigger_name}/last_fetch_epoch_ms")
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Result of deduplicating one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupOutcome {
    pub new_items: Vec<PollingItem>,
    pub cursor: i64,
}

/// Stateless TIMEBASED strategy.
pub struct TimeBasedStrategy;

impl TimeBasedStrategy {
    /// Keep items newer than `cursor` and advance it to the newest timestamp.
    pub fn dedupe(cursor: i64, items: Vec<PollingItem>) -> DedupOutcome {
        let newest = items
            .iter()
            .map(|item| item.epoch_milli_seconds)
            .max()
            .unwrap_or(cursor);
        let new_items = items
            .into_iter()
            .filter(|item| item.epoch_milli_seconds > cursor)
            .collect();
        DedupOutcome {
            new_items,
            cursor: cursor.max(newest),
        }
    }

    /// Seed a cursor from a warm-up batch. Nothing is emitted.
    pub fn seed(items: &[PollingItem]) -> i64 {
        items
            .iter()
            .map(|item| item.epoch_milli_seconds)
            .max()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// PollingService
// ---------------------------------------------------------------------------

/// Joins the engine, the cursor store and the strategy.
pub struct PollingService<K: FlowStore> {
    store: Arc<K>,
    engine: Arc<BoxTriggerEngine>,
    events: EventBus,
    first_poll_limit: usize,
}

impl<K: FlowStore> PollingService<K> {
    pub fn new(
        store: Arc<K>,
        engine: Arc<BoxTriggerEngine>,
        events: EventBus,
        first_poll_limit: usize,
    ) -> Self {
        Self {
            store,
            engine,
            events,
            first_poll_limit,
        }
    }

    /// `None` until the first poll has seeded the cursor.
    async fn read_cursor(&self, flow_id: &FlowId, key: &str) -> Result<Option<i64>, FlowError> {
        let value = self.store.get(flow_id, key).await?;
        Ok(value.and_then(|v| v.as_i64()))
    }

    /// Run one poll cycle for a version and return the newly seen items.
    pub async fn poll(&self, version: &FlowVersion, project_id: &str) -> Result<Vec<Value>, FlowError> {
        let trigger_name = polled_trigger_name(version)?;
        let key = cursor_key(trigger_name);
        let flow_id = version.flow_id;
        let Some(cursor) = self.read_cursor(&flow_id, &key).await? else {
            let request = PollRequest {
                last_fetch_epoch_ms: 0,
                max_items: Some(self.first_poll_limit),
            };
            let items = self.engine.poll(version, project_id, request).await?;
            let seeded = TimeBasedStrategy::seed(&items);
            self.store.put(&flow_id, &key, &Value::from(seeded)).await?;
            tracing::debug!(%flow_id, trigger_name, cursor = seeded, "polling cursor seeded");
            return Ok(Vec::new());
        };

        let request = PollRequest {
            last_fetch_epoch_ms: cursor,
            max_items: None,
        };
        let items = self.engine.poll(version, project_id, request).await?;
        let outcome = TimeBasedStrategy::dedupe(cursor, items);
        if outcome.cursor != cursor {
            self.store.put(&flow_id, &key, &Value::from(outcome.cursor)).await?;
        }

        tracing::debug!(
            %flow_id,
            trigger_name,
            emitted = outcome.new_items.len(),
            cursor = outcome.cursor,
            "poll complete"
        );
        Ok(outcome.new_items.into_iter().map(|item| item.data).collect())
    }

    /// Poll an active source and publish whatever is new.
    pub async fn poll_source<F: FlowRepository>(
        &self,
        source: &TriggerSource,
        flows: &F,
    ) -> Result<usize, FlowError> {
        let version = flows
            .get_version(&source.flow_version_id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("flow version {}", source.flow_version_id)))?;

        let items = self.poll(&version, &source.project_id).await?;
        let count = items.len();
        if count > 0 {
            self.events.publish(FlowEvent::PolledItemsReady {
                project_id: source.project_id.clone(),
                flow_id: source.flow_id,
                items,
            });
        }
        Ok(count)
    }

    /// Forget the cursor so the next poll warms up again.
    pub async fn reset(&self, flow_id: &FlowId, trigger_name: &str) -> Result<(), FlowError> {
        self.store.delete(flow_id, &cursor_key(trigger_name)).await?;
        Ok(())
    }

    /// Fetch sample items through the piece's test hook. Never touches the
    /// cursor.
    pub async fn test_sample(
        &self,
        version: &FlowVersion,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<Value>, FlowError> {
        let outcome = self.engine.test(version, project_id).await?;
        if !outcome.success {
            return Err(FlowError::TestTriggerFailed(
                outcome
                    .message
                    .unwrap_or_else(|| "trigger test returned no message".to_string()),
            ));
        }
        Ok(outcome.output.into_iter().take(limit).collect())
    }
}

fn polled_trigger_name(version: &FlowVersion) -> Result<&str, FlowError> {
    match &version.trigger {
        FlowTrigger::Piece(trigger) => Ok(&trigger.trigger_name),
        FlowTrigger::Empty => Err(FlowError::Validation(
            "flow version has no trigger configured".to_string(),
        )),
    }
}
