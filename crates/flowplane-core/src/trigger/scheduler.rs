//! Periodic poll loop over every active production polling source.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use flowplane_types::error::FlowError;

use crate::repository::flow::FlowRepository;
use crate::repository::trigger_source::TriggerSourceRepository;
use crate::storage::FlowStore;

use super::manager::TriggerSourceManager;
use super::polling::PollingService;

pub struct PollingScheduler<F, S, K>
where
    F: FlowRepository,
    S: TriggerSourceRepository,
    K: FlowStore,
{
    flows: Arc<F>,
    triggers: Arc<TriggerSourceManager<S, K>>,
    polling: Arc<PollingService<K>>,
    interval: Duration,
}

impl<F, S, K> PollingScheduler<F, S, K>
where
    F: FlowRepository,
    S: TriggerSourceRepository,
    K: FlowStore,
{
    pub fn new(
        flows: Arc<F>,
        triggers: Arc<TriggerSourceManager<S, K>>,
        polling: Arc<PollingService<K>>,
        interval: Duration,
    ) -> Self {
        Self {
            flows,
            triggers,
            polling,
            interval,
        }
    }

    /// Poll every active source once. A failing source is logged and skipped.
    /// Returns the number of items emitted.
    pub async fn tick(&self) -> Result<usize, FlowError> {
        let sources = self.triggers.list_active_polling().await?;
        let mut emitted = 0;
        for source in &sources {
            match self.polling.poll_source(source, self.flows.as_ref()).await {
                Ok(count) => emitted += count,
                Err(e) => {
                    tracing::warn!(flow_id = %source.flow_id, trigger = %source.trigger_name, error = %e, "poll failed");
                }
            }
        }
        tracing::debug!(sources = sources.len(), emitted, "polling tick complete");
        Ok(emitted)
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "polling tick failed");
                    }
                }
            }
        }
        tracing::debug!("polling scheduler stopped");
    }
}
