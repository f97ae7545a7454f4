//! Background consumer of the analysis queue.
//!
//! Drains batches on an interval, groups items by organization to amortize
//! analysis cost, and records per-item insights. One bad item never blocks
//! the rest of its batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm::FallbackProvider;
use crate::queue::{AnalysisQueue, QueuedEmail};
use crate::store::{Store, StoredInsight};

/// Worker tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the queue is polled.
    pub poll_interval: Duration,
    /// Max items drained per tick.
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            batch_size: 25,
        }
    }
}

/// Asynchronous analysis worker.
pub struct AnalysisWorker {
    queue: Arc<AnalysisQueue>,
    provider: Arc<FallbackProvider>,
    store: Arc<dyn Store>,
    config: WorkerConfig,
}

impl AnalysisWorker {
    pub fn new(
        queue: Arc<AnalysisQueue>,
        provider: Arc<FallbackProvider>,
        store: Arc<dyn Store>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            provider,
            store,
            config,
        }
    }

    /// Spawn the polling loop. Runs until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.config.poll_interval.as_secs(),
                batch_size = self.config.batch_size,
                "Analysis worker started"
            );
            let mut interval = tokio::time::interval(self.config.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.process_batch().await;
            }
        })
    }

    /// Drain and analyze one batch. Returns (analyzed, failed) counts.
    pub async fn process_batch(&self) -> (usize, usize) {
        let batch = self.queue.drain_batch(self.config.batch_size);
        if batch.is_empty() {
            return (0, 0);
        }

        // Group by organization; drain order (priority, then FIFO) is
        // preserved within each group.
        let mut by_org: BTreeMap<String, Vec<QueuedEmail>> = BTreeMap::new();
        for item in batch {
            by_org.entry(item.organization_id.clone()).or_default().push(item);
        }

        let mut analyzed = 0usize;
        let mut failed = 0usize;
        for (organization, items) in by_org {
            debug!(organization = %organization, items = items.len(), "Analyzing batch group");
            let results = join_all(items.iter().map(|item| self.analyze_item(item))).await;
            for (item, result) in items.iter().zip(results) {
                match result {
                    Ok(()) => analyzed += 1,
                    Err(e) => {
                        // Isolated: recorded and skipped, the rest of the
                        // batch continues.
                        warn!(
                            item_id = %item.id,
                            organization = %item.organization_id,
                            error = %e,
                            "Analysis item failed"
                        );
                        failed += 1;
                    }
                }
            }
        }

        info!(analyzed, failed, "Batch processed");
        (analyzed, failed)
    }

    async fn analyze_item(&self, item: &QueuedEmail) -> Result<(), crate::error::StoreError> {
        let insights = self.provider.analyze(&item.email).await;
        self.store
            .record_insight(&StoredInsight {
                id: Uuid::new_v4(),
                email_id: item.email.id,
                organization_id: item.organization_id.clone(),
                priority: item.priority,
                insights,
                analyzed_at: Utc::now(),
            })
            .await
    }
}
