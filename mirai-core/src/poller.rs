// ABOUTME: Poller loop - fetches pending items and feeds EventRecords into the queue.
// ABOUTME: Keeps fetching while batches come back full so bursts drain in one cycle.

use crate::error::Result;
use crate::event::EventRecord;
use mirai_gateway::GatewayClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Fetches inbound items for one session key
pub struct Poller {
    gateway: Arc<dyn GatewayClient>,
    session_key: String,
    count: usize,
    interval: Duration,
}

impl Poller {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        session_key: impl Into<String>,
        count: usize,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            session_key: session_key.into(),
            count,
            interval,
        }
    }

    /// One poll cycle without the leading sleep.
    ///
    /// Fetches `count` items and, while the last batch was saturated, fetches
    /// again. Records come back in the order the gateway returned them.
    pub async fn poll_once(&self) -> Result<Vec<EventRecord>> {
        let mut items = self
            .gateway
            .fetch_messages(&self.session_key, self.count)
            .await?;
        let mut last_len = items.len();

        while last_len == self.count {
            let more = self
                .gateway
                .fetch_messages(&self.session_key, self.count)
                .await?;
            last_len = more.len();
            items.extend(more);
        }

        if !items.is_empty() {
            tracing::debug!(items = items.len(), "Fetched inbound items");
        }

        Ok(items.into_iter().map(EventRecord::from).collect())
    }

    /// Poll until `cancel` fires, the queue closes, or a fetch fails
    pub async fn run(
        self,
        queue: mpsc::UnboundedSender<EventRecord>,
        cancel: CancellationToken,
    ) -> Result<()> {
        tracing::debug!(
            count = self.count,
            interval_ms = self.interval.as_millis() as u64,
            "Poller started"
        );

        while !cancel.is_cancelled() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let records = self.poll_once().await.map_err(|e| {
                tracing::error!(error = %e, "Polling failed, stopping poller");
                e
            })?;

            for record in records {
                if queue.send(record).is_err() {
                    tracing::debug!("Event queue closed, stopping poller");
                    return Ok(());
                }
            }
        }

        tracing::debug!("Poller stopped");
        Ok(())
    }
}
