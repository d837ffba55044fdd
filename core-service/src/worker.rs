//! # Uncollected Worker
//!
//! Background task that keeps uncollected-works collections current.
//!
//! The worker listens on the [`EventBus`] for
//! [`AuthorityEvent::InvolvementChanged`] and refreshes the named authority's
//! collection. Retryable failures (lock contention, busy database, pool
//! timeout) are retried with exponential backoff up to
//! [`MaintainerConfig::max_attempts`]; anything else is logged and dropped.
//! Every finished refresh is announced on the bus as
//! [`AuthorityEvent::UncollectedRefreshed`] or
//! [`AuthorityEvent::UncollectedRefreshFailed`].

use async_trait::async_trait;
use core_catalog::{CatalogError, RefreshOutcome, UncollectedMaintainer};
use core_runtime::config::MaintainerConfig;
use core_runtime::events::{AuthorityEvent, CoreEvent, EventBus, EventStream};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Seam between the worker and the store
#[async_trait]
pub trait UncollectedRefresher: Send + Sync {
    async fn refresh(&self, authority_id: &str) -> core_catalog::Result<RefreshOutcome>;
}

#[async_trait]
impl UncollectedRefresher for UncollectedMaintainer {
    async fn refresh(&self, authority_id: &str) -> core_catalog::Result<RefreshOutcome> {
        UncollectedMaintainer::refresh(self, authority_id).await
    }
}

#[derive(Clone)]
pub struct UncollectedWorker {
    refresher: Arc<dyn UncollectedRefresher>,
    event_bus: EventBus,
    config: MaintainerConfig,
    cancellation_token: CancellationToken,
}

/// Handle to a spawned worker
pub struct WorkerHandle {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop the worker and wait for the current refresh to wind down.
    pub async fn shutdown(self) {
        self.cancellation_token.cancel();
        if let Err(e) = self.join_handle.await {
            error!(error = %e, "Uncollected worker task panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

impl UncollectedWorker {
    pub fn new(
        refresher: Arc<dyn UncollectedRefresher>,
        event_bus: EventBus,
        config: MaintainerConfig,
    ) -> Self {
        Self {
            refresher,
            event_bus,
            config,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Subscribe to the bus and start processing events on the current
    /// runtime.
    ///
    /// The subscription is taken before this returns, so an event emitted
    /// right after `spawn` is not missed.
    pub fn spawn(self) -> WorkerHandle {
        let events = self.event_bus.stream().filter(|event| {
            matches!(
                event,
                CoreEvent::Authority(AuthorityEvent::InvolvementChanged { .. })
            )
        });
        let cancellation_token = self.cancellation_token.clone();

        let join_handle = tokio::spawn(async move { self.run(events).await });

        WorkerHandle {
            cancellation_token,
            join_handle,
        }
    }

    async fn run(self, mut events: EventStream) {
        info!("Uncollected worker started");

        loop {
            let received = tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                received = events.recv() => received,
            };

            match received {
                Ok(CoreEvent::Authority(AuthorityEvent::InvolvementChanged { authority_id })) => {
                    // Failures are already logged and published.
                    let _ = self.refresh_with_retry(&authority_id).await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Uncollected worker lagged behind the event bus");
                }
                Err(RecvError::Closed) => break,
            }
        }

        info!("Uncollected worker stopped");
    }

    /// Refresh one authority, retrying retryable failures with exponential
    /// backoff. Cancellation during a backoff returns the last error.
    #[instrument(skip(self))]
    pub async fn refresh_with_retry(
        &self,
        authority_id: &str,
    ) -> core_catalog::Result<RefreshOutcome> {
        let mut attempt = 1;

        loop {
            let error = match self.refresher.refresh(authority_id).await {
                Ok(outcome) => {
                    info!(
                        attempt,
                        collection_id = %outcome.collection_id,
                        added = outcome.added,
                        removed = outcome.removed,
                        "Uncollected works refreshed"
                    );
                    self.publish(AuthorityEvent::UncollectedRefreshed {
                        authority_id: authority_id.to_string(),
                        collection_id: outcome.collection_id.clone(),
                        added: outcome.added as u64,
                        removed: outcome.removed as u64,
                    });
                    return Ok(outcome);
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= self.config.max_attempts {
                return Err(self.give_up(authority_id, attempt, error));
            }

            let delay = self.config.backoff_for(attempt);
            debug!(attempt, ?delay, error = %error, "Retrying uncollected refresh");

            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    return Err(self.give_up(authority_id, attempt, error));
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Refresh several authorities one after another, each with retries.
    ///
    /// Duplicate ids are refreshed once. Returns the successful outcomes in
    /// input order; failures are logged and published.
    pub async fn refresh_many(&self, authority_ids: &[String]) -> Vec<RefreshOutcome> {
        let mut seen = HashSet::new();
        let mut outcomes = Vec::with_capacity(authority_ids.len());

        for authority_id in authority_ids {
            if self.cancellation_token.is_cancelled() {
                break;
            }
            if !seen.insert(authority_id.as_str()) {
                continue;
            }
            if let Ok(outcome) = self.refresh_with_retry(authority_id).await {
                outcomes.push(outcome);
            }
        }

        info!(
            requested = authority_ids.len(),
            refreshed = outcomes.len(),
            "Batch uncollected refresh finished"
        );
        outcomes
    }

    fn give_up(&self, authority_id: &str, attempts: u32, error: CatalogError) -> CatalogError {
        error!(authority_id, attempts, error = %error, "Uncollected refresh failed");
        self.publish(AuthorityEvent::UncollectedRefreshFailed {
            authority_id: authority_id.to_string(),
            message: error.to_string(),
            attempts,
        });
        error
    }

    fn publish(&self, event: AuthorityEvent) {
        // No subscribers is fine.
        self.event_bus.emit(CoreEvent::Authority(event)).ok();
    }
}
