//! Scheduled Jobs
//!
//! Background jobs that keep the event pipeline healthy: redelivery of
//! outbox rows whose dispatch never completed, and pruning of rows that
//! are no longer needed.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::interval;

use crate::events::Executor;
use crate::store::{HandlerLedger, OutboxRepository, Store, StoreError, Transaction};

// =========================================================================
// Outbox Relay
// =========================================================================

/// Re-submit outbox rows that are still undispatched after `redelivery_after`.
///
/// Covers a crash between commit and dispatch. Handlers already applied for
/// a redelivered event are skipped by the idempotency ledger.
pub async fn relay_outbox<S: Store>(
    store: &S,
    executor: &Executor<S>,
    redelivery_after: Duration,
    batch_size: i64,
) -> Result<usize, JobError> {
    let cutoff = Utc::now() - seconds(redelivery_after);

    let mut tx = store.begin().await?;
    let envelopes = tx.pending_outbox(cutoff, batch_size).await?;
    tx.rollback().await?;

    let count = envelopes.len();
    if count > 0 {
        tracing::warn!(count, "Redelivering stale outbox events");
        executor.submit(envelopes);
    }

    Ok(count)
}

// =========================================================================
// Retention
// =========================================================================

/// Delete dispatched outbox rows older than `retention`
pub async fn purge_dispatched_outbox<S: Store>(
    store: &S,
    retention: Duration,
) -> Result<u64, JobError> {
    let mut tx = store.begin().await?;
    let rows_deleted = tx.purge_dispatched(Utc::now() - seconds(retention)).await?;
    tx.commit().await?;

    if rows_deleted > 0 {
        tracing::info!(rows_deleted, "Purged dispatched outbox rows");
    }

    Ok(rows_deleted)
}

/// Delete handler ledger markers older than `retention`
pub async fn purge_handler_runs<S: Store>(store: &S, retention: Duration) -> Result<u64, JobError> {
    let mut tx = store.begin().await?;
    let rows_deleted = tx.purge_handler_runs(Utc::now() - seconds(retention)).await?;
    tx.commit().await?;

    if rows_deleted > 0 {
        tracing::info!(rows_deleted, "Purged processed event markers");
    }

    Ok(rows_deleted)
}

fn seconds(duration: Duration) -> chrono::Duration {
    chrono::Duration::seconds(duration.as_secs().min(i64::MAX as u64) as i64)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// How often the outbox is scanned (default: 5 seconds)
    pub outbox_poll_interval: Duration,
    /// Age after which an undispatched row is redelivered (default: 60 seconds)
    pub redelivery_after: Duration,
    /// Rows redelivered per scan (default: 100)
    pub batch_size: i64,
    /// How long dispatched rows and ledger markers are kept (default: 72 hours)
    pub retention: Duration,
    /// Interval for retention cleanup (default: 1 hour)
    pub cleanup_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            outbox_poll_interval: Duration::from_secs(5),
            redelivery_after: Duration::from_secs(60),
            batch_size: 100,
            retention: Duration::from_secs(72 * 3600),
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

/// Job Scheduler - runs the relay and the retention jobs
pub struct JobScheduler<S: Store> {
    store: S,
    executor: Executor<S>,
    config: JobSchedulerConfig,
}

impl<S: Store> JobScheduler<S> {
    pub fn new(store: S, executor: Executor<S>) -> Self {
        Self::with_config(store, executor, JobSchedulerConfig::default())
    }

    pub fn with_config(store: S, executor: Executor<S>, config: JobSchedulerConfig) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut relay_interval = interval(self.config.outbox_poll_interval);
        let mut cleanup_interval = interval(self.config.cleanup_interval);

        loop {
            tokio::select! {
                _ = relay_interval.tick() => {
                    if let Err(e) = relay_outbox(
                        &self.store,
                        &self.executor,
                        self.config.redelivery_after,
                        self.config.batch_size,
                    )
                    .await
                    {
                        tracing::error!(error = %e, "Outbox relay failed");
                    }
                }
                _ = cleanup_interval.tick() => {
                    if let Err(e) = purge_dispatched_outbox(&self.store, self.config.retention).await {
                        tracing::error!(error = %e, "Outbox purge failed");
                    }
                    if let Err(e) = purge_handler_runs(&self.store, self.config.retention).await {
                        tracing::error!(error = %e, "Processed event purge failed");
                    }
                }
            }
        }
    }

    /// Run all jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match relay_outbox(
            &self.store,
            &self.executor,
            self.config.redelivery_after,
            self.config.batch_size,
        )
        .await
        {
            Ok(count) => report.events_redelivered = count,
            Err(e) => report.errors.push(format!("Outbox relay: {}", e)),
        }

        match purge_dispatched_outbox(&self.store, self.config.retention).await {
            Ok(count) => report.outbox_rows_purged = count,
            Err(e) => report.errors.push(format!("Outbox purge: {}", e)),
        }

        match purge_handler_runs(&self.store, self.config.retention).await {
            Ok(count) => report.handler_runs_purged = count,
            Err(e) => report.errors.push(format!("Processed event purge: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running the jobs once
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub events_redelivered: usize,
    pub outbox_rows_purged: u64,
    pub handler_runs_purged: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainEvent, EventEnvelope, OperationContext};
    use crate::events::{DispatchConfig, HandlerRegistry};
    use crate::store::MemoryStore;
    use uuid::Uuid;

    fn scheduler(store: &MemoryStore, config: JobSchedulerConfig) -> JobScheduler<MemoryStore> {
        let executor = Executor::new(store.clone(), HandlerRegistry::new(), DispatchConfig::default());
        JobScheduler::with_config(store.clone(), executor, config)
    }

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.outbox_poll_interval, Duration::from_secs(5));
        assert_eq!(config.redelivery_after, Duration::from_secs(60));
        assert_eq!(config.retention, Duration::from_secs(259_200));
    }

    #[test]
    fn test_maintenance_report_default() {
        let report = MaintenanceReport::default();
        assert_eq!(report.events_redelivered, 0);
        assert_eq!(report.errors.len(), 0);
    }

    #[tokio::test]
    async fn test_relay_redelivers_stranded_rows() {
        let store = MemoryStore::new();
        let envelope = EventEnvelope::new(
            DomainEvent::MemberActivated { member_id: Uuid::new_v4() },
            &OperationContext::new(),
        );

        // Written by a commit whose process died before dispatch
        let mut tx = store.begin().await.unwrap();
        tx.append_outbox(&[envelope]).await.unwrap();
        tx.commit().await.unwrap();

        let config = JobSchedulerConfig {
            redelivery_after: Duration::ZERO,
            ..Default::default()
        };
        let scheduler = scheduler(&store, config);
        let report = scheduler.run_all_once().await;
        assert_eq!(report.events_redelivered, 1);
        assert!(report.errors.is_empty());

        scheduler.executor.wait_idle().await;
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fresh_rows_are_left_alone() {
        let store = MemoryStore::new();
        let envelope = EventEnvelope::new(
            DomainEvent::MemberActivated { member_id: Uuid::new_v4() },
            &OperationContext::new(),
        );
        let mut tx = store.begin().await.unwrap();
        tx.append_outbox(&[envelope]).await.unwrap();
        tx.commit().await.unwrap();

        let scheduler = scheduler(&store, JobSchedulerConfig::default());
        assert_eq!(scheduler.run_all_once().await.events_redelivered, 0);
    }
}
