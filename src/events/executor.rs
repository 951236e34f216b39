//! Asynchronous Handler Executor
//!
//! Runs every (event, handler) pair as its own task in its own unit of
//! work. The submitting caller never waits. A failing, panicking or
//! timed-out handler affects only itself: its unit of work rolls back, it
//! is retried with backoff, and once its attempts are exhausted it is
//! written to the dead-letter table.
//!
//! An envelope is delivered at most once at a time per executor; a relay
//! resubmitting an event that is still being delivered is ignored.

use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::domain::EventEnvelope;
use crate::store::{
    DeadLetter, DeadLetterRepository, HandlerLedger, OutboxRepository, Store, StoreError,
    Transaction,
};

use super::{EventHandler, HandlerError, HandlerRegistry};

/// Executor tuning
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Deadline for a single handler attempt
    pub handler_timeout: Duration,
    /// Attempts per handler and event, including the first
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * retry_backoff` before the next one
    pub retry_backoff: Duration,
    /// Handler attempts allowed to run at once
    pub concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_millis(10_000),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(100),
            concurrency: 256,
        }
    }
}

/// Result of one successful attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Applied,
    /// The idempotency ledger shows this handler already processed the event
    Skipped,
}

struct Inner<S: Store> {
    store: S,
    registry: HandlerRegistry<S::Tx>,
    config: DispatchConfig,
    permits: Semaphore,
    in_flight: AtomicUsize,
    /// Event ids with a delivery task alive
    delivering: Mutex<HashSet<Uuid>>,
    idle: Notify,
}

impl<S: Store> Inner<S> {
    fn delivering(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.delivering
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases an envelope's delivery slot when its delivery task ends
struct InFlight<S: Store> {
    inner: Arc<Inner<S>>,
    event_id: Uuid,
}

impl<S: Store> Drop for InFlight<S> {
    fn drop(&mut self) {
        self.inner.delivering().remove(&self.event_id);
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Worker pool for committed events
pub struct Executor<S: Store> {
    inner: Arc<Inner<S>>,
}

impl<S: Store> Clone for Executor<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Store> Executor<S> {
    pub fn new(store: S, registry: HandlerRegistry<S::Tx>, config: DispatchConfig) -> Self {
        let permits = Semaphore::new(config.concurrency.max(1));
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                config,
                permits,
                in_flight: AtomicUsize::new(0),
                delivering: Mutex::new(HashSet::new()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Number of envelopes whose handlers have not all finished
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Hand committed envelopes to the pool. Returns immediately.
    ///
    /// Envelopes whose delivery is still running are skipped.
    pub fn submit(&self, envelopes: Vec<EventEnvelope>) {
        for envelope in envelopes {
            if !self.inner.delivering().insert(envelope.event_id) {
                tracing::debug!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.kind(),
                    "Event already being delivered; skipping"
                );
                continue;
            }
            self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
            let guard = InFlight {
                inner: self.inner.clone(),
                event_id: envelope.event_id,
            };
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let _guard = guard;
                deliver(inner, envelope).await;
            });
        }
    }

    /// Resolves once no delivery is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Run every registered handler for one envelope, then close its outbox row
async fn deliver<S: Store>(inner: Arc<Inner<S>>, envelope: EventEnvelope) {
    let handlers = inner.registry.handlers_for(envelope.kind()).to_vec();
    let envelope = Arc::new(envelope);

    let mut tasks = JoinSet::new();
    for handler in handlers {
        let inner = inner.clone();
        let envelope = envelope.clone();
        tasks.spawn(async move { run_handler(&inner, handler, envelope).await });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(
                event_id = %envelope.event_id,
                event_type = %envelope.kind(),
                error = %e,
                "Handler task aborted"
            );
        }
    }

    if let Err(e) = mark_dispatched(&inner.store, envelope.event_id).await {
        tracing::warn!(
            event_id = %envelope.event_id,
            error = %e,
            "Failed to mark outbox row dispatched; relay will redeliver"
        );
    }
}

async fn run_handler<S: Store>(
    inner: &Inner<S>,
    handler: Arc<dyn EventHandler<S::Tx>>,
    envelope: Arc<EventEnvelope>,
) {
    let Ok(_permit) = inner.permits.acquire().await else {
        return;
    };
    let config = &inner.config;
    let max_attempts = config.max_attempts.max(1);
    let mut last_error = HandlerError::failed("not attempted");

    for attempt in 1..=max_attempts {
        tracing::debug!(
            event_id = %envelope.event_id,
            event_type = %envelope.kind(),
            handler = handler.name(),
            attempt,
            "Running handler"
        );

        // Own task per attempt so a panic surfaces as a JoinError
        let mut attempt_task = tokio::spawn(run_attempt(
            inner.store.clone(),
            handler.clone(),
            envelope.clone(),
        ));
        let result = match tokio::time::timeout(config.handler_timeout, &mut attempt_task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => Err(HandlerError::failed(format!(
                "handler panicked: {}",
                panic_message(join_error.into_panic())
            ))),
            Ok(Err(join_error)) => Err(HandlerError::failed(join_error.to_string())),
            Err(_) => {
                attempt_task.abort();
                Err(HandlerError::Timeout(config.handler_timeout))
            }
        };

        match result {
            Ok(outcome) => {
                tracing::debug!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.kind(),
                    handler = handler.name(),
                    attempt,
                    skipped = outcome == Outcome::Skipped,
                    "Handler completed"
                );
                return;
            }
            Err(e) => {
                if e.is_timeout() {
                    tracing::warn!(
                        event_id = %envelope.event_id,
                        handler = handler.name(),
                        attempt,
                        timeout_ms = config.handler_timeout.as_millis() as u64,
                        "Handler timed out"
                    );
                } else {
                    tracing::warn!(
                        event_id = %envelope.event_id,
                        handler = handler.name(),
                        attempt,
                        error = %e,
                        "Handler attempt failed"
                    );
                }
                last_error = e;
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(config.retry_backoff * attempt).await;
        }
    }

    tracing::error!(
        event_id = %envelope.event_id,
        event_type = %envelope.kind(),
        handler = handler.name(),
        attempts = max_attempts,
        error = %last_error,
        "Handler exhausted its attempts; dead-lettering"
    );

    if let Err(e) =
        record_dead_letter(&inner.store, handler.name(), &envelope, &last_error, max_attempts).await
    {
        tracing::error!(
            event_id = %envelope.event_id,
            handler = handler.name(),
            error = %e,
            "Failed to record dead letter"
        );
    }
}

/// One attempt in a fresh unit of work
async fn run_attempt<S: Store>(
    store: S,
    handler: Arc<dyn EventHandler<S::Tx>>,
    envelope: Arc<EventEnvelope>,
) -> Result<Outcome, HandlerError> {
    let mut tx = store.begin().await?;

    if !tx.record_handler_run(envelope.event_id, handler.name()).await? {
        tx.rollback().await?;
        return Ok(Outcome::Skipped);
    }

    if let Err(e) = handler.handle(&envelope, &mut tx).await {
        if let Err(rollback_err) = tx.rollback().await {
            tracing::warn!(error = %rollback_err, "Rollback after handler failure failed");
        }
        return Err(e);
    }

    match tx.commit().await {
        Ok(()) => Ok(Outcome::Applied),
        // A concurrent delivery committed the same ledger marker first
        Err(StoreError::DuplicateKey(_)) => Ok(Outcome::Skipped),
        Err(e) => Err(e.into()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn record_dead_letter<S: Store>(
    store: &S,
    handler: &str,
    envelope: &EventEnvelope,
    error: &HandlerError,
    attempts: u32,
) -> Result<(), StoreError> {
    let dead_letter = DeadLetter {
        id: Uuid::new_v4(),
        event_id: envelope.event_id,
        event_type: envelope.kind().to_string(),
        handler: handler.to_string(),
        error: error.to_string(),
        attempts: attempts as i32,
        payload: serde_json::to_value(&envelope.event)?,
        failed_at: Utc::now(),
    };

    let mut tx = store.begin().await?;
    tx.record_dead_letter(&dead_letter).await?;
    tx.commit().await
}

async fn mark_dispatched<S: Store>(store: &S, event_id: Uuid) -> Result<(), StoreError> {
    let mut tx = store.begin().await?;
    tx.mark_dispatched(event_id).await?;
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }

    #[test]
    fn test_default_config() {
        let config = DispatchConfig::default();
        assert_eq!(config.handler_timeout, Duration::from_secs(10));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_backoff * 2, Duration::from_millis(200));
    }
}
