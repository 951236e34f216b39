//! Handler Registry
//!
//! Maps each event kind to the handlers that react to it. Registration is
//! the only extension point: a new cross-aggregate effect is a new handler,
//! never a change to the aggregate that raises the event.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{EventEnvelope, EventKind};
use crate::store::Transaction;

use super::HandlerError;

/// A reaction to committed events.
///
/// `handle` runs inside a fresh unit of work owned by the executor; the
/// handler must not commit or roll it back itself.
#[async_trait]
pub trait EventHandler<T: Transaction>: Send + Sync {
    /// Stable name, used in logs, the idempotency ledger and dead letters
    fn name(&self) -> &'static str;

    async fn handle(&self, envelope: &EventEnvelope, tx: &mut T) -> Result<(), HandlerError>;
}

/// Errors raised while building the registry
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("Handler '{handler}' is already registered for {kind}")]
    DuplicateHandler { kind: EventKind, handler: &'static str },
}

/// Event kind -> handlers, in registration order
pub struct HandlerRegistry<T: Transaction> {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler<T>>>>,
}

impl<T: Transaction> Default for HandlerRegistry<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<T: Transaction> HandlerRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`.
    ///
    /// Handler names must be unique per kind since they key the idempotency ledger.
    pub fn register(
        &mut self,
        kind: EventKind,
        handler: Arc<dyn EventHandler<T>>,
    ) -> Result<(), RegistryError> {
        let handlers = self.handlers.entry(kind).or_default();
        if handlers.iter().any(|h| h.name() == handler.name()) {
            return Err(RegistryError::DuplicateHandler {
                kind,
                handler: handler.name(),
            });
        }

        tracing::debug!(event_type = %kind, handler = handler.name(), "Handler registered");
        handlers.push(handler);
        Ok(())
    }

    /// Register one handler for several kinds
    pub fn register_many(
        &mut self,
        kinds: &[EventKind],
        handler: Arc<dyn EventHandler<T>>,
    ) -> Result<(), RegistryError> {
        for kind in kinds {
            self.register(*kind, handler.clone())?;
        }
        Ok(())
    }

    /// Handlers for `kind`; empty if none are registered
    pub fn handlers_for(&self, kind: EventKind) -> &[Arc<dyn EventHandler<T>>] {
        self.handlers.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of (kind, handler) registrations
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
