//! API Routes
//!
//! Operator endpoints over the event pipeline.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::events::Executor;
use crate::store::{DeadLetter, DeadLetterRepository, OutboxRepository, Store, Transaction};

/// Shared state of the operator surface
pub struct AppState<S: Store> {
    pub store: S,
    pub executor: Executor<S>,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, executor: Executor<S>) -> Self {
        Self { store, executor }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct DeadLettersQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct DeadLettersResponse {
    pub dead_letters: Vec<DeadLetter>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct OutboxResponse {
    /// Committed events whose handlers have not all finished
    pub pending: i64,
    /// Deliveries currently running in this process
    pub in_flight: usize,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/admin/dead-letters", get(list_dead_letters::<S>))
        .route("/admin/outbox", get(outbox_status::<S>))
}

// =========================================================================
// GET /admin/dead-letters
// =========================================================================

/// Most recent dead letters first
async fn list_dead_letters<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<DeadLettersQuery>,
) -> Result<Json<DeadLettersResponse>, AppError> {
    if !(1..=500).contains(&query.limit) {
        return Err(AppError::InvalidRequest(
            "limit must be between 1 and 500".to_string(),
        ));
    }

    let mut tx = state.store.begin().await?;
    let dead_letters = tx.list_dead_letters(query.limit).await?;
    tx.rollback().await?;

    Ok(Json(DeadLettersResponse {
        count: dead_letters.len(),
        dead_letters,
    }))
}

// =========================================================================
// GET /admin/outbox
// =========================================================================

async fn outbox_status<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Json<OutboxResponse>, AppError> {
    let mut tx = state.store.begin().await?;
    let pending = tx.count_pending().await?;
    tx.rollback().await?;

    Ok(Json(OutboxResponse {
        pending,
        in_flight: state.executor.in_flight(),
    }))
}
