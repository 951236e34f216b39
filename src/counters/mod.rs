//! Atomic Counter Materializer
//!
//! Denormalized counters are owned by one aggregate but changed by facts
//! about another. They are never written by loading and saving their owner:
//! every change is one conditional statement against the row, so concurrent
//! handlers touching the same row cannot lose updates.

mod catalog;

pub use catalog::{Counter, DerivedCounter};

use async_trait::async_trait;
use uuid::Uuid;

use crate::store::StoreError;

/// Counter primitives, executed inside the caller's unit of work
#[async_trait]
pub trait CounterMaterializer {
    /// Add one. Returns `false` if the owning row does not exist.
    async fn increment(&mut self, counter: Counter, id: Uuid) -> Result<bool, StoreError>;

    /// Subtract one unless the counter is already 0.
    ///
    /// Returns `false` (and changes nothing) when the counter was 0 or the
    /// row does not exist; neither case is an error.
    async fn decrement_floor_zero(&mut self, counter: Counter, id: Uuid)
        -> Result<bool, StoreError>;

    /// Overwrite a relationship counter with the authoritative count.
    /// Returns `false` if the member row does not exist.
    async fn recompute(&mut self, counter: DerivedCounter, id: Uuid) -> Result<bool, StoreError>;
}
