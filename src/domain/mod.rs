//! Domain module
//!
//! Core domain types: events, errors and operation context.

pub mod context;
pub mod error;
pub mod events;

pub use context::OperationContext;
pub use error::DomainError;
pub use events::{DomainEvent, EventEnvelope, EventKind, ProfileField};
