//! matzip Library
//!
//! Restaurant review backend core: aggregates, commit-deferred domain
//! events, and the listeners that keep denormalized counters in step.

pub mod aggregate;
pub mod api;
pub mod counters;
pub mod domain;
pub mod events;
pub mod handlers;
pub mod jobs;
pub mod listeners;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use domain::{DomainError, DomainEvent, EventEnvelope, OperationContext};
pub use error::{AppError, AppResult, ErrorResponse};
