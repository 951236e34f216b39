//! Events module
//!
//! Propagation of committed domain facts: the handler registry, units of
//! work with their pending event buffers, and the asynchronous executor.

mod dispatcher;
mod error;
mod executor;
mod registry;

pub use dispatcher::{Dispatcher, EventBuffer, UnitOfWork};
pub use error::HandlerError;
pub use executor::{DispatchConfig, Executor};
pub use registry::{EventHandler, HandlerRegistry, RegistryError};
