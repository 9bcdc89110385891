//! Core runtime for the bioview result-set engine.
//!
//! Everything here runs on one UI thread. Async work (query-service calls) is
//! spawned as local futures and resumed by [`RuntimeHandle::drain_ui`], so a
//! future's continuation never interleaves with other UI code.

pub mod collections;
mod error;
mod platform;
mod runtime;

pub use error::QueryError;
pub use platform::{DefaultScheduler, RuntimeScheduler};
pub use runtime::{Runtime, RuntimeHandle, TaskHandle, UiDispatcher};
