//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation,
//! and the helper that moves blocking engine calls off the async runtime.
//!
//! # Tasks
//! - Orphan sweep: Deletes blobs left behind without metadata

mod blocking;
mod sweep;

pub use blocking::with_engine;
pub use sweep::spawn_sweep_task;
