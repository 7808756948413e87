//! Packrat - A bounded-capacity content cache server
//!
//! Stores uploaded files under caller-chosen keys, keeps their metadata in a
//! durable store and evicts the least recently used files once the configured
//! capacity is exceeded.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_sweep_task;
