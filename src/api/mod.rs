//! API Module
//!
//! HTTP handlers and routing for the cache server.
//!
//! # Endpoints
//! - `GET /` - Cache status and entry listing
//! - `GET /health` - Health check endpoint
//! - `POST /:key` - Upload a file under a key
//! - `GET /:key` - Download the file stored under a key

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
