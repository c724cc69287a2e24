// plantpulse-ingest-core/src/web/mod.rs
// HTTP surface: server, handlers, middleware, response envelope

pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod server;

pub use responses::{ApiResponse, HealthCheck, HealthResponse};
