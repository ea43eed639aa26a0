//! API module
//!
//! HTTP API endpoints and middleware.

pub mod metrics;
pub mod middleware;
pub mod oplog;
pub mod routes;
pub mod state;

pub use metrics::HttpMetrics;

pub use routes::create_router;
pub use state::AppState;
