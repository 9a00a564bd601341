//! API Module
//!
//! HTTP handlers and routing for the diagnostics surface.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Cache statistics
//! - `GET /memory` - Memory pressure and leak status
//! - `GET|POST /network` - Network state; push a connectivity signal
//! - `GET /requests` - Recent request metrics
//! - `POST /cleanup` - Manual cleanup
//! - `POST /lifecycle` - Host visibility transition

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
