//! HTTP layer
//!
//! This module handles HTTP request routing and handling:
//! - Axum router dispatching every unmatched path to the site
//! - The site serve handler and error mapping
//! - Access-log middleware applied by the server on every request

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
