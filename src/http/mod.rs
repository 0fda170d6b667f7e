//! HTTP boundary for the admission service.
//!
//! The handlers derive a client key from the peer address (and optionally a
//! user id), ask the limiter for a decision and map it onto the response.

mod handlers;
mod server;

pub use handlers::{health, security_check, AppState, HealthResponse, SecurityCheckResponse};
pub use server::{router, HttpServer};
