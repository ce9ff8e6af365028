//! EventGateway - HTTP ingress for analytics events
//!
//! Accepts `POST /api/event`, decodes and enriches each event, and hands it
//! to the [`event_pipeline`] without waiting for persistence.

pub mod config;
pub mod error;
pub mod gateway;
pub mod rest_api;

pub use config::GatewayConfig;
pub use error::{ErrorDetail, ErrorResponse, GatewayError, GatewayResult};
pub use gateway::EventGateway;
pub use rest_api::{create_routes, HealthResponse};
