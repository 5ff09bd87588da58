//! WaBulk API - REST API server
//!
//! This crate provides the HTTP surface of WaBulk: campaign lifecycle,
//! gateway settings, health checks and the OpenAPI document.

pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use openapi::{create_openapi_routes, ApiDoc};
pub use routes::create_router;
pub use state::AppState;
