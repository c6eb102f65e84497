//! Axum middleware for the BANTER API.

pub mod auth;

pub use auth::{auth_middleware, AuthMiddlewareError, AuthMiddlewareState, IdentityExtractor};
