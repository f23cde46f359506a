//! Multi-user to-do list REST API.
//!
//! Users register and log in to receive a bearer token; every task operation
//! is scoped to the identity inside that token.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod store;
pub mod tasks;

pub use config::Config;
pub use error::ApiError;
