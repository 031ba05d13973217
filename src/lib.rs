//! Stratum - Multi-tenant hierarchical authorization service.
//!
//! Decides whether an identity may perform a named action against a resource
//! in a strictly layered organizational hierarchy, and issues/verifies the
//! bearer tokens that carry identity between services.

#[macro_use]
mod macros;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
