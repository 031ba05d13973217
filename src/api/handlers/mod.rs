//! HTTP request handlers.

pub mod actions;
pub mod auth;
pub mod authz;
pub mod health;
pub mod roles;
pub mod types;
