//! Database models (SQLx).

pub mod action;
pub mod assignment;
pub mod hierarchy;
pub mod role;
pub mod token;
pub mod user;
