//! Business logic services.

pub mod directory;
pub mod hierarchy_service;
pub mod permission_service;
pub mod role_service;
pub mod scheduler_service;
pub mod token_service;
