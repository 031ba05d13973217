//! API module - HTTP handlers and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::directory::ResourceDirectory;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub directory: Arc<dyn ResourceDirectory>,
}

impl AppState {
    pub fn new(config: Config, db: PgPool, directory: Arc<dyn ResourceDirectory>) -> Self {
        Self {
            config,
            db,
            directory,
        }
    }
}

pub type SharedState = Arc<AppState>;
