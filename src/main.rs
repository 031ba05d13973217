//! Stratum authorization service - main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use rand::Rng;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use stratum_authz::{
    api,
    config::Config,
    db,
    error::{AppError, Result},
    services::directory::HttpResourceDirectory,
    services::scheduler_service,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration, then initialize tracing with its log level
    let config = Config::from_env()?;
    telemetry::init_tracing(&config.log_level);
    tracing::info!("Starting stratum-authz");

    // Connect to database
    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");

    // Provision a root administrator on first boot
    provision_root_user(&db_pool).await?;

    let directory = Arc::new(HttpResourceDirectory::new(
        &config.directory_url,
        config.directory_timeout_secs,
    )?);

    // Background housekeeping tasks
    scheduler_service::spawn_all(db_pool.clone(), Arc::new(config.clone()));

    let bind_address = config.bind_address.clone();
    let state = Arc::new(api::AppState::new(config, db_pool, directory));

    let app = api::routes::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = bind_address.parse()?;
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create a root administrator when no live user exists yet.
///
/// The password comes from `ROOT_PASSWORD` when set, otherwise a random one
/// is generated and logged once. Requires the hierarchy levels to be seeded;
/// without them bootstrap is skipped with a warning.
async fn provision_root_user(db: &sqlx::PgPool) -> Result<()> {
    let existing: Option<(uuid::Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE deleted_at IS NULL LIMIT 1")
            .fetch_optional(db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
    if existing.is_some() {
        return Ok(());
    }

    let root_type: Option<(i32,)> = sqlx::query_as(
        "SELECT id FROM types WHERE parent_id IS NULL AND deleted_at IS NULL LIMIT 1",
    )
    .fetch_optional(db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;
    let Some((root_type_id,)) = root_type else {
        tracing::warn!("No hierarchy levels seeded; skipping root user bootstrap");
        return Ok(());
    };

    let (password, generated) = match std::env::var("ROOT_PASSWORD") {
        Ok(p) if !p.is_empty() => (p, false),
        _ => {
            const CHARSET: &[u8] =
                b"abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789!@#$%&*";
            let mut rng = rand::rng();
            let p: String = (0..20)
                .map(|_| {
                    let idx = rng.random_range(0..CHARSET.len());
                    CHARSET[idx] as char
                })
                .collect();
            (p, true)
        }
    };

    let password_hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

    let mut salt_bytes = [0u8; 16];
    rand::rng().fill(&mut salt_bytes);
    let salt = hex::encode(salt_bytes);

    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, salt, type_id, scope_id,
                           is_active, display_name, created_at)
        VALUES ($1, 'root@localhost', $2, $3, $4, NULL, true, 'Root', NOW())
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind(&password_hash)
    .bind(&salt)
    .bind(root_type_id)
    .execute(db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    if generated {
        tracing::warn!("Root user created with generated password: {password}");
    } else {
        tracing::info!("Root user created");
    }
    Ok(())
}
