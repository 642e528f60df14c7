// src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use prepared_backend::config::Config;
use prepared_backend::error::AppError;
use prepared_backend::models::game::GameCatalog;
use prepared_backend::models::user::{NewUser, Role, normalize_email};
use prepared_backend::routes;
use prepared_backend::state::AppState;
use prepared_backend::store::{MemoryStore, PgStore, Store};
use prepared_backend::utils::hash::hash_password;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let store = open_store(&config).await;
    tracing::info!("Using {} store", store.backend());

    let games = match &config.game_content_path {
        Some(path) => GameCatalog::load(path).await,
        None => GameCatalog::builtin(),
    }
    .expect("Failed to load game content");

    if let Err(e) = seed_admin_user(store.as_ref(), &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = routes::create_router(AppState::new(store, config, games));

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server error");
}

/// Postgres when `DATABASE_URL` is set, otherwise the in-memory store
/// (snapshotted to `DATA_FILE` if given).
async fn open_store(config: &Config) -> Arc<dyn Store> {
    let Some(database_url) = &config.database_url else {
        let store = match &config.data_file {
            Some(path) => MemoryStore::open(path).await.expect("Failed to open data file"),
            None => MemoryStore::new(),
        };
        return Arc::new(store);
    };

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };
    tracing::info!("Database connected...");

    let store = PgStore::new(pool);
    tracing::info!("Running migrations...");
    store.migrate().await.expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    Arc::new(store)
}

async fn seed_admin_user(store: &dyn Store, config: &Config) -> Result<(), AppError> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };

    let email = normalize_email(email);
    if store.find_user_by_email(&email).await?.is_some() {
        return Ok(());
    }

    tracing::info!("Seeding admin user: {}", email);
    store
        .create_user(NewUser {
            name: config.admin_name.clone().unwrap_or_else(|| "Administrator".to_string()),
            email,
            password_hash: hash_password(password)?,
            role: Role::Admin,
            dob: None,
            class_standard: None,
            created_by: None,
        })
        .await?;
    tracing::info!("Admin user created successfully.");
    Ok(())
}
