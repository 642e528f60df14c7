// src/config.rs

use std::env;
use std::path::PathBuf;
use dotenvy::dotenv;

/// Threshold applied to new modules when the author does not set one.
pub const DEFAULT_MODULE_PASSING_SCORE: f64 = 70.0;

/// Threshold applied to a course-level assessment when the author does not set one.
pub const DEFAULT_COURSE_PASSING_SCORE: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Snapshot file for the in-memory store.
    pub data_file: Option<PathBuf>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub jwt_refresh_secret: String,
    pub jwt_refresh_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    pub client_url: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_name: Option<String>,
    pub module_passing_score: f64,
    pub course_passing_score: f64,
    pub game_content_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_refresh_secret = env::var("JWT_REFRESH_SECRET")
            .unwrap_or_else(|_| format!("{}_refresh", jwt_secret));

        Self {
            database_url: non_empty("DATABASE_URL"),
            data_file: non_empty("DATA_FILE").map(PathBuf::from),
            jwt_expiration: parsed("JWT_EXPIRATION", 900),
            jwt_refresh_expiration: parsed("JWT_REFRESH_EXPIRATION", 604_800),
            jwt_secret,
            jwt_refresh_secret,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            port: parsed("PORT", 5001),
            client_url: non_empty("CLIENT_URL"),
            admin_email: non_empty("ADMIN_EMAIL"),
            admin_password: non_empty("ADMIN_PASSWORD"),
            admin_name: non_empty("ADMIN_NAME"),
            module_passing_score: parsed("MODULE_PASSING_SCORE", DEFAULT_MODULE_PASSING_SCORE),
            course_passing_score: parsed("COURSE_PASSING_SCORE", DEFAULT_COURSE_PASSING_SCORE),
            game_content_path: non_empty("GAME_CONTENT_PATH").map(PathBuf::from),
        }
    }

    /// Configuration for tests and local tooling: in-memory store, fixed secrets.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            data_file: None,
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration: 600,
            jwt_refresh_secret: format!("{}_refresh", jwt_secret),
            jwt_refresh_expiration: 3600,
            rust_log: "error".to_string(),
            port: 0,
            client_url: None,
            admin_email: None,
            admin_password: None,
            admin_name: None,
            module_passing_score: DEFAULT_MODULE_PASSING_SCORE,
            course_passing_score: DEFAULT_COURSE_PASSING_SCORE,
            game_content_path: None,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
