//! Backoffice Platform Server
//!
//! Serves the platform REST APIs:
//! - Auth: login, refresh, logout, current user
//! - Admin: departments, role permissions
//! - Health and OpenAPI / Swagger UI
//!
//! Configuration comes from a TOML file (`BACKOFFICE_CONFIG` or one of the
//! standard paths) with `BACKOFFICE_*` environment overrides. A database url
//! of `memory` runs on the in-process store.

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use bo_config::{AppConfig, ConfigLoader};
use bo_platform::{init_schema, Argon2Config, AuthConfig, DevDataSeeder, Platform, PlatformSettings, Storage};

const DEV_JWT_SECRET: &str = "backoffice-dev-secret-change-me";

#[tokio::main]
async fn main() -> Result<()> {
    bo_common::logging::init_logging("bo-server");

    info!("Starting Backoffice Platform Server");

    let config = ConfigLoader::new().load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let storage = if config.database.is_memory() {
        warn!("Using the in-memory store; data is lost on shutdown");
        Storage::memory()
    } else {
        info!("Connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        init_schema(&pool).await?;
        Storage::postgres(pool)
    };

    let platform = Arc::new(Platform::new(platform_settings(&config)?, storage));

    if config.dev_mode {
        if let Err(e) = DevDataSeeder::new(&platform).seed().await {
            warn!("Dev data seeding skipped: {}", e);
        }
    }

    let app = platform.router().layer(cors_layer(&config.http.cors_origins));

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("API server listening on http://{}", addr);
    info!("Swagger UI at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Backoffice Platform Server shutdown complete");
    Ok(())
}

fn platform_settings(config: &AppConfig) -> Result<PlatformSettings> {
    let secret_key = if config.auth.jwt_secret.is_empty() {
        warn!("No JWT secret configured; using the development secret");
        DEV_JWT_SECRET.to_string()
    } else {
        config.auth.jwt_secret.clone()
    };

    Ok(PlatformSettings {
        auth: AuthConfig {
            secret_key,
            issuer: config.auth.issuer.clone(),
            audience: config.auth.audience.clone(),
            access_token_expiry_secs: i64::try_from(config.auth.access_token_expiry_secs)
                .context("auth.access_token_expiry_secs is too large")?,
            refresh_token_expiry_secs: i64::try_from(config.auth.refresh_token_expiry_secs)
                .context("auth.refresh_token_expiry_secs is too large")?,
        },
        super_admin_code: config.auth.super_admin_code.clone(),
        login_attempts_per_minute: config.auth.login_attempts_per_minute,
        cache_max_entries: config.cache.max_entries,
        cache_default_ttl: Duration::from_secs(config.cache.default_ttl_secs),
        argon2: if config.dev_mode {
            Argon2Config::testing()
        } else {
            Argon2Config::default()
        },
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received...");
}
