//! Application wiring
//!
//! Builds the service graph over one storage back end and assembles the
//! HTTP router. Repositories are registered per entity type the first time
//! they are asked for, so every service of an entity shares one instance.

use axum::Router;
use dashmap::DashMap;
use sqlx::PgPool;
use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{
    auth_router, Argon2Config, AuthApiState, AuthConfig, AuthService, LoginRateLimiter, MemoryUserDirectory,
    PasswordService, PgUserDirectory, RefreshToken, RefreshTokenService, SessionService, TokenBlacklist,
    UserDirectory,
};
use crate::cache::CacheStore;
use crate::data::{Entity, GenericService, MemoryRepository, PgRepository, Repository};
use crate::department::{departments_router, Department, DepartmentService, DepartmentsState, DEFAULT_DESCENDANTS_TTL};
use crate::permission::{role_permissions_router, PermissionEngine, RolePermission, RolePermissionsState};
use crate::shared::error::Result;
use crate::shared::health_api::{health_router, HealthState};
use crate::shared::middleware::{AppState, AuthLayer};

/// Where entities live
pub enum Backend {
    Postgres(PgPool),
    /// In-process store for dev mode and tests
    Memory { users: Arc<MemoryUserDirectory> },
}

pub struct Storage {
    backend: Backend,
    repositories: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Storage {
    pub fn postgres(pool: PgPool) -> Self {
        Self::with_backend(Backend::Postgres(pool))
    }

    pub fn memory() -> Self {
        Self::with_backend(Backend::Memory {
            users: Arc::new(MemoryUserDirectory::new()),
        })
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            repositories: DashMap::new(),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn pool(&self) -> Option<&PgPool> {
        match &self.backend {
            Backend::Postgres(pool) => Some(pool),
            Backend::Memory { .. } => None,
        }
    }

    /// The shared repository for `E`
    pub fn repository<E: Entity>(&self) -> Arc<dyn Repository<E>> {
        let entry = self.repositories.entry(TypeId::of::<E>()).or_insert_with(|| {
            let repository: Arc<dyn Repository<E>> = match &self.backend {
                Backend::Postgres(pool) => Arc::new(PgRepository::<E>::new(pool.clone())),
                Backend::Memory { .. } => Arc::new(MemoryRepository::<E>::new()),
            };
            Box::new(repository)
        });

        match entry.downcast_ref::<Arc<dyn Repository<E>>>() {
            Some(repository) => Arc::clone(repository),
            // keyed by TypeId, so the stored value always has this type
            None => unreachable!("repository registry holds a foreign type for {}", E::TABLE),
        }
    }

    pub fn user_directory(&self) -> Arc<dyn UserDirectory> {
        match &self.backend {
            Backend::Postgres(pool) => Arc::new(PgUserDirectory::new(pool.clone())),
            Backend::Memory { users } => users.clone(),
        }
    }
}

/// Create the tables the platform reads and writes
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("Database schema ready");
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS "roles" (
    "id" BIGSERIAL PRIMARY KEY,
    "code" TEXT NOT NULL UNIQUE,
    "name" TEXT NOT NULL,
    "is_deleted" BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS "users" (
    "id" TEXT PRIMARY KEY,
    "username" TEXT NOT NULL,
    "email" TEXT,
    "password_hash" TEXT NOT NULL,
    "is_active" BOOLEAN NOT NULL DEFAULT TRUE,
    "language" TEXT NOT NULL DEFAULT 'en',
    "is_deleted" BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE UNIQUE INDEX IF NOT EXISTS "users_username_idx" ON "users" (LOWER("username"));

CREATE TABLE IF NOT EXISTS "user_roles" (
    "user_id" TEXT NOT NULL REFERENCES "users" ("id"),
    "role_id" BIGINT NOT NULL REFERENCES "roles" ("id"),
    PRIMARY KEY ("user_id", "role_id")
);

CREATE TABLE IF NOT EXISTS "role_permissions" (
    "id" BIGSERIAL PRIMARY KEY,
    "role_id" BIGINT NOT NULL,
    "role_code" TEXT NOT NULL,
    "module" TEXT NOT NULL,
    "permission" INTEGER NOT NULL,
    "created_at" TIMESTAMPTZ NOT NULL,
    "created_by" TEXT NOT NULL,
    "updated_at" TIMESTAMPTZ,
    "updated_by" TEXT,
    "is_deleted" BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE INDEX IF NOT EXISTS "role_permissions_role_id_idx" ON "role_permissions" ("role_id");
CREATE INDEX IF NOT EXISTS "role_permissions_role_code_idx" ON "role_permissions" ("role_code");
CREATE UNIQUE INDEX IF NOT EXISTS "role_permissions_role_module_idx" ON "role_permissions" ("role_id", LOWER("module")) WHERE NOT "is_deleted";

CREATE TABLE IF NOT EXISTS "refresh_tokens" (
    "id" TEXT PRIMARY KEY,
    "user_id" TEXT NOT NULL,
    "device_id" TEXT NOT NULL,
    "token_hash" TEXT,
    "access_token_id" TEXT NOT NULL,
    "expires_at" TIMESTAMPTZ NOT NULL,
    "created_at" TIMESTAMPTZ NOT NULL,
    "created_by" TEXT NOT NULL,
    "updated_at" TIMESTAMPTZ,
    "updated_by" TEXT,
    "is_deleted" BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE INDEX IF NOT EXISTS "refresh_tokens_hash_idx" ON "refresh_tokens" ("token_hash");
CREATE INDEX IF NOT EXISTS "refresh_tokens_user_device_idx" ON "refresh_tokens" ("user_id", "device_id");

CREATE TABLE IF NOT EXISTS "departments" (
    "id" TEXT PRIMARY KEY,
    "code" TEXT NOT NULL,
    "name" TEXT NOT NULL,
    "description" TEXT,
    "parent_id" TEXT,
    "path" TEXT NOT NULL,
    "created_at" TIMESTAMPTZ NOT NULL,
    "created_by" TEXT NOT NULL,
    "updated_at" TIMESTAMPTZ,
    "updated_by" TEXT,
    "is_deleted" BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE INDEX IF NOT EXISTS "departments_path_idx" ON "departments" ("path" text_pattern_ops);
CREATE UNIQUE INDEX IF NOT EXISTS "departments_code_idx" ON "departments" (LOWER("code")) WHERE NOT "is_deleted";
"#;

/// Settings the service graph is built from
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub auth: AuthConfig,
    pub super_admin_code: String,
    pub login_attempts_per_minute: u32,
    /// 0 means unbounded
    pub cache_max_entries: usize,
    /// Lifetime of cached query results that are not invalidation-only
    pub cache_default_ttl: Duration,
    pub argon2: Argon2Config,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            super_admin_code: "SuperAdmin".to_string(),
            login_attempts_per_minute: 10,
            cache_max_entries: 0,
            cache_default_ttl: DEFAULT_DESCENDANTS_TTL,
            argon2: Argon2Config::default(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Backoffice Platform API", description = "Authentication, access control and administration"),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Login, token refresh, logout and current user"),
        (name = "departments", description = "Department administration"),
        (name = "role-permissions", description = "Role permission matrix administration")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// The assembled platform: every service, sharing one cache and one storage
pub struct Platform {
    pub storage: Arc<Storage>,
    pub cache: Arc<CacheStore>,
    pub auth_service: Arc<AuthService>,
    pub passwords: Arc<PasswordService>,
    pub blacklist: Arc<TokenBlacklist>,
    pub sessions: Arc<SessionService>,
    pub engine: Arc<PermissionEngine>,
    pub departments: DepartmentService,
}

impl Platform {
    pub fn new(settings: PlatformSettings, storage: Storage) -> Self {
        let storage = Arc::new(storage);
        let cache = Arc::new(if settings.cache_max_entries > 0 {
            CacheStore::with_capacity_limit(settings.cache_max_entries)
        } else {
            CacheStore::new()
        });

        let auth_service = Arc::new(AuthService::new(settings.auth));
        let passwords = Arc::new(PasswordService::new(settings.argon2));
        let blacklist = Arc::new(TokenBlacklist::new(Arc::clone(&cache)));

        let refresh_tokens = Arc::new(RefreshTokenService::new(
            GenericService::new(storage.repository::<RefreshToken>(), Arc::clone(&cache)),
            auth_service.refresh_token_ttl(),
        ));
        let sessions = Arc::new(SessionService::new(
            Arc::clone(&auth_service),
            storage.user_directory(),
            Arc::clone(&passwords),
            refresh_tokens,
            Arc::clone(&blacklist),
            LoginRateLimiter::per_minute(settings.login_attempts_per_minute),
        ));

        let platform = Self {
            engine: Arc::new(PermissionEngine::new(
                GenericService::new(storage.repository::<RolePermission>(), Arc::clone(&cache)),
                settings.super_admin_code,
            )),
            departments: DepartmentService::new(GenericService::new(
                storage.repository::<Department>(),
                Arc::clone(&cache),
            ))
            .with_cache_ttl(settings.cache_default_ttl),
            storage,
            cache,
            auth_service,
            passwords,
            blacklist,
            sessions,
        };
        info!(
            backend = if platform.storage.pool().is_some() { "postgres" } else { "memory" },
            "Platform services initialized"
        );
        platform
    }

    /// Generic service for any entity, over the shared repository and cache
    pub fn service<E: Entity>(&self) -> GenericService<E> {
        GenericService::new(self.storage.repository::<E>(), Arc::clone(&self.cache))
    }

    /// Every HTTP route, behind the authentication and trace layers
    pub fn router(&self) -> Router {
        let auth_state = AuthApiState {
            sessions: Arc::clone(&self.sessions),
            engine: Arc::clone(&self.engine),
        };
        let departments_state = DepartmentsState {
            service: self.departments.clone(),
            engine: Arc::clone(&self.engine),
        };
        let role_permissions_state = RolePermissionsState {
            service: self.service::<RolePermission>(),
            engine: Arc::clone(&self.engine),
        };

        let (router, mut openapi) = OpenApiRouter::with_openapi(ApiDoc::openapi())
            .nest("/auth", auth_router(auth_state))
            .nest("/api/departments", departments_router(departments_state))
            .nest("/api/role-permissions", role_permissions_router(role_permissions_state))
            .split_for_parts();
        openapi.info.version = env!("CARGO_PKG_VERSION").to_string();

        let app_state = AppState {
            auth_service: Arc::clone(&self.auth_service),
            blacklist: Arc::clone(&self.blacklist),
        };
        let health_state = HealthState::new(self.storage.pool().cloned(), Arc::clone(&self.cache));

        Router::new()
            .merge(router)
            .nest("/health", health_router(health_state))
            .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", openapi))
            .layer(AuthLayer::new(app_state))
            .layer(TraceLayer::new_for_http())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_shares_repositories() {
        let storage = Storage::memory();
        let first = storage.repository::<Department>();
        let second = storage.repository::<Department>();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(storage.pool().is_none());
    }

    #[test]
    fn test_openapi_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
