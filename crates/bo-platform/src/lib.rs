//! Backoffice Platform
//!
//! Core of the administrative back office:
//! - Generic data access: entity model, typed filters, repositories
//!   (PostgreSQL and in-memory) and a caching generic service
//! - Request-scoped identity context
//! - Permission engine over a role/module bit-flag matrix
//! - Credential lifecycle: login, refresh rotation, logout, blacklist
//! - Department reference module with its REST API
//!
//! ## Module Organization
//!
//! Each aggregate contains:
//! - `entity` - Domain entities
//! - `service` - Business rules (where applicable)
//! - `api` - REST endpoints

// Data access
pub mod cache;
pub mod data;
pub mod identity;

// Authentication & authorization
pub mod auth;
pub mod permission;

// Aggregates
pub mod department;

// Shared infrastructure
pub mod shared;

// Wiring
pub mod app;
pub mod seed;

pub use shared::error::{PlatformError, Result};
pub use shared::tsid::TsidGenerator;

pub use app::{init_schema, ApiDoc, Backend, Platform, PlatformSettings, Storage};
pub use auth::{
    AccessTokenClaims, Argon2Config, AuthConfig, AuthService, PasswordService, RoleRef, SessionService,
    SessionTokens, TokenBlacklist, UserAccount, UserDirectory,
};
pub use cache::{CacheEntryOptions, CachePriority, CacheStore};
pub use data::{Entity, EntityKey, Filter, GenericService, MemoryRepository, PageRequest, PgRepository, Repository};
pub use department::{Department, DepartmentService};
pub use identity::{IdentityContext, Language};
pub use permission::{policies, Permission, PermissionEngine, RolePermission};
pub use seed::DevDataSeeder;
