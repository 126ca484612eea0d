//! Shared Module
//!
//! Cross-cutting concerns: errors, ids, request plumbing and health.

pub mod api_common;
pub mod error;
pub mod health_api;
pub mod middleware;
pub mod tsid;

pub use api_common::{CursorParams, OptionalJson, PaginationParams, ValidatedJson, ValidatedPath, ValidatedQuery};
pub use error::{PlatformError, Result};
pub use health_api::{health_router, HealthState};
pub use middleware::{AppState, AuthLayer, Authenticated, BearerClaims};
pub use tsid::TsidGenerator;
