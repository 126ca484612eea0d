//! Permission Engine
//!
//! Bit-flag permissions per module, the role/module matrix, policy parsing
//! and its admin API.

pub mod api;
pub mod engine;
pub mod entity;
pub mod flags;
pub mod policy;

pub use api::{role_permissions_router, RolePermissionsState};
pub use engine::PermissionEngine;
pub use entity::RolePermission;
pub use flags::Permission;
pub use policy::{policies, PolicyProvider, PolicyRequirement};
