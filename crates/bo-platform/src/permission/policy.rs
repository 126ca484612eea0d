//! Policy names and their parsed requirements
//!
//! A policy is named `<Module>.<Permission>`, e.g. `Department.Edit`.

use dashmap::DashMap;
use std::sync::Arc;

use super::flags::Permission;

/// Policy names used by the built-in endpoints
pub mod policies {
    pub const DEPARTMENT_VIEW: &str = "Department.View";
    pub const DEPARTMENT_CREATE: &str = "Department.Create";
    pub const DEPARTMENT_EDIT: &str = "Department.Edit";
    pub const DEPARTMENT_DELETE: &str = "Department.Delete";

    pub const ROLE_PERMISSION_VIEW: &str = "RolePermission.View";
    pub const ROLE_PERMISSION_CREATE: &str = "RolePermission.Create";
    pub const ROLE_PERMISSION_EDIT: &str = "RolePermission.Edit";
    pub const ROLE_PERMISSION_DELETE: &str = "RolePermission.Delete";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRequirement {
    pub module: String,
    pub permission: Permission,
}

impl PolicyRequirement {
    pub fn new(module: impl Into<String>, permission: Permission) -> Self {
        Self {
            module: module.into(),
            permission,
        }
    }

    /// Split on the first `.`. A missing or unknown permission segment
    /// gives an empty mask rather than an error.
    pub fn parse(policy: &str) -> Self {
        match policy.trim().split_once('.') {
            Some((module, permission)) => Self::new(module.trim(), Permission::parse_lenient(permission)),
            None => Self::new(policy.trim(), Permission::empty()),
        }
    }
}

/// Parses policy names once and keeps the result
#[derive(Default)]
pub struct PolicyProvider {
    parsed: DashMap<String, Arc<PolicyRequirement>>,
}

impl PolicyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, policy: &str) -> Arc<PolicyRequirement> {
        if let Some(requirement) = self.parsed.get(policy) {
            return Arc::clone(requirement.value());
        }

        let requirement = Arc::new(PolicyRequirement::parse(policy));
        self.parsed.insert(policy.to_string(), Arc::clone(&requirement));
        requirement
    }
}
