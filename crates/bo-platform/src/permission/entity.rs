//! Role-permission entry
//!
//! One row of the access matrix: what a role may do on one module.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::flags::Permission;
use crate::data::{Audit, Column, Entity, SqlValue};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RolePermission {
    pub id: i64,
    pub role_id: i64,
    pub role_code: String,
    pub module: String,
    /// Raw bitmask; see [`Permission`]
    pub permission: i32,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

impl RolePermission {
    pub const ROLE_ID: Column<RolePermission, i64> = Column::new("role_id");
    pub const ROLE_CODE: Column<RolePermission, String> = Column::new("role_code");
    pub const MODULE: Column<RolePermission, String> = Column::new("module");

    pub fn new(role_id: i64, role_code: impl Into<String>, module: impl Into<String>, permission: Permission) -> Self {
        Self {
            id: 0,
            role_id,
            role_code: role_code.into(),
            module: module.into(),
            permission: permission.bits(),
            audit: Audit::default(),
        }
    }

    /// Stored mask with unknown bits dropped
    pub fn mask(&self) -> Permission {
        Permission::from_bits_truncate(self.permission)
    }
}

impl Entity for RolePermission {
    type Key = i64;
    const TABLE: &'static str = "role_permissions";
    const CACHE_PREFIX: &'static str = "RolePermission";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn columns() -> &'static [&'static str] {
        &["role_id", "role_code", "module", "permission"]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.role_id.into(),
            self.role_code.as_str().into(),
            self.module.as_str().into(),
            self.permission.into(),
        ]
    }
}
