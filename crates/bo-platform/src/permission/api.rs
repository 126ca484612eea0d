//! Role Permissions Admin API
//!
//! REST endpoints for the role/module permission matrix. Every write goes
//! through the generic service, which drops the cached matrices under the
//! `RolePermission_` prefix.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::engine::PermissionEngine;
use super::entity::RolePermission;
use super::flags::Permission;
use super::policy::policies;
use crate::data::{Filter, GenericService};
use crate::shared::api_common::{
    ApiResponse, PagedResult, PaginationParams, ValidatedJson, ValidatedPath, ValidatedQuery,
};
use crate::shared::error::PlatformError;
use crate::shared::middleware::Authenticated;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRolePermissionRequest {
    pub role_id: i64,
    pub role_code: String,
    pub module: String,
    /// Flag names (`View`, `Edit`, ...) or `All`
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRolePermissionRequest {
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionResponse {
    pub id: i64,
    pub role_id: i64,
    pub role_code: String,
    pub module: String,
    /// Raw bitmask
    pub permission: i32,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl From<RolePermission> for RolePermissionResponse {
    fn from(entry: RolePermission) -> Self {
        let permissions = entry.mask().names();
        Self {
            id: entry.id,
            role_id: entry.role_id,
            role_code: entry.role_code,
            module: entry.module,
            permission: entry.permission,
            permissions,
            created_at: entry.audit.created_at,
            created_by: entry.audit.created_by,
            updated_at: entry.audit.updated_at,
            updated_by: entry.audit.updated_by,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RolePermissionsQuery {
    pub role_id: Option<i64>,
    pub role_code: Option<String>,
    pub module: Option<String>,
}

#[derive(Clone)]
pub struct RolePermissionsState {
    pub service: GenericService<RolePermission>,
    pub engine: Arc<PermissionEngine>,
}

fn parse_mask(names: &[String]) -> Result<Permission, PlatformError> {
    let mask = Permission::parse_lenient(&names.join(","));
    if mask.is_empty() {
        return Err(PlatformError::validation(format!(
            "At least one valid permission is required, got [{}]",
            names.join(", ")
        )));
    }
    Ok(mask)
}

/// List role permission entries
#[utoipa::path(
    get,
    path = "/",
    tag = "role-permissions",
    operation_id = "getApiRolePermissions",
    params(PaginationParams, RolePermissionsQuery),
    responses(
        (status = 200, description = "Page of role permission entries", body = ApiResponse<PagedResult<RolePermissionResponse>>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Missing RolePermission.View")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_role_permissions(
    State(state): State<RolePermissionsState>,
    auth: Authenticated,
    ValidatedQuery(pagination): ValidatedQuery<PaginationParams>,
    ValidatedQuery(query): ValidatedQuery<RolePermissionsQuery>,
) -> Result<Json<ApiResponse<PagedResult<RolePermissionResponse>>>, PlatformError> {
    state.engine.authorize(Some(&*auth), policies::ROLE_PERMISSION_VIEW).await?;

    let mut filter = Filter::all();
    if let Some(role_id) = query.role_id {
        filter = filter.and(RolePermission::ROLE_ID.eq(role_id));
    }
    if let Some(role_code) = query.role_code.filter(|c| !c.is_empty()) {
        filter = filter.and(RolePermission::ROLE_CODE.eq(role_code));
    }
    if let Some(module) = query.module.filter(|m| !m.is_empty()) {
        filter = filter.and(RolePermission::MODULE.eq(module));
    }

    let page = state.service.get_page(filter, pagination.to_request()).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// Grant a role permissions on a module
#[utoipa::path(
    post,
    path = "/",
    tag = "role-permissions",
    operation_id = "postApiRolePermissions",
    request_body = CreateRolePermissionRequest,
    responses(
        (status = 201, description = "Entry created", body = ApiResponse<RolePermissionResponse>),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Entry already exists for role and module")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_role_permission(
    State(state): State<RolePermissionsState>,
    auth: Authenticated,
    ValidatedJson(req): ValidatedJson<CreateRolePermissionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RolePermissionResponse>>), PlatformError> {
    state.engine.authorize(Some(&*auth), policies::ROLE_PERMISSION_CREATE).await?;

    let module = req.module.trim().to_string();
    if module.is_empty() {
        return Err(PlatformError::validation("Module is required"));
    }
    let mask = parse_mask(&req.permissions)?;

    let duplicate = RolePermission::ROLE_ID
        .eq(req.role_id)
        .and(RolePermission::MODULE.eq_ignore_case(module.clone()))
        .and(Filter::not_deleted());
    let existing: Option<RolePermission> = state.service.get_single(&duplicate).await?;
    if existing.is_some() {
        return Err(entry_exists(req.role_id, &module));
    }

    let entry = RolePermission::new(req.role_id, req.role_code.trim(), module.clone(), mask);
    // the unique index on (role_id, LOWER(module)) catches a concurrent insert
    let created = state.service.create(entry, None).await.map_err(|e| match &e {
        PlatformError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            entry_exists(req.role_id, &module)
        }
        _ => e,
    })?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::created(RolePermissionResponse::from(created), "Role permission created")),
    ))
}

fn entry_exists(role_id: i64, module: &str) -> PlatformError {
    PlatformError::conflict(
        "ROLE_PERMISSION_EXISTS",
        format!("Role {} already has an entry for module '{}'", role_id, module),
    )
}

/// Replace the permissions of an entry
#[utoipa::path(
    put,
    path = "/{id}",
    tag = "role-permissions",
    operation_id = "putApiRolePermissionsById",
    params(("id" = i64, Path, description = "Entry id")),
    request_body = UpdateRolePermissionRequest,
    responses(
        (status = 200, description = "Entry updated", body = ApiResponse<RolePermissionResponse>),
        (status = 404, description = "Entry not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_role_permission(
    State(state): State<RolePermissionsState>,
    auth: Authenticated,
    ValidatedPath(id): ValidatedPath<i64>,
    ValidatedJson(req): ValidatedJson<UpdateRolePermissionRequest>,
) -> Result<Json<ApiResponse<RolePermissionResponse>>, PlatformError> {
    state.engine.authorize(Some(&*auth), policies::ROLE_PERMISSION_EDIT).await?;

    let mask = parse_mask(&req.permissions)?;
    let mut entry: RolePermission = state
        .service
        .get_by_id(&id)
        .await?
        .filter(|e: &RolePermission| !e.audit.is_deleted)
        .ok_or_else(|| PlatformError::not_found("RolePermission", id))?;

    entry.permission = mask.bits();
    let updated = state.service.update(entry, None).await?;

    Ok(Json(ApiResponse::ok(RolePermissionResponse::from(updated)).with_message("Role permission updated")))
}

/// Remove an entry
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "role-permissions",
    operation_id = "deleteApiRolePermissionsById",
    params(("id" = i64, Path, description = "Entry id")),
    responses((status = 200, description = "Entry removed (or already absent)")),
    security(("bearer_auth" = []))
)]
pub async fn delete_role_permission(
    State(state): State<RolePermissionsState>,
    auth: Authenticated,
    ValidatedPath(id): ValidatedPath<i64>,
) -> Result<Json<ApiResponse<()>>, PlatformError> {
    state.engine.authorize(Some(&*auth), policies::ROLE_PERMISSION_DELETE).await?;

    state.service.hard_delete(&id).await?;
    Ok(Json(ApiResponse::ok(()).with_message("Role permission deleted")))
}

pub fn role_permissions_router(state: RolePermissionsState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_role_permissions, create_role_permission))
        .routes(routes!(update_role_permission, delete_role_permission))
        .with_state(state)
}
