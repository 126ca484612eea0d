//! Departments Admin API
//!
//! REST endpoints for department management, guarded by `Department.*`
//! policies.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::entity::Department;
use super::service::{DepartmentChanges, DepartmentService, NewDepartment};
use crate::permission::{policies, PermissionEngine};
use crate::shared::api_common::{
    ApiResponse, CursorPage, CursorParams, PagedResult, PaginationParams, ValidatedJson, ValidatedPath,
    ValidatedQuery,
};
use crate::shared::error::PlatformError;
use crate::shared::middleware::Authenticated;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDepartmentRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Parent department; a root department when absent
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDepartmentRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentResponse {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl From<Department> for DepartmentResponse {
    fn from(d: Department) -> Self {
        Self {
            id: d.id,
            code: d.code,
            name: d.name,
            description: d.description,
            parent_id: d.parent_id,
            path: d.path,
            created_at: d.audit.created_at,
            created_by: d.audit.created_by,
            updated_at: d.audit.updated_at,
            updated_by: d.audit.updated_by,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DepartmentSearch {
    /// Matches code or name
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct DepartmentsState {
    pub service: DepartmentService,
    pub engine: Arc<PermissionEngine>,
}

/// Create a department
#[utoipa::path(
    post,
    path = "/",
    tag = "departments",
    operation_id = "postApiDepartments",
    request_body = CreateDepartmentRequest,
    responses(
        (status = 201, description = "Department created", body = ApiResponse<DepartmentResponse>),
        (status = 400, description = "Validation error, duplicate code or unknown parent"),
        (status = 403, description = "Missing Department.Create")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_department(
    State(state): State<DepartmentsState>,
    auth: Authenticated,
    ValidatedJson(req): ValidatedJson<CreateDepartmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DepartmentResponse>>), PlatformError> {
    state.engine.authorize(Some(&*auth), policies::DEPARTMENT_CREATE).await?;

    let created = state
        .service
        .create(NewDepartment {
            code: req.code,
            name: req.name,
            description: req.description,
            parent_id: req.parent_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::created(DepartmentResponse::from(created), "Department created")),
    ))
}

/// List departments (paged)
#[utoipa::path(
    get,
    path = "/",
    tag = "departments",
    operation_id = "getApiDepartments",
    params(PaginationParams, DepartmentSearch),
    responses(
        (status = 200, description = "Page of departments", body = ApiResponse<PagedResult<DepartmentResponse>>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_departments(
    State(state): State<DepartmentsState>,
    auth: Authenticated,
    ValidatedQuery(pagination): ValidatedQuery<PaginationParams>,
    ValidatedQuery(query): ValidatedQuery<DepartmentSearch>,
) -> Result<Json<ApiResponse<PagedResult<DepartmentResponse>>>, PlatformError> {
    state.engine.authorize(Some(&*auth), policies::DEPARTMENT_VIEW).await?;

    let page = state
        .service
        .page(query.search.as_deref(), pagination.to_request())
        .await?;
    Ok(Json(ApiResponse::ok(page.map(DepartmentResponse::from))))
}

/// All departments (cached)
#[utoipa::path(
    get,
    path = "/all",
    tag = "departments",
    operation_id = "getApiDepartmentsAll",
    responses(
        (status = 200, description = "Every department", body = ApiResponse<Vec<DepartmentResponse>>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_all_departments(
    State(state): State<DepartmentsState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<DepartmentResponse>>>, PlatformError> {
    state.engine.authorize(Some(&*auth), policies::DEPARTMENT_VIEW).await?;

    let departments = state.service.get_all().await?;
    Ok(Json(ApiResponse::ok(departments.into_iter().map(Into::into).collect())))
}

/// List departments by cursor
#[utoipa::path(
    get,
    path = "/cursor",
    tag = "departments",
    operation_id = "getApiDepartmentsCursor",
    params(CursorParams, DepartmentSearch),
    responses(
        (status = 200, description = "Cursor page of departments", body = ApiResponse<CursorPage<DepartmentResponse>>),
        (status = 400, description = "Invalid cursor")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_departments_cursor(
    State(state): State<DepartmentsState>,
    auth: Authenticated,
    ValidatedQuery(cursor): ValidatedQuery<CursorParams>,
    ValidatedQuery(query): ValidatedQuery<DepartmentSearch>,
) -> Result<Json<ApiResponse<CursorPage<DepartmentResponse>>>, PlatformError> {
    state.engine.authorize(Some(&*auth), policies::DEPARTMENT_VIEW).await?;

    let page = state
        .service
        .cursor_page(query.search.as_deref(), cursor.cursor.as_deref(), cursor.limit())
        .await?;

    Ok(Json(ApiResponse::ok(CursorPage {
        items: page.items.into_iter().map(Into::into).collect(),
        next_cursor: page.next_cursor,
        has_more: page.has_more,
    })))
}

/// Get a department by ID
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "departments",
    operation_id = "getApiDepartmentsById",
    params(("id" = String, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department found", body = ApiResponse<DepartmentResponse>),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_department(
    State(state): State<DepartmentsState>,
    auth: Authenticated,
    ValidatedPath(id): ValidatedPath<String>,
) -> Result<Json<ApiResponse<DepartmentResponse>>, PlatformError> {
    state.engine.authorize(Some(&*auth), policies::DEPARTMENT_VIEW).await?;

    let department = state.service.get(&id).await?;
    Ok(Json(ApiResponse::ok(department.into())))
}

/// Departments below a department, nearest first
#[utoipa::path(
    get,
    path = "/{id}/descendants",
    tag = "departments",
    operation_id = "getApiDepartmentsDescendants",
    params(("id" = String, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Descendants", body = ApiResponse<Vec<DepartmentResponse>>),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_descendants(
    State(state): State<DepartmentsState>,
    auth: Authenticated,
    ValidatedPath(id): ValidatedPath<String>,
) -> Result<Json<ApiResponse<Vec<DepartmentResponse>>>, PlatformError> {
    state.engine.authorize(Some(&*auth), policies::DEPARTMENT_VIEW).await?;

    let descendants = state.service.descendants(&id).await?;
    Ok(Json(ApiResponse::ok(descendants.into_iter().map(Into::into).collect())))
}

/// Update a department
#[utoipa::path(
    put,
    path = "/{id}",
    tag = "departments",
    operation_id = "putApiDepartmentsById",
    params(("id" = String, Path, description = "Department ID")),
    request_body = UpdateDepartmentRequest,
    responses(
        (status = 200, description = "Department updated", body = ApiResponse<DepartmentResponse>),
        (status = 400, description = "Validation error or duplicate code"),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_department(
    State(state): State<DepartmentsState>,
    auth: Authenticated,
    ValidatedPath(id): ValidatedPath<String>,
    ValidatedJson(req): ValidatedJson<UpdateDepartmentRequest>,
) -> Result<Json<ApiResponse<DepartmentResponse>>, PlatformError> {
    state.engine.authorize(Some(&*auth), policies::DEPARTMENT_EDIT).await?;

    let updated = state
        .service
        .update(
            &id,
            DepartmentChanges {
                code: req.code,
                name: req.name,
                description: req.description,
            },
        )
        .await?;

    Ok(Json(ApiResponse::ok(DepartmentResponse::from(updated)).with_message("Department updated")))
}

/// Delete a department
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "departments",
    operation_id = "deleteApiDepartmentsById",
    params(("id" = String, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department deleted"),
        (status = 400, description = "Department still has children")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_department(
    State(state): State<DepartmentsState>,
    auth: Authenticated,
    ValidatedPath(id): ValidatedPath<String>,
) -> Result<Json<ApiResponse<()>>, PlatformError> {
    state.engine.authorize(Some(&*auth), policies::DEPARTMENT_DELETE).await?;

    state.service.delete(&id).await?;
    Ok(Json(ApiResponse::ok(()).with_message("Department deleted")))
}

pub fn departments_router(state: DepartmentsState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(create_department, list_departments))
        .routes(routes!(list_all_departments))
        .routes(routes!(list_departments_cursor))
        .routes(routes!(get_department, update_department, delete_department))
        .routes(routes!(get_descendants))
        .with_state(state)
}
