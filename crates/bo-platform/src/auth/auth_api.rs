//! Auth API Endpoints
//!
//! - POST /auth/login - Password login, returns an access/refresh pair
//! - POST /auth/refresh - Rotate a refresh token
//! - POST /auth/logout - Blacklist the access token and revoke device sessions
//! - GET /auth/me - Current identity and effective permissions

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::session_service::{SessionService, SessionTokens};
use crate::permission::PermissionEngine;
use crate::shared::api_common::{ApiResponse, OptionalJson, ValidatedJson};
use crate::shared::error::PlatformError;
use crate::shared::middleware::{Authenticated, BearerClaims};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Client device; generated when absent
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
    /// Must match the device the token was issued to, when given
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    /// Devices whose sessions end; the token's own device when empty
    #[serde(default)]
    pub device_ids: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub revoked_sessions: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserResponse {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub roles: Vec<i64>,
    pub role_codes: Vec<String>,
    pub language: String,
    pub is_super_admin: bool,
    /// Module name to granted flag names
    pub permissions: BTreeMap<String, Vec<String>>,
}

#[derive(Clone)]
pub struct AuthApiState {
    pub sessions: Arc<SessionService>,
    pub engine: Arc<PermissionEngine>,
}

/// Login with username and password
#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    operation_id = "postAuthLogin",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<SessionTokens>),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    State(state): State<AuthApiState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<SessionTokens>>, PlatformError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(PlatformError::validation("Username and password are required"));
    }

    let tokens = state
        .sessions
        .login(&req.username, &req.password, req.device_id.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(tokens).with_message("Login successful")))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/refresh",
    tag = "auth",
    operation_id = "postAuthRefresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = ApiResponse<SessionTokens>),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    )
)]
pub async fn refresh_token(
    State(state): State<AuthApiState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<ApiResponse<SessionTokens>>, PlatformError> {
    let tokens = state
        .sessions
        .refresh(&req.refresh_token, req.device_id.as_deref())
        .await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

/// End the current session
#[utoipa::path(
    post,
    path = "/logout",
    tag = "auth",
    operation_id = "postAuthLogout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = ApiResponse<LogoutResponse>),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AuthApiState>,
    BearerClaims(claims): BearerClaims,
    OptionalJson(body): OptionalJson<LogoutRequest>,
) -> Result<Json<ApiResponse<LogoutResponse>>, PlatformError> {
    let device_ids = body.map(|req| req.device_ids).unwrap_or_default();
    let revoked_sessions = state.sessions.logout(&claims, device_ids).await?;

    Ok(Json(
        ApiResponse::ok(LogoutResponse { revoked_sessions }).with_message("Logged out"),
    ))
}

/// Current user
#[utoipa::path(
    get,
    path = "/me",
    tag = "auth",
    operation_id = "getAuthMe",
    responses(
        (status = 200, description = "Current identity", body = ApiResponse<CurrentUserResponse>),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<AuthApiState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<CurrentUserResponse>>, PlatformError> {
    let permissions = state
        .engine
        .effective_permissions(&auth)
        .await?
        .into_iter()
        .map(|(module, mask)| (module, mask.names()))
        .collect();

    let identity = &auth.0;
    Ok(Json(ApiResponse::ok(CurrentUserResponse {
        user_id: identity.user_id.clone(),
        username: identity.username.clone(),
        email: identity.email.clone(),
        roles: identity.roles.clone(),
        role_codes: identity.role_codes.clone(),
        language: identity.language.to_string(),
        is_super_admin: state.engine.is_super_admin(identity),
        permissions,
    })))
}

pub fn auth_router(state: AuthApiState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(login))
        .routes(routes!(refresh_token))
        .routes(routes!(logout))
        .routes(routes!(get_current_user))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_deserialization() {
        let json = r#"{"username":"admin","password":"secret","deviceId":"web-1"}"#;
        let req: LoginRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.username, "admin");
        assert_eq!(req.device_id.as_deref(), Some("web-1"));

        let req: LoginRequest = serde_json::from_str(r#"{"username":"admin","password":"x"}"#).unwrap();
        assert!(req.device_id.is_none());
    }

    #[test]
    fn test_logout_request_defaults_to_no_devices() {
        let req: LogoutRequest = serde_json::from_str("{}").unwrap();
        assert!(req.device_ids.is_empty());
    }

    #[test]
    fn test_current_user_serialization() {
        let response = CurrentUserResponse {
            user_id: "U1".to_string(),
            username: "jdoe".to_string(),
            email: None,
            roles: vec![1],
            role_codes: vec!["Editor".to_string()],
            language: "en".to_string(),
            is_super_admin: false,
            permissions: BTreeMap::from([("Department".to_string(), vec!["View".to_string()])]),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["roleCodes"][0], "Editor");
        assert_eq!(json["isSuperAdmin"], false);
        assert_eq!(json["permissions"]["Department"][0], "View");
        assert!(json.get("email").is_none());
    }
}
