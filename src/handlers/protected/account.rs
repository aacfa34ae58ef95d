use axum::{extract::State, Extension};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::database::models::User;
use crate::middleware::{ApiJson, ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// GET /api/v1/userAccount/me - Profile of the authenticated user
pub async fn me_get(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<User> {
    let user = state.auth.current_user(auth_user.user_id).await?;
    Ok(ApiResponse::success(user))
}

/// POST /api/v1/userAccount/logout - Revoke the presented access token
///
/// Expected Input (optional):
/// ```json
/// { "refreshToken": "..." }
/// ```
pub async fn logout_post(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    body: Option<ApiJson<LogoutRequest>>,
) -> ApiResult<Value> {
    let body = body.map(|ApiJson(b)| b).unwrap_or_default();
    state
        .auth
        .logout(&auth_user.claims, body.refresh_token.as_deref())
        .await?;
    Ok(ApiResponse::success(json!({ "message": "Logged out" })))
}

/// PUT /api/v1/userAccount/password - Change the password of the authenticated user
///
/// Expected Input:
/// ```json
/// { "currentPassword": "...", "newPassword": "..." }
/// ```
pub async fn password_put(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Value> {
    state
        .auth
        .change_password(auth_user.user_id, &body.current_password, &body.new_password)
        .await?;
    Ok(ApiResponse::success(json!({ "message": "Password updated" })))
}
