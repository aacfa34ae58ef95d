use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// POST /api/v1/userAccount/password/forgot - Mail a password reset link
///
/// Always answers 200 so the endpoint does not disclose which accounts exist.
pub async fn password_forgot_post(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ForgotPasswordRequest>,
) -> ApiResult<Value> {
    state.auth.forgot_password(&body.email).await?;
    Ok(ApiResponse::success(json!({
        "message": "If the account exists, a password reset link has been sent"
    })))
}

/// POST /api/v1/userAccount/password/reset - Choose a new password with a reset token
///
/// Expected Input:
/// ```json
/// { "token": "<jwt from the reset link>", "newPassword": "..." }
/// ```
pub async fn password_reset_post(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Value> {
    state.auth.reset_password(&body.token, &body.new_password).await?;
    Ok(ApiResponse::success(json!({ "message": "Password has been reset" })))
}
