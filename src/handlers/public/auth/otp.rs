use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub email: String,
}

/// POST /api/v1/userAccount/login/otp/generate - Mail a one-time sign-in code
///
/// Replies the same way whether or not the email belongs to an account.
pub async fn otp_generate_post(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OtpRequest>,
) -> ApiResult<Value> {
    state.auth.generate_login_otp(&body.email).await?;
    Ok(ApiResponse::success(json!({
        "message": "If the account exists, a sign-in code has been sent"
    })))
}
