use axum::extract::State;
use serde::Deserialize;

use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::services::AccessToken;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /api/v1/userAccount/refresh/token - Trade a refresh token for an access token
///
/// Expected Output:
/// ```json
/// { "success": true, "data": { "accessToken": "...", "tokenType": "Bearer", "expiresIn": 86400 } }
/// ```
pub async fn refresh_token_post(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> ApiResult<AccessToken> {
    let token = state.auth.refresh(&body.refresh_token).await?;
    Ok(ApiResponse::success(token))
}
