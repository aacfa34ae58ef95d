use axum::{extract::State, http::HeaderMap};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::services::{AuthOutcome, StepChallenge};
use crate::state::AppState;
use crate::types::AuthMethod;

pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

#[derive(Debug, Deserialize)]
pub struct InitAuthRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthenticateRequest {
    pub method: AuthMethod,
    #[serde(default)]
    pub credentials: Value,
}

/// POST /api/v1/userAccount/initAuth - Start a login for an email
///
/// Expected Input:
/// ```json
/// { "email": "ada@acme.com" }
/// ```
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "sessionToken": "opaque",
///     "currentStep": 0,
///     "allowedMethods": ["password", "google"],
///     "authProviders": { "google": { "clientId": "..." } }
///   }
/// }
/// ```
pub async fn init_auth_post(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<InitAuthRequest>,
) -> ApiResult<StepChallenge> {
    let challenge = state.auth.init_auth(&body.email).await?;
    Ok(ApiResponse::success(challenge))
}

/// POST /api/v1/userAccount/authenticate - Verify one credential of the current step
///
/// Requires the `x-session-token` header returned by initAuth.
///
/// Expected Input:
/// ```json
/// { "method": "password", "credentials": { "password": "..." } }
/// ```
///
/// Expected Output while steps remain:
/// ```json
/// { "success": true, "data": { "status": "next", "sessionToken": "...", "currentStep": 1, "allowedMethods": ["otp"], "authProviders": {} } }
/// ```
///
/// Expected Output after the final step:
/// ```json
/// { "success": true, "data": { "status": "authenticated", "accessToken": "...", "refreshToken": "...", "tokenType": "Bearer", "expiresIn": 86400, "user": { } } }
/// ```
pub async fn authenticate_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<AuthenticateRequest>,
) -> ApiResult<AuthOutcome> {
    let session_token = headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing x-session-token header"))?;

    let outcome = state
        .auth
        .authenticate(session_token, body.method, &body.credentials)
        .await?;
    Ok(ApiResponse::success(outcome))
}
