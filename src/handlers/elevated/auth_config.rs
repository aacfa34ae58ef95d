use axum::{extract::State, Extension};
use serde::Deserialize;

use crate::database::models::{AuthStep, OrgAuthConfig, ProviderSettings};
use crate::middleware::{ApiJson, ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAuthConfigRequest {
    pub auth_steps: Vec<AuthStep>,
    #[serde(default)]
    pub providers: ProviderSettings,
}

/// GET /api/v1/orgAuthConfig - Auth configuration of the admin's organization
///
/// Provider secrets are returned blank.
pub async fn auth_config_get(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<OrgAuthConfig> {
    let config = state.orgs.get_auth_config(auth_user.org_id).await?;
    Ok(ApiResponse::success(config))
}

/// PUT /api/v1/orgAuthConfig - Replace auth steps and provider settings
///
/// Expected Input:
/// ```json
/// {
///   "authSteps": [
///     { "order": 1, "allowedMethods": ["password", "google"] },
///     { "order": 2, "allowedMethods": ["otp"] }
///   ],
///   "providers": { "google": { "clientId": "...", "enableJit": true } }
/// }
/// ```
///
/// Responds 422 when the configuration is inconsistent (gaps in `order`, a
/// method used twice, an SSO method without provider settings).
pub async fn auth_config_put(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(body): ApiJson<UpdateAuthConfigRequest>,
) -> ApiResult<OrgAuthConfig> {
    let config = state
        .orgs
        .update_auth_config(auth_user.org_id, body.auth_steps, body.providers)
        .await?;
    Ok(ApiResponse::success(config))
}
