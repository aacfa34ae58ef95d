use axum::{
    extract::{Path, State},
    Extension,
};
use uuid::Uuid;

use crate::database::models::User;
use crate::middleware::{ApiJson, ApiResponse, ApiResult, AuthUser};
use crate::services::NewUser;
use crate::state::AppState;

/// POST /api/v1/users - Create a user in the admin's organization
///
/// Expected Input:
/// ```json
/// { "email": "bob@acme.com", "fullName": "Bob", "password": "optional", "isAdmin": false }
/// ```
pub async fn users_post(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(body): ApiJson<NewUser>,
) -> ApiResult<User> {
    let user = state.orgs.create_user(auth_user.org_id, body).await?;
    Ok(ApiResponse::created(user))
}

/// POST /api/v1/users/:id/unblock - Clear a lockout
pub async fn user_unblock_post(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<User> {
    let user = state.orgs.unblock_user(auth_user.org_id, user_id).await?;
    Ok(ApiResponse::success(user))
}
