use axum::extract::State;
use serde::Serialize;

use crate::database::models::{Org, User};
use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::services::NewOrg;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OrgCreated {
    pub org: Org,
    pub admin: User,
}

/// POST /api/v1/org - Sign up a new organization with its first admin
///
/// Expected Input:
/// ```json
/// {
///   "name": "Acme",
///   "domain": "acme.com",
///   "adminEmail": "ada@acme.com",
///   "adminFullName": "Ada Lovelace",
///   "password": "..."
/// }
/// ```
///
/// Responds 201 with the organization and the admin user. Disabled unless
/// `SERVER_ALLOW_ORG_SIGNUP` is true.
pub async fn org_post(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewOrg>,
) -> ApiResult<OrgCreated> {
    let (org, admin) = state.orgs.create_org(body).await?;
    Ok(ApiResponse::created(OrgCreated { org, admin }))
}
