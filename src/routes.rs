use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::handlers::{elevated, protected, public};
use crate::middleware::{jwt_auth_middleware, require_admin_middleware, ApiResponse, ApiResult};
use crate::state::AppState;

/// The complete HTTP surface
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state);

    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_routes())
        // Bearer token required
        .merge(protected_routes(state.clone()))
        // Organization admins only
        .merge(elevated_routes(state.clone()))
        // Global middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    use public::auth;

    Router::new()
        .route("/api/v1/org", post(public::org_post))
        .route("/api/v1/userAccount/initAuth", post(auth::init_auth_post))
        .route("/api/v1/userAccount/authenticate", post(auth::authenticate_post))
        .route("/api/v1/userAccount/login/otp/generate", post(auth::otp_generate_post))
        .route("/api/v1/userAccount/password/forgot", post(auth::password_forgot_post))
        .route("/api/v1/userAccount/password/reset", post(auth::password_reset_post))
        .route("/api/v1/userAccount/refresh/token", post(auth::refresh_token_post))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/userAccount/me", get(protected::me_get))
        .route("/api/v1/userAccount/logout", post(protected::logout_post))
        .route("/api/v1/userAccount/password", put(protected::password_put))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn elevated_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/orgAuthConfig",
            get(elevated::auth_config_get).put(elevated::auth_config_put),
        )
        .route("/api/v1/users", post(elevated::users_post))
        .route("/api/v1/users/:id/unblock", post(elevated::user_unblock_post))
        // Layers run bottom-up: authenticate first, then check admin rights
        .route_layer(from_fn_with_state(state.clone(), require_admin_middleware))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let security = &state.config.security;
    if !security.enable_cors {
        return CorsLayer::new();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(public::auth::login::SESSION_TOKEN_HEADER),
        ])
}

async fn root() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "name": "orgauth-api",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health (public)",
            "login": "/api/v1/userAccount/initAuth, /api/v1/userAccount/authenticate (public)",
            "account": "/api/v1/userAccount/* (bearer)",
            "admin": "/api/v1/orgAuthConfig, /api/v1/users (bearer, admin)"
        }
    })))
}

/// GET /health - Store connectivity
async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!("Health check failed: {}", e);
        ApiError::service_unavailable("Store is unavailable")
    })?;

    Ok(ApiResponse::success(json!({
        "status": "ok",
        "environment": format!("{:?}", state.config.environment),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn json_post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let fx = Fixture::new();
        let (status, body) = call(app(fx.state()), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn protected_routes_need_a_bearer_token() {
        let fx = Fixture::new();
        let (status, body) = call(
            app(fx.state()),
            Request::get("/api/v1/userAccount/me").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn admin_routes_refuse_regular_users() {
        let fx = Fixture::new();
        let org = fx.seed_org("acme.test").await;
        let user = fx.seed_user(&org, "bob@acme.test", None).await;
        let token = fx.tokens.issue(&user, crate::auth::TokenScope::Access).unwrap();

        let request = Request::get("/api/v1/orgAuthConfig")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(app(fx.state()), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_auth_method_is_a_bad_request() {
        let fx = Fixture::new();
        let request = Request::post("/api/v1/userAccount/authenticate")
            .header("content-type", "application/json")
            .header("x-session-token", "whatever")
            .body(Body::from(json!({ "method": "carrierPigeon", "credentials": {} }).to_string()))
            .unwrap();
        let (status, body) = call(app(fx.state()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_JSON");
    }

    #[tokio::test]
    async fn init_auth_for_unknown_domain_is_not_found() {
        let fx = Fixture::new();
        let (status, body) = call(
            app(fx.state()),
            json_post("/api/v1/userAccount/initAuth", json!({ "email": "who@nowhere.test" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User not found");
    }
}
