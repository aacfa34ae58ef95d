mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

use common::ADMIN_PASSWORD;

#[tokio::test]
async fn password_then_otp() -> Result<()> {
    let server = common::spawn_server().await?;
    server.signup("two.test").await?;
    let admin = server.admin_token("two.test").await?;

    let (status, body) = server
        .put(
            "/api/v1/orgAuthConfig",
            json!({
                "authSteps": [
                    { "order": 1, "allowedMethods": ["password"] },
                    { "order": 2, "allowedMethods": ["otp"] }
                ]
            }),
            Some(&admin),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, init) = server.init_auth("admin@two.test").await?;
    let session = init["data"]["sessionToken"].as_str().unwrap().to_string();

    let (status, step) = server
        .authenticate(&session, "password", json!({ "password": ADMIN_PASSWORD }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(step["data"]["status"], "next");
    assert_eq!(step["data"]["currentStep"], 1);
    assert_eq!(step["data"]["allowedMethods"], json!(["otp"]));

    let (status, _) = server
        .post("/api/v1/userAccount/login/otp/generate", json!({ "email": "admin@two.test" }), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    let otp = server.outbox.last_otp("admin@two.test").expect("otp mail");

    let (status, _) = server
        .authenticate(&session, "otp", json!({ "otp": "not-it" }))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, done) = server.authenticate(&session, "otp", json!({ "otp": otp })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["data"]["status"], "authenticated");
    assert!(done["data"]["accessToken"].as_str().is_some());
    Ok(())
}

#[tokio::test]
async fn otp_resend_is_rate_limited() -> Result<()> {
    let server = common::spawn_server().await?;
    server.signup("otp.test").await?;
    let admin = server.admin_token("otp.test").await?;

    server
        .put(
            "/api/v1/orgAuthConfig",
            json!({ "authSteps": [{ "order": 1, "allowedMethods": ["password", "otp"] }] }),
            Some(&admin),
        )
        .await?;

    let path = "/api/v1/userAccount/login/otp/generate";
    let (status, _) = server.post(path, json!({ "email": "admin@otp.test" }), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.post(path, json!({ "email": "admin@otp.test" }), None).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "TOO_MANY_REQUESTS");

    // Unknown addresses are not disclosed
    let (status, _) = server.post(path, json!({ "email": "ghost@otp.test" }), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(server.outbox.count(), 1);
    Ok(())
}

#[tokio::test]
async fn google_jit_provisions_new_users() -> Result<()> {
    let server = common::spawn_server().await?;
    server.signup("jit.test").await?;
    let admin = server.admin_token("jit.test").await?;

    let (status, config) = server
        .put(
            "/api/v1/orgAuthConfig",
            json!({
                "authSteps": [{ "order": 1, "allowedMethods": ["password", "google"] }],
                "providers": { "google": { "clientId": "client-123", "enableJit": true } }
            }),
            Some(&admin),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{config}");

    // Unknown user: only the JIT-capable provider is offered
    let (status, init) = server.init_auth("newbie@jit.test").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(init["data"]["allowedMethods"], json!(["google"]));
    assert_eq!(init["data"]["authProviders"]["google"]["clientId"], "client-123");
    let session = init["data"]["sessionToken"].as_str().unwrap();

    let (status, done) = server
        .authenticate(session, "google", json!({ "idToken": "newbie@jit.test" }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["data"]["status"], "authenticated");
    assert_eq!(done["data"]["user"]["email"], "newbie@jit.test");
    assert_eq!(done["data"]["user"]["isAdmin"], false);

    // Second login finds the provisioned user
    let (_, again) = server.init_auth("newbie@jit.test").await?;
    assert_eq!(again["data"]["allowedMethods"], json!(["password", "google"]));
    Ok(())
}

#[tokio::test]
async fn sso_identity_must_match_the_session_email() -> Result<()> {
    let server = common::spawn_server().await?;
    server.signup("match.test").await?;
    let admin = server.admin_token("match.test").await?;

    server
        .put(
            "/api/v1/orgAuthConfig",
            json!({
                "authSteps": [{ "order": 1, "allowedMethods": ["google"] }],
                "providers": { "google": { "clientId": "client-123" } }
            }),
            Some(&admin),
        )
        .await?;

    let (_, init) = server.init_auth("admin@match.test").await?;
    let session = init["data"]["sessionToken"].as_str().unwrap();

    let (status, body) = server
        .authenticate(session, "google", json!({ "idToken": "someone-else@match.test" }))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    Ok(())
}
