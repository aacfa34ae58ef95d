#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use orgauth_api::config::AppConfig;
use orgauth_api::database::models::ProviderSettings;
use orgauth_api::database::MemoryStore;
use orgauth_api::mailer::{MailError, MailMessage, MailTemplate, Mailer};
use orgauth_api::providers::{IdentityVerifier, ProviderError, ProviderRegistry, VerifiedIdentity};
use orgauth_api::types::AuthMethod;
use orgauth_api::{app, AppState};

pub const ADMIN_PASSWORD: &str = "Adm1n!Passw0rd";

/// Captures outgoing mail so tests can read OTPs and reset links
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<MailMessage>>,
}

impl Outbox {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_otp(&self, email: &str) -> Option<String> {
        self.sent.lock().unwrap().iter().rev().find_map(|m| match &m.template {
            MailTemplate::LoginOtp { otp, .. } if m.to == email => Some(otp.clone()),
            _ => None,
        })
    }

    pub fn last_reset_token(&self, email: &str) -> Option<String> {
        self.sent.lock().unwrap().iter().rev().find_map(|m| match &m.template {
            MailTemplate::PasswordReset { link, .. } if m.to == email => {
                link.split_once("#token=").map(|(_, t)| t.to_string())
            }
            _ => None,
        })
    }

    pub fn lock_notices(&self, email: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.to == email && matches!(m.template, MailTemplate::AccountLocked { .. }))
            .count()
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Google stand-in: `credentials.idToken` is the email the provider vouches for
struct TrustingGoogle;

#[async_trait]
impl IdentityVerifier for TrustingGoogle {
    async fn verify(
        &self,
        _providers: &ProviderSettings,
        credentials: &Value,
    ) -> Result<VerifiedIdentity, ProviderError> {
        match credentials.get("idToken").and_then(Value::as_str) {
            Some(email) => Ok(VerifiedIdentity::new(email, Some("Google User".to_string()))),
            None => Err(ProviderError::MissingCredential("idToken")),
        }
    }
}

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub outbox: Arc<Outbox>,
}

/// Serve the application on a free port with an in-memory store
pub async fn spawn_server() -> Result<TestServer> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let base_url = format!("http://127.0.0.1:{}", port);

    let outbox = Arc::new(Outbox::default());
    let providers = ProviderRegistry::new().register(AuthMethod::Google, Arc::new(TrustingGoogle));
    let state = AppState::new(
        AppConfig::development(),
        Arc::new(MemoryStore::new()),
        providers,
        outbox.clone(),
    )?;

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind {}", base_url))?;
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.ok();
    });

    Ok(TestServer {
        base_url,
        client: reqwest::Client::new(),
        outbox,
    })
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str, bearer: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        read(req.send().await?).await
    }

    pub async fn post(&self, path: &str, body: Value, bearer: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        read(req.send().await?).await
    }

    pub async fn put(&self, path: &str, body: Value, bearer: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut req = self.client.put(self.url(path)).json(&body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        read(req.send().await?).await
    }

    /// Sign up an organization; its admin logs in with [`ADMIN_PASSWORD`]
    pub async fn signup(&self, domain: &str) -> Result<Value> {
        let (status, body) = self
            .post(
                "/api/v1/org",
                json!({
                    "name": format!("Org {}", domain),
                    "domain": domain,
                    "adminEmail": format!("admin@{}", domain),
                    "adminFullName": "Org Admin",
                    "password": ADMIN_PASSWORD
                }),
                None,
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "signup failed: {} {}", status, body);
        Ok(body["data"].clone())
    }

    pub async fn init_auth(&self, email: &str) -> Result<(StatusCode, Value)> {
        self.post("/api/v1/userAccount/initAuth", json!({ "email": email }), None).await
    }

    pub async fn authenticate(
        &self,
        session_token: &str,
        method: &str,
        credentials: Value,
    ) -> Result<(StatusCode, Value)> {
        let resp = self
            .client
            .post(self.url("/api/v1/userAccount/authenticate"))
            .header("x-session-token", session_token)
            .json(&json!({ "method": method, "credentials": credentials }))
            .send()
            .await?;
        read(resp).await
    }

    /// Single-step password login, returning the `data` of the authenticated outcome
    pub async fn password_login(&self, email: &str, password: &str) -> Result<Value> {
        let (status, init) = self.init_auth(email).await?;
        anyhow::ensure!(status == StatusCode::OK, "initAuth failed: {} {}", status, init);
        let session = init["data"]["sessionToken"].as_str().context("no session token")?.to_string();

        let (status, body) = self
            .authenticate(&session, "password", json!({ "password": password }))
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "authenticate failed: {} {}", status, body);
        anyhow::ensure!(body["data"]["status"] == "authenticated", "login not complete: {}", body);
        Ok(body["data"].clone())
    }

    pub async fn admin_token(&self, domain: &str) -> Result<String> {
        let data = self.password_login(&format!("admin@{}", domain), ADMIN_PASSWORD).await?;
        Ok(data["accessToken"].as_str().context("no access token")?.to_string())
    }
}

async fn read(resp: reqwest::Response) -> Result<(StatusCode, Value)> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Ok((status, body))
}
