//! Shared unit-test fixtures: an in-memory application with a recording mailer
//! and a fake Google verifier.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::auth::password::hash_password;
use crate::auth::TokenIssuer;
use crate::config::AppConfig;
use crate::database::models::{AuthStep, Org, OrgAuthConfig, ProviderSettings, User, UserCredentials};
use crate::database::{AuthConfigStore, CredentialStore, MemoryStore, OrgStore, UserStore};
use crate::mailer::{MailError, MailMessage, MailTemplate, Mailer};
use crate::providers::{IdentityVerifier, ProviderError, ProviderRegistry, VerifiedIdentity};
use crate::services::{AuthService, OrgService};
use crate::state::AppState;
use crate::types::AuthMethod;

/// Keeps every message instead of delivering it
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_otp_for(&self, email: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|m| match m.template {
            MailTemplate::LoginOtp { otp, .. } if m.to == email => Some(otp),
            _ => None,
        })
    }

    pub fn last_reset_token_for(&self, email: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|m| match m.template {
            MailTemplate::PasswordReset { link, .. } if m.to == email => {
                link.split_once("#token=").map(|(_, t)| t.to_string())
            }
            _ => None,
        })
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Treats `credentials.idToken` as the verified email; `"invalid"` is rejected
pub struct FakeVerifier;

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(
        &self,
        _providers: &ProviderSettings,
        credentials: &Value,
    ) -> Result<VerifiedIdentity, ProviderError> {
        match credentials.get("idToken").and_then(Value::as_str) {
            Some("invalid") => Err(ProviderError::Rejected("token rejected".to_string())),
            Some(email) => Ok(VerifiedIdentity::new(email, None)),
            None => Err(ProviderError::MissingCredential("idToken")),
        }
    }
}

pub struct Fixture {
    pub config: AppConfig,
    pub store: Arc<MemoryStore>,
    pub tokens: Arc<TokenIssuer>,
    pub mailer: Arc<RecordingMailer>,
    pub auth: Arc<AuthService>,
    pub orgs: Arc<OrgService>,
    state: AppState,
}

impl Fixture {
    pub fn new() -> Self {
        let config = AppConfig::development();
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let providers = ProviderRegistry::new().register(AuthMethod::Google, Arc::new(FakeVerifier));

        let state = AppState::new(config.clone(), store.clone(), providers, mailer.clone())
            .expect("development config has a JWT secret");

        Self {
            config,
            store,
            tokens: state.tokens.clone(),
            mailer,
            auth: state.auth.clone(),
            orgs: state.orgs.clone(),
            state,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub async fn seed_org(&self, domain: &str) -> Org {
        let org = Org::new(domain, domain);
        self.store.create_org(&org).await.unwrap();
        org
    }

    pub async fn seed_user(&self, org: &Org, email: &str, password: Option<&str>) -> User {
        let user = User::new(org.id, email, "Test User");
        self.store.create_user(&user).await.unwrap();

        let mut creds = UserCredentials::new(user.id);
        creds.password_hash = password.map(|p| hash_password(p).unwrap());
        self.store.save_credentials(&creds).await.unwrap();
        user
    }

    /// Store an auth config as-is, without validation
    pub async fn configure(&self, org: &Org, steps: Vec<AuthStep>, providers: ProviderSettings) {
        let mut config = OrgAuthConfig::default_for(org.id);
        config.auth_steps = steps;
        config.providers = providers;
        self.store.save_auth_config(&config).await.unwrap();
    }
}
