//! External identity providers.
//!
//! Each SSO [`AuthMethod`] is backed by an [`IdentityVerifier`] that turns the
//! credentials posted by the login page into a [`VerifiedIdentity`]. The
//! orchestration in `services::auth_service` never talks HTTP itself; it asks
//! the [`ProviderRegistry`] for the verifier of the method in use.

pub mod google;
pub mod microsoft;
pub mod oauth;
pub mod saml;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::database::models::ProviderSettings;
use crate::types::AuthMethod;

pub use google::GoogleVerifier;
pub use microsoft::MicrosoftVerifier;
pub use oauth::OAuthVerifier;
pub use saml::SamlVerifier;

/// Identity asserted by a provider after it accepted the credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub full_name: Option<String>,
}

impl VerifiedIdentity {
    pub fn new(email: &str, full_name: Option<String>) -> Self {
        Self {
            email: email.trim().to_lowercase(),
            full_name: full_name.filter(|n| !n.trim().is_empty()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} sign-in is not configured for this organization")]
    NotConfigured(AuthMethod),

    #[error("Missing credential field '{0}'")]
    MissingCredential(&'static str),

    #[error("Identity provider rejected the credentials: {0}")]
    Rejected(String),

    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Unexpected identity provider response: {0}")]
    ParseError(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(
        &self,
        providers: &ProviderSettings,
        credentials: &Value,
    ) -> Result<VerifiedIdentity, ProviderError>;
}

/// Read a required string field out of the posted credentials
pub(crate) fn credential<'a>(credentials: &'a Value, field: &'static str) -> Result<&'a str, ProviderError> {
    credentials
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ProviderError::MissingCredential(field))
}

/// Shared client for provider calls
pub fn http_client() -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(concat!("orgauth-api/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Lookup table from SSO method to its verifier
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    verifiers: HashMap<AuthMethod, Arc<dyn IdentityVerifier>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry wired to the real provider endpoints
    pub fn with_defaults(client: reqwest::Client) -> Self {
        Self::new()
            .register(AuthMethod::Google, Arc::new(GoogleVerifier::new(client.clone())))
            .register(AuthMethod::Microsoft, Arc::new(MicrosoftVerifier::microsoft(client.clone())))
            .register(AuthMethod::AzureAd, Arc::new(MicrosoftVerifier::azure_ad(client.clone())))
            .register(AuthMethod::Oauth, Arc::new(OAuthVerifier::new(client)))
            .register(AuthMethod::SamlSso, Arc::new(SamlVerifier))
    }

    pub fn register(mut self, method: AuthMethod, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifiers.insert(method, verifier);
        self
    }

    pub fn get(&self, method: AuthMethod) -> Option<Arc<dyn IdentityVerifier>> {
        self.verifiers.get(&method).cloned()
    }
}

#[cfg(test)]
pub(crate) mod fake_server {
    use axum::Router;

    /// Serve `router` on an ephemeral local port and return its base URL
    pub async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credential_requires_non_empty_string() {
        let creds = json!({ "idToken": "  abc  ", "empty": " ", "number": 4 });
        assert_eq!(credential(&creds, "idToken").unwrap(), "abc");
        assert!(matches!(credential(&creds, "empty"), Err(ProviderError::MissingCredential("empty"))));
        assert!(credential(&creds, "number").is_err());
        assert!(credential(&creds, "absent").is_err());
    }

    #[test]
    fn defaults_cover_every_sso_method() {
        let registry = ProviderRegistry::with_defaults(reqwest::Client::new());
        for method in AuthMethod::ALL {
            assert_eq!(registry.get(method).is_some(), method.is_sso(), "{}", method);
        }
    }

    #[test]
    fn identity_email_is_normalised() {
        let id = VerifiedIdentity::new(" Ada@Example.COM ", Some(" ".into()));
        assert_eq!(id.email, "ada@example.com");
        assert_eq!(id.full_name, None);
    }
}
