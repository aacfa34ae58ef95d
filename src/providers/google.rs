// Google sign-in: the login page obtains an ID token from Google Identity
// Services and posts it as `credentials.idToken`.

use async_trait::async_trait;
use serde_json::Value;

use super::{credential, IdentityVerifier, ProviderError, VerifiedIdentity};
use crate::database::models::ProviderSettings;
use crate::types::AuthMethod;

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

pub struct GoogleVerifier {
    client: reqwest::Client,
    tokeninfo_url: String,
}

impl GoogleVerifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, GOOGLE_TOKENINFO_URL)
    }

    pub fn with_endpoint(client: reqwest::Client, tokeninfo_url: &str) -> Self {
        Self {
            client,
            tokeninfo_url: tokeninfo_url.to_string(),
        }
    }
}

/// tokeninfo encodes booleans as strings
fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

#[async_trait]
impl IdentityVerifier for GoogleVerifier {
    #[tracing::instrument(skip_all, name = "GoogleVerifier::verify")]
    async fn verify(
        &self,
        providers: &ProviderSettings,
        credentials: &Value,
    ) -> Result<VerifiedIdentity, ProviderError> {
        let settings = providers
            .google
            .as_ref()
            .ok_or(ProviderError::NotConfigured(AuthMethod::Google))?;
        let id_token = credential(credentials, "idToken")?;

        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Google tokeninfo rejected token with status {}", response.status());
            return Err(ProviderError::Rejected("invalid Google ID token".to_string()));
        }

        let info: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("failed to parse tokeninfo response: {e}")))?;

        if info.get("aud").and_then(Value::as_str) != Some(settings.client_id.as_str()) {
            return Err(ProviderError::Rejected("ID token was issued for another client".to_string()));
        }
        if !truthy(info.get("email_verified")) {
            return Err(ProviderError::Rejected("Google email address is not verified".to_string()));
        }

        let email = info
            .get("email")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::ParseError("tokeninfo response has no email".to_string()))?;
        let name = info.get("name").and_then(Value::as_str).map(str::to_string);

        Ok(VerifiedIdentity::new(email, name))
    }
}
