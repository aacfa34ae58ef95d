// Generic OAuth 2.0 / OIDC provider configured per organization. The posted
// access token is exchanged for the profile at the configured userinfo endpoint.

use async_trait::async_trait;
use serde_json::Value;

use super::{credential, IdentityVerifier, ProviderError, VerifiedIdentity};
use crate::database::models::ProviderSettings;
use crate::types::AuthMethod;

pub struct OAuthVerifier {
    client: reqwest::Client,
}

impl OAuthVerifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityVerifier for OAuthVerifier {
    #[tracing::instrument(skip_all, name = "OAuthVerifier::verify")]
    async fn verify(
        &self,
        providers: &ProviderSettings,
        credentials: &Value,
    ) -> Result<VerifiedIdentity, ProviderError> {
        let settings = providers
            .oauth
            .as_ref()
            .ok_or(ProviderError::NotConfigured(AuthMethod::Oauth))?;
        let access_token = credential(credentials, "accessToken")?;

        let endpoint = url::Url::parse(&settings.userinfo_endpoint)
            .map_err(|_| ProviderError::NotConfigured(AuthMethod::Oauth))?;

        let response = self
            .client
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!(
                "{} userinfo returned status {}",
                settings.provider_name,
                response.status()
            );
            return Err(ProviderError::Rejected(format!(
                "{} rejected the access token",
                settings.provider_name
            )));
        }

        let info: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("failed to parse userinfo response: {e}")))?;

        if info.get("email_verified").and_then(Value::as_bool) == Some(false) {
            return Err(ProviderError::Rejected("email address is not verified".to_string()));
        }

        let email = info
            .get("email")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Rejected("userinfo response has no email".to_string()))?;
        let name = info
            .get("name")
            .or_else(|| info.get("preferred_username"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(VerifiedIdentity::new(email, name))
    }
}
