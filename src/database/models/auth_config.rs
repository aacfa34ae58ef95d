use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::types::AuthMethod;

/// Upper bound on configurable login steps
pub const MAX_AUTH_STEPS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStep {
    pub order: u32,
    pub allowed_methods: Vec<AuthMethod>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSettings {
    pub client_id: String,
    #[serde(default)]
    pub enable_jit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftSettings {
    pub client_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub enable_jit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureAdSettings {
    pub client_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub enable_jit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSettings {
    pub provider_name: String,
    pub client_id: String,
    pub userinfo_endpoint: String,
    #[serde(default)]
    pub enable_jit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamlSettings {
    pub entity_id: String,
    /// Shared secret the SAML relay signs assertion envelopes with
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub assertion_secret: String,
    #[serde(default)]
    pub enable_jit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microsoft: Option<MicrosoftSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_ad: Option<AzureAdSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saml: Option<SamlSettings>,
}

impl ProviderSettings {
    pub fn is_configured(&self, method: AuthMethod) -> bool {
        match method {
            AuthMethod::Password | AuthMethod::Otp => true,
            AuthMethod::Google => self.google.is_some(),
            AuthMethod::Microsoft => self.microsoft.is_some(),
            AuthMethod::AzureAd => self.azure_ad.is_some(),
            AuthMethod::Oauth => self.oauth.is_some(),
            AuthMethod::SamlSso => self.saml.is_some(),
        }
    }

    /// Whether a first login through `method` may create the user locally
    pub fn jit_enabled(&self, method: AuthMethod) -> bool {
        match method {
            AuthMethod::Password | AuthMethod::Otp => false,
            AuthMethod::Google => self.google.as_ref().is_some_and(|s| s.enable_jit),
            AuthMethod::Microsoft => self.microsoft.as_ref().is_some_and(|s| s.enable_jit),
            AuthMethod::AzureAd => self.azure_ad.as_ref().is_some_and(|s| s.enable_jit),
            AuthMethod::Oauth => self.oauth.as_ref().is_some_and(|s| s.enable_jit),
            AuthMethod::SamlSso => self.saml.as_ref().is_some_and(|s| s.enable_jit),
        }
    }

    /// Fields of a provider that the login page needs (never secrets)
    pub fn public_view(&self, method: AuthMethod) -> Option<serde_json::Value> {
        use serde_json::json;

        match method {
            AuthMethod::Password | AuthMethod::Otp => None,
            AuthMethod::Google => self.google.as_ref().map(|s| json!({ "clientId": s.client_id })),
            AuthMethod::Microsoft => self
                .microsoft
                .as_ref()
                .map(|s| json!({ "clientId": s.client_id, "tenantId": s.tenant_id })),
            AuthMethod::AzureAd => self
                .azure_ad
                .as_ref()
                .map(|s| json!({ "clientId": s.client_id, "tenantId": s.tenant_id })),
            AuthMethod::Oauth => self
                .oauth
                .as_ref()
                .map(|s| json!({ "providerName": s.provider_name, "clientId": s.client_id })),
            AuthMethod::SamlSso => self.saml.as_ref().map(|s| json!({ "entityId": s.entity_id })),
        }
    }

    /// Copy of the settings with secrets blanked, for admin reads
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(saml) = copy.saml.as_mut() {
            saml.assertion_secret.clear();
        }
        copy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgAuthConfig {
    pub org_id: Uuid,
    pub auth_steps: Vec<AuthStep>,
    pub providers: ProviderSettings,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("At least one authentication step is required")]
    NoSteps,

    #[error("At most 3 authentication steps are allowed")]
    TooManySteps,

    #[error("Authentication step orders must run from 1 to the number of steps")]
    BadOrder,

    #[error("Authentication step {0} has no allowed methods")]
    EmptyStep(u32),

    #[error("Authentication method '{0}' is listed more than once")]
    DuplicateMethod(AuthMethod),

    #[error("Authentication method '{0}' has no provider configuration")]
    MissingProvider(AuthMethod),

    #[error("Provider '{0}' has an invalid field: {1}")]
    InvalidProvider(AuthMethod, &'static str),
}

impl OrgAuthConfig {
    /// Configuration for an organization that never saved one: password only
    pub fn default_for(org_id: Uuid) -> Self {
        Self {
            org_id,
            auth_steps: vec![AuthStep {
                order: 1,
                allowed_methods: vec![AuthMethod::Password],
            }],
            providers: ProviderSettings::default(),
            updated_at: Utc::now(),
        }
    }

    /// Steps ordered by `order`
    pub fn sorted_steps(&self) -> Vec<AuthStep> {
        let mut steps = self.auth_steps.clone();
        steps.sort_by_key(|s| s.order);
        steps
    }

    pub fn uses_method(&self, method: AuthMethod) -> bool {
        self.auth_steps
            .iter()
            .any(|s| s.allowed_methods.contains(&method))
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.auth_steps.is_empty() {
            return Err(ConfigValidationError::NoSteps);
        }
        if self.auth_steps.len() > MAX_AUTH_STEPS {
            return Err(ConfigValidationError::TooManySteps);
        }

        let steps = self.sorted_steps();
        for (idx, step) in steps.iter().enumerate() {
            if step.order as usize != idx + 1 {
                return Err(ConfigValidationError::BadOrder);
            }
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if step.allowed_methods.is_empty() {
                return Err(ConfigValidationError::EmptyStep(step.order));
            }
            for method in &step.allowed_methods {
                if !seen.insert(*method) {
                    return Err(ConfigValidationError::DuplicateMethod(*method));
                }
                if !self.providers.is_configured(*method) {
                    return Err(ConfigValidationError::MissingProvider(*method));
                }
            }
        }

        self.validate_providers()
    }

    fn validate_providers(&self) -> Result<(), ConfigValidationError> {
        fn require(value: &str, method: AuthMethod, field: &'static str) -> Result<(), ConfigValidationError> {
            if value.trim().is_empty() {
                Err(ConfigValidationError::InvalidProvider(method, field))
            } else {
                Ok(())
            }
        }

        let p = &self.providers;
        if let Some(s) = &p.google {
            require(&s.client_id, AuthMethod::Google, "clientId")?;
        }
        if let Some(s) = &p.microsoft {
            require(&s.client_id, AuthMethod::Microsoft, "clientId")?;
            require(&s.tenant_id, AuthMethod::Microsoft, "tenantId")?;
        }
        if let Some(s) = &p.azure_ad {
            require(&s.client_id, AuthMethod::AzureAd, "clientId")?;
            require(&s.tenant_id, AuthMethod::AzureAd, "tenantId")?;
        }
        if let Some(s) = &p.oauth {
            require(&s.provider_name, AuthMethod::Oauth, "providerName")?;
            require(&s.client_id, AuthMethod::Oauth, "clientId")?;
            match url::Url::parse(&s.userinfo_endpoint) {
                Ok(u) if u.scheme() == "https" || u.scheme() == "http" => {}
                _ => return Err(ConfigValidationError::InvalidProvider(AuthMethod::Oauth, "userinfoEndpoint")),
            }
        }
        if let Some(s) = &p.saml {
            require(&s.entity_id, AuthMethod::SamlSso, "entityId")?;
            require(&s.assertion_secret, AuthMethod::SamlSso, "assertionSecret")?;
        }
        Ok(())
    }
}
