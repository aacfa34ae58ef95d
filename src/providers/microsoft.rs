// Microsoft personal/work accounts and Azure AD share one verifier: the login
// page acquires a Graph access token through MSAL and posts it as
// `credentials.accessToken`; the profile from Graph `/me` is the identity.
//
// Graph checks the token signature when `/me` is called, but it accepts a token
// minted for any app in any tenant. Before calling Graph the token's `tid` must
// name the configured tenant and its `appid`/`azp` (or `aud`) the configured
// client, so a token obtained by some other application cannot sign in here.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

use super::{credential, IdentityVerifier, ProviderError, VerifiedIdentity};
use crate::database::models::ProviderSettings;
use crate::types::AuthMethod;

const GRAPH_ME_URL: &str = "https://graph.microsoft.com/v1.0/me";

/// Directory id of personal Microsoft accounts
const CONSUMER_TENANT_ID: &str = "9188040d-6c67-4c5b-b112-36a304b66dad";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphProfile {
    mail: Option<String>,
    user_principal_name: Option<String>,
    display_name: Option<String>,
}

/// The unverified access-token claims we bind to the org's settings
#[derive(Debug, Deserialize)]
struct AccessClaims {
    tid: Option<String>,
    appid: Option<String>,
    azp: Option<String>,
    #[serde(default)]
    aud: Option<Value>,
}

impl AccessClaims {
    fn parse(token: &str) -> Result<Self, ProviderError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Unreadable Microsoft access token: {}", e);
                ProviderError::Rejected("malformed Microsoft access token".to_string())
            })
    }

    fn issued_to(&self, client_id: &str) -> bool {
        let audience = match &self.aud {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(auds)) => auds.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        [self.appid.as_deref(), self.azp.as_deref()]
            .into_iter()
            .flatten()
            .chain(audience)
            .any(|id| id == client_id)
    }
}

/// Tenant restriction of the configured `tenantId`
enum Tenant<'a> {
    Any,
    Organizations,
    Consumers,
    Pinned(&'a str),
}

impl<'a> Tenant<'a> {
    fn from_setting(tenant_id: &'a str) -> Self {
        match tenant_id.trim().to_ascii_lowercase().as_str() {
            "common" => Tenant::Any,
            "organizations" => Tenant::Organizations,
            "consumers" => Tenant::Consumers,
            _ => Tenant::Pinned(tenant_id.trim()),
        }
    }

    fn admits(&self, tid: Option<&str>) -> bool {
        match (self, tid) {
            (Tenant::Any, _) => true,
            (_, None) => false,
            (Tenant::Organizations, Some(tid)) => !tid.eq_ignore_ascii_case(CONSUMER_TENANT_ID),
            (Tenant::Consumers, Some(tid)) => tid.eq_ignore_ascii_case(CONSUMER_TENANT_ID),
            (Tenant::Pinned(expected), Some(tid)) => tid.eq_ignore_ascii_case(expected),
        }
    }
}

pub struct MicrosoftVerifier {
    method: AuthMethod,
    client: reqwest::Client,
    me_url: String,
}

impl MicrosoftVerifier {
    pub fn microsoft(client: reqwest::Client) -> Self {
        Self::with_endpoint(AuthMethod::Microsoft, client, GRAPH_ME_URL)
    }

    pub fn azure_ad(client: reqwest::Client) -> Self {
        Self::with_endpoint(AuthMethod::AzureAd, client, GRAPH_ME_URL)
    }

    pub fn with_endpoint(method: AuthMethod, client: reqwest::Client, me_url: &str) -> Self {
        Self {
            method,
            client,
            me_url: me_url.to_string(),
        }
    }

    /// `(client_id, tenant_id)` of this verifier's provider section
    fn settings<'a>(&self, providers: &'a ProviderSettings) -> Option<(&'a str, &'a str)> {
        match self.method {
            AuthMethod::Microsoft => providers
                .microsoft
                .as_ref()
                .map(|s| (s.client_id.as_str(), s.tenant_id.as_str())),
            AuthMethod::AzureAd => providers
                .azure_ad
                .as_ref()
                .map(|s| (s.client_id.as_str(), s.tenant_id.as_str())),
            _ => None,
        }
    }
}

#[async_trait]
impl IdentityVerifier for MicrosoftVerifier {
    #[tracing::instrument(skip_all, fields(method = %self.method), name = "MicrosoftVerifier::verify")]
    async fn verify(
        &self,
        providers: &ProviderSettings,
        credentials: &Value,
    ) -> Result<VerifiedIdentity, ProviderError> {
        let (client_id, tenant_id) = self
            .settings(providers)
            .ok_or(ProviderError::NotConfigured(self.method))?;
        let access_token = credential(credentials, "accessToken")?;

        let claims = AccessClaims::parse(access_token)?;
        let tenant = Tenant::from_setting(tenant_id);
        if !tenant.admits(claims.tid.as_deref()) {
            tracing::warn!(tid = ?claims.tid, "Microsoft token issued by another tenant");
            return Err(ProviderError::Rejected("token was issued by another tenant".to_string()));
        }
        if !claims.issued_to(client_id) {
            tracing::warn!(appid = ?claims.appid, azp = ?claims.azp, "Microsoft token issued to another app");
            return Err(ProviderError::Rejected("token was issued to another application".to_string()));
        }

        let response = self
            .client
            .get(&self.me_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Graph /me returned status {}", response.status());
            return Err(ProviderError::Rejected("invalid Microsoft access token".to_string()));
        }

        let profile: GraphProfile = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("failed to parse Graph profile: {e}")))?;

        // `mail` is editable by tenant admins, so it only counts inside our own tenant
        let upn = profile
            .user_principal_name
            .filter(|upn| upn.contains('@') && !upn.contains("#EXT#"));
        let email = match (upn, tenant) {
            (Some(upn), _) => upn,
            (None, Tenant::Pinned(_)) => profile
                .mail
                .ok_or_else(|| ProviderError::Rejected("Microsoft account has no email address".to_string()))?,
            (None, _) => {
                return Err(ProviderError::Rejected(
                    "Microsoft account has no usable principal name".to_string(),
                ))
            }
        };

        Ok(VerifiedIdentity::new(&email, profile.display_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{AzureAdSettings, MicrosoftSettings};
    use crate::providers::fake_server;
    use axum::{http::{HeaderMap, StatusCode}, routing::get, Json, Router};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    /// A Graph-shaped token; `profile` selects the fake `/me` answer
    fn token(tid: &str, appid: &str, profile: &str) -> String {
        let claims = json!({
            "aud": "https://graph.microsoft.com",
            "tid": tid,
            "appid": appid,
            "profile": profile,
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"graph")).unwrap()
    }

    fn profile_of(headers: &HeaderMap) -> Option<String> {
        let bearer = headers.get("authorization")?.to_str().ok()?.strip_prefix("Bearer ")?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        let data = decode::<Value>(bearer, &DecodingKey::from_secret(&[]), &validation).ok()?;
        data.claims["profile"].as_str().map(str::to_string)
    }

    async fn me(headers: HeaderMap) -> (StatusCode, Json<Value>) {
        match profile_of(&headers).as_deref() {
            Some("upn-only") => (
                StatusCode::OK,
                Json(json!({ "mail": null, "userPrincipalName": "grace@contoso.com", "displayName": "Grace Hopper" })),
            ),
            Some("mail") => (
                StatusCode::OK,
                Json(json!({ "mail": "Grace.Hopper@contoso.com", "userPrincipalName": "gh@contoso.com" })),
            ),
            Some("guest") => (
                StatusCode::OK,
                Json(json!({
                    "mail": "grace@fabrikam.com",
                    "userPrincipalName": "grace_fabrikam.com#EXT#@contoso.onmicrosoft.com"
                })),
            ),
            _ => (StatusCode::UNAUTHORIZED, Json(json!({ "error": { "code": "InvalidAuthenticationToken" } }))),
        }
    }

    fn azure() -> ProviderSettings {
        ProviderSettings {
            azure_ad: Some(AzureAdSettings {
                client_id: "app".into(),
                tenant_id: "contoso".into(),
                enable_jit: true,
            }),
            ..Default::default()
        }
    }

    fn microsoft(tenant_id: &str) -> ProviderSettings {
        ProviderSettings {
            microsoft: Some(MicrosoftSettings {
                client_id: "app".into(),
                tenant_id: tenant_id.into(),
                enable_jit: false,
            }),
            ..Default::default()
        }
    }

    async fn verifier(method: AuthMethod) -> MicrosoftVerifier {
        let base = fake_server::spawn(Router::new().route("/me", get(me))).await;
        MicrosoftVerifier::with_endpoint(method, reqwest::Client::new(), &format!("{base}/me"))
    }

    #[tokio::test]
    async fn prefers_principal_name_over_mail() {
        let v = verifier(AuthMethod::AzureAd).await;
        let id = v
            .verify(&azure(), &json!({ "accessToken": token("contoso", "app", "mail") }))
            .await
            .unwrap();
        assert_eq!(id.email, "gh@contoso.com");

        let id = v
            .verify(&azure(), &json!({ "accessToken": token("contoso", "app", "upn-only") }))
            .await
            .unwrap();
        assert_eq!(id.email, "grace@contoso.com");
        assert_eq!(id.full_name.as_deref(), Some("Grace Hopper"));
    }

    #[tokio::test]
    async fn foreign_tenant_token_is_rejected() {
        let v = verifier(AuthMethod::AzureAd).await;
        let err = v
            .verify(&azure(), &json!({ "accessToken": token("fabrikam", "app", "mail") }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)), "{err}");
    }

    #[tokio::test]
    async fn token_for_another_app_is_rejected() {
        let v = verifier(AuthMethod::AzureAd).await;
        let err = v
            .verify(&azure(), &json!({ "accessToken": token("contoso", "someone-elses-app", "mail") }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)), "{err}");

        let err = v
            .verify(&azure(), &json!({ "accessToken": "not-a-jwt" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)), "{err}");
    }

    #[tokio::test]
    async fn guest_mail_is_trusted_only_in_a_pinned_tenant() {
        let v = verifier(AuthMethod::AzureAd).await;
        let id = v
            .verify(&azure(), &json!({ "accessToken": token("contoso", "app", "guest") }))
            .await
            .unwrap();
        assert_eq!(id.email, "grace@fabrikam.com");

        let v = verifier(AuthMethod::Microsoft).await;
        let err = v
            .verify(&microsoft("common"), &json!({ "accessToken": token("contoso", "app", "guest") }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)), "{err}");
    }

    #[tokio::test]
    async fn tenant_aliases() {
        let v = verifier(AuthMethod::Microsoft).await;
        let any = json!({ "accessToken": token("contoso", "app", "upn-only") });
        assert!(v.verify(&microsoft("common"), &any).await.is_ok());
        assert!(v.verify(&microsoft("organizations"), &any).await.is_ok());
        assert!(v.verify(&microsoft("consumers"), &any).await.is_err());

        let personal = json!({ "accessToken": token(CONSUMER_TENANT_ID, "app", "upn-only") });
        assert!(v.verify(&microsoft("consumers"), &personal).await.is_ok());
        assert!(v.verify(&microsoft("organizations"), &personal).await.is_err());
    }

    #[tokio::test]
    async fn rejected_token_and_wrong_provider_section() {
        let v = verifier(AuthMethod::AzureAd).await;
        let err = v
            .verify(&azure(), &json!({ "accessToken": token("contoso", "app", "expired") }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));

        let err = v
            .verify(&microsoft("common"), &json!({ "accessToken": token("contoso", "app", "mail") }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(AuthMethod::AzureAd)));
    }
}
