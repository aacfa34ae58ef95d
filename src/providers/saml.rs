// SAML SSO. XML signature checking happens in the organization's SAML relay,
// which posts back a compact HS256 envelope (`credentials.assertion`) signed
// with the per-org `assertionSecret` and addressed to the configured entity id.

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

use super::{credential, IdentityVerifier, ProviderError, VerifiedIdentity};
use crate::database::models::ProviderSettings;
use crate::types::AuthMethod;

#[derive(Debug, Deserialize)]
struct AssertionClaims {
    email: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct SamlVerifier;

#[async_trait]
impl IdentityVerifier for SamlVerifier {
    #[tracing::instrument(skip_all, name = "SamlVerifier::verify")]
    async fn verify(
        &self,
        providers: &ProviderSettings,
        credentials: &Value,
    ) -> Result<VerifiedIdentity, ProviderError> {
        let settings = providers
            .saml
            .as_ref()
            .filter(|s| !s.assertion_secret.is_empty())
            .ok_or(ProviderError::NotConfigured(AuthMethod::SamlSso))?;
        let assertion = credential(credentials, "assertion")?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[settings.entity_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        validation.leeway = 0;

        let key = DecodingKey::from_secret(settings.assertion_secret.as_bytes());
        let data = decode::<AssertionClaims>(assertion, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ProviderError::Rejected("SAML assertion has expired".to_string()),
            ErrorKind::InvalidAudience => {
                ProviderError::Rejected("SAML assertion is addressed to another entity".to_string())
            }
            _ => ProviderError::Rejected(format!("invalid SAML assertion: {e}")),
        })?;

        Ok(VerifiedIdentity::new(&data.claims.email, data.claims.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::SamlSettings;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            saml: Some(SamlSettings {
                entity_id: "urn:orgauth:acme".into(),
                assertion_secret: "relay-shared-secret".into(),
                enable_jit: true,
            }),
            ..Default::default()
        }
    }

    fn assertion(secret: &str, aud: &str, exp_offset: i64) -> String {
        let claims = json!({
            "email": "Alan@Acme.test",
            "name": "Alan Turing",
            "aud": aud,
            "exp": chrono::Utc::now().timestamp() + exp_offset,
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn accepts_signed_assertion() {
        let token = assertion("relay-shared-secret", "urn:orgauth:acme", 300);
        let id = SamlVerifier
            .verify(&settings(), &json!({ "assertion": token }))
            .await
            .unwrap();
        assert_eq!(id.email, "alan@acme.test");
        assert_eq!(id.full_name.as_deref(), Some("Alan Turing"));
    }

    #[tokio::test]
    async fn rejects_bad_signature_audience_and_expiry() {
        let cases = [
            assertion("another-secret", "urn:orgauth:acme", 300),
            assertion("relay-shared-secret", "urn:elsewhere", 300),
            assertion("relay-shared-secret", "urn:orgauth:acme", -300),
        ];
        for token in cases {
            let err = SamlVerifier
                .verify(&settings(), &json!({ "assertion": token }))
                .await
                .unwrap_err();
            assert!(matches!(err, ProviderError::Rejected(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn unconfigured_org_is_rejected() {
        let err = SamlVerifier
            .verify(&ProviderSettings::default(), &json!({ "assertion": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(AuthMethod::SamlSso)));
    }
}
