/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authentication methods an organization can place in its auth steps.
/// Wire names match the admin frontend: `password`, `otp`, `google`,
/// `microsoft`, `azureAd`, `oauth`, `samlSso`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMethod {
    Password,
    Otp,
    Google,
    Microsoft,
    AzureAd,
    Oauth,
    SamlSso,
}

impl AuthMethod {
    pub const ALL: [AuthMethod; 7] = [
        AuthMethod::Password,
        AuthMethod::Otp,
        AuthMethod::Google,
        AuthMethod::Microsoft,
        AuthMethod::AzureAd,
        AuthMethod::Oauth,
        AuthMethod::SamlSso,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Password => "password",
            AuthMethod::Otp => "otp",
            AuthMethod::Google => "google",
            AuthMethod::Microsoft => "microsoft",
            AuthMethod::AzureAd => "azureAd",
            AuthMethod::Oauth => "oauth",
            AuthMethod::SamlSso => "samlSso",
        }
    }

    /// Methods verified by an external identity provider
    pub fn is_sso(&self) -> bool {
        !matches!(self, AuthMethod::Password | AuthMethod::Otp)
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported authentication method: {0}")]
pub struct UnknownAuthMethod(pub String);

impl FromStr for AuthMethod {
    type Err = UnknownAuthMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuthMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownAuthMethod(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_serde() {
        let json = serde_json::to_string(&AuthMethod::AzureAd).unwrap();
        assert_eq!(json, "\"azureAd\"");
        let parsed: AuthMethod = serde_json::from_str("\"samlSso\"").unwrap();
        assert_eq!(parsed, AuthMethod::SamlSso);
    }

    #[test]
    fn parses_known_and_rejects_unknown_methods() {
        assert_eq!("otp".parse::<AuthMethod>(), Ok(AuthMethod::Otp));
        assert!("ldap".parse::<AuthMethod>().is_err());
        assert!("Password".parse::<AuthMethod>().is_err());
    }

    #[test]
    fn only_external_providers_are_sso() {
        assert!(!AuthMethod::Password.is_sso());
        assert!(!AuthMethod::Otp.is_sso());
        assert!(AuthMethod::Google.is_sso());
        assert!(AuthMethod::SamlSso.is_sso());
    }
}
