pub mod otp;
pub mod password;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::database::models::User;

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    Access,
    Refresh,
    PasswordReset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub scope: TokenScope,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("JWT secret not configured")]
    InvalidSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Token expired")]
    Expired,

    #[error("Token cannot be used for this operation")]
    WrongScope,

    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Signs and checks the HS256 tokens handed to clients
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(security: &SecurityConfig) -> Result<Self, TokenError> {
        if security.jwt_secret.is_empty() {
            return Err(TokenError::InvalidSecret);
        }

        let secret = security.jwt_secret.as_bytes();
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: security.jwt_issuer.clone(),
            access_ttl: Duration::hours(security.access_token_expiry_hours as i64),
            refresh_ttl: Duration::days(security.refresh_token_expiry_days as i64),
            reset_ttl: Duration::minutes(security.password_reset_expiry_minutes as i64),
        })
    }

    fn ttl(&self, scope: TokenScope) -> Duration {
        match scope {
            TokenScope::Access => self.access_ttl,
            TokenScope::Refresh => self.refresh_ttl,
            TokenScope::PasswordReset => self.reset_ttl,
        }
    }

    /// Seconds an access token stays valid
    pub fn access_expires_in(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn issue(&self, user: &User, scope: TokenScope) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            org_id: user.org_id,
            email: user.email.clone(),
            scope,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + self.ttl(scope)).timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::TokenGeneration(e.to_string()))
    }

    /// Decode `token` and require it to carry `scope`
    pub fn validate(&self, token: &str, scope: TokenScope) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })?;

        if data.claims.scope != scope {
            return Err(TokenError::WrongScope);
        }
        Ok(data.claims)
    }
}
