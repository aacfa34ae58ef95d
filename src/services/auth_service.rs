//! Login orchestration.
//!
//! A login is a short server-side [`AuthSession`]: `init_auth` opens it for an
//! email and reports the methods of the first step, then every `authenticate`
//! call verifies one credential against the methods of the current step. The
//! session advances until the last configured step succeeds, at which point it
//! is deleted and access/refresh tokens are issued.
//!
//! Users unknown locally can only start with an SSO method whose provider has
//! JIT enabled; a successful verification then creates the user in the org the
//! email domain belongs to.
//!
//! Failed password and OTP checks count towards `max_failed_attempts`; reaching
//! it blocks the account until a password reset or an admin unblock.

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::provisioning::provision_user;
use super::{email_domain, normalize_email};
use crate::auth::otp::{generate_otp, generate_session_token, hash_otp, verify_otp};
use crate::auth::password::{hash_password, validate_password_strength, verify_password, PasswordError};
use crate::auth::{Claims, TokenError, TokenIssuer, TokenScope};
use crate::config::{AppConfig, SecurityConfig};
use crate::database::models::{AuthSession, OrgAuthConfig, ProviderSettings, User, UserCredentials};
use crate::database::{DatabaseError, Store};
use crate::mailer::{MailError, MailMessage, MailTemplate, Mailer};
use crate::providers::{ProviderError, ProviderRegistry, VerifiedIdentity};
use crate::types::AuthMethod;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Authentication method '{0}' is not allowed at this step")]
    MethodNotAllowed(AuthMethod),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("The verified identity does not match the email used to sign in")]
    IdentityMismatch,

    #[error("One-time password has expired or was never requested")]
    OtpExpired,

    #[error("Account is blocked after too many failed attempts")]
    AccountBlocked,

    #[error("Account is disabled")]
    AccountInactive,

    #[error("User not found")]
    UserNotFound,

    #[error("OTP login is not enabled for this organization")]
    OtpNotEnabled,

    #[error("Please wait {0} seconds before requesting another code")]
    OtpRateLimited(u64),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// What the login page must collect next
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepChallenge {
    pub session_token: String,
    pub current_step: usize,
    pub allowed_methods: Vec<AuthMethod>,
    /// Public provider fields (client ids, tenant ids) keyed by method
    pub auth_providers: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AuthOutcome {
    Next(StepChallenge),
    Authenticated(AuthTokens),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    tokens: Arc<TokenIssuer>,
    providers: ProviderRegistry,
    mailer: Arc<dyn Mailer>,
    security: SecurityConfig,
    frontend_url: String,
}

impl AuthService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn Store>,
        tokens: Arc<TokenIssuer>,
        providers: ProviderRegistry,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            tokens,
            providers,
            mailer,
            security: config.security.clone(),
            frontend_url: config.server.frontend_url.trim_end_matches('/').to_string(),
        }
    }

    /// Open a login session for `email`
    #[tracing::instrument(skip(self))]
    pub async fn init_auth(&self, email: &str) -> Result<StepChallenge, AuthError> {
        let email = normalize_email(email)
            .ok_or_else(|| AuthError::InvalidInput("A valid email address is required".to_string()))?;

        let (org_id, user_id) = match self.store.find_user_by_email(&email).await? {
            Some(user) => {
                if !user.is_active {
                    return Err(AuthError::AccountInactive);
                }
                (user.org_id, Some(user.id))
            }
            None => {
                let org = self
                    .store
                    .find_org_by_domain(email_domain(&email))
                    .await?
                    .filter(|o| o.is_active)
                    .ok_or(AuthError::UserNotFound)?;
                (org.id, None)
            }
        };

        let config = self.auth_config(org_id).await?;
        let session = AuthSession::new(
            generate_session_token(),
            &email,
            org_id,
            user_id,
            config.sorted_steps(),
            Duration::minutes(self.security.session_ttl_minutes as i64),
        );

        let challenge = self.challenge(&session, &config.providers);
        if challenge.allowed_methods.is_empty() {
            // unknown user and no JIT-capable provider in the first step
            return Err(AuthError::UserNotFound);
        }

        self.store.create_session(&session).await?;
        tracing::debug!(%org_id, known_user = user_id.is_some(), "Opened auth session");
        Ok(challenge)
    }

    /// Verify one credential for the session's current step
    #[tracing::instrument(skip(self, session_token, credentials))]
    pub async fn authenticate(
        &self,
        session_token: &str,
        method: AuthMethod,
        credentials: &Value,
    ) -> Result<AuthOutcome, AuthError> {
        let mut session = self
            .store
            .get_session(session_token)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        let config = self.auth_config(session.org_id).await?;

        if !self.allowed_methods(&session, &config.providers).contains(&method) {
            return Err(AuthError::MethodNotAllowed(method));
        }

        let known = match session.user_id {
            Some(id) => {
                let user = self.store.find_user(id).await?.ok_or(AuthError::InvalidSession)?;
                let creds = self.credentials_for(user.id).await?;
                ensure_usable(&user, &creds)?;
                Some((user, creds))
            }
            None => None,
        };

        let user = match method {
            AuthMethod::Password => {
                let (user, creds) = known.ok_or(AuthError::InvalidCredentials)?;
                self.check_password(user, creds, credentials).await?
            }
            AuthMethod::Otp => {
                let (user, creds) = known.ok_or(AuthError::InvalidCredentials)?;
                self.check_otp(user, creds, credentials).await?
            }
            sso => {
                let identity = self.verify_sso(sso, &config.providers, credentials).await?;
                if identity.email != session.email {
                    tracing::warn!(%method, "SSO identity does not match the session email");
                    return Err(AuthError::IdentityMismatch);
                }
                match known {
                    Some((user, _)) => user,
                    None => self.provision(&session, &identity, sso).await?,
                }
            }
        };

        let now = Utc::now();
        let is_final = session.is_final_step();

        // a block recorded by a concurrent failure wins over this success
        if !self
            .store
            .record_successful_attempt(user.id, is_final.then_some(now))
            .await?
        {
            return Err(AuthError::AccountBlocked);
        }

        if is_final {
            // only the caller that removes the session gets tokens
            if !self.store.delete_session(&session.token).await? {
                return Err(AuthError::InvalidSession);
            }

            let mut user = user;
            user.has_logged_in = true;
            user.updated_at = now;
            self.store.update_user(&user).await?;

            tracing::info!(user_id = %user.id, org_id = %user.org_id, %method, "Login completed");
            return Ok(AuthOutcome::Authenticated(self.issue_tokens(user)?));
        }

        if !self
            .store
            .advance_session(&session.token, session.current_step, user.id)
            .await?
        {
            return Err(AuthError::InvalidSession);
        }
        session.current_step += 1;
        session.user_id = Some(user.id);

        tracing::debug!(user_id = %user.id, step = session.current_step, "Auth step passed");
        Ok(AuthOutcome::Next(self.challenge(&session, &config.providers)))
    }

    /// Mail a one-time password to `email`. Unknown emails succeed silently.
    #[tracing::instrument(skip(self))]
    pub async fn generate_login_otp(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email)
            .ok_or_else(|| AuthError::InvalidInput("A valid email address is required".to_string()))?;

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            tracing::debug!("OTP requested for unknown email");
            return Ok(());
        };

        let config = self.auth_config(user.org_id).await?;
        if !config.uses_method(AuthMethod::Otp) {
            return Err(AuthError::OtpNotEnabled);
        }

        let creds = self.credentials_for(user.id).await?;
        ensure_usable(&user, &creds)?;

        let now = Utc::now();
        if let Some(issued_at) = creds.otp_issued_at {
            let elapsed = (now - issued_at).num_seconds().max(0) as u64;
            if elapsed < self.security.otp_resend_interval_secs {
                return Err(AuthError::OtpRateLimited(self.security.otp_resend_interval_secs - elapsed));
            }
        }

        let otp = generate_otp();
        let expires_at = now + Duration::minutes(self.security.otp_validity_minutes as i64);
        self.store
            .store_otp(user.id, &hash_otp(user.id, &otp), now, expires_at)
            .await?;

        self.mailer
            .send(MailMessage::new(
                &user.email,
                MailTemplate::LoginOtp {
                    otp,
                    valid_minutes: self.security.otp_validity_minutes,
                },
            ))
            .await?;

        tracing::info!(user_id = %user.id, "Login OTP issued");
        Ok(())
    }

    /// Mail a password reset link. Always succeeds so account existence is not disclosed.
    #[tracing::instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let Some(email) = normalize_email(email) else {
            return Ok(());
        };
        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) if user.is_active => user,
            _ => {
                tracing::debug!("Password reset requested for unknown or disabled account");
                return Ok(());
            }
        };

        let token = self.tokens.issue(&user, TokenScope::PasswordReset)?;
        let link = format!("{}/reset-password#token={}", self.frontend_url, token);
        self.notify(
            &user.email,
            MailTemplate::PasswordReset {
                link,
                valid_minutes: self.security.password_reset_expiry_minutes,
            },
        )
        .await;

        tracing::info!(user_id = %user.id, "Password reset link issued");
        Ok(())
    }

    /// Set a new password from a reset token; the token is burnt afterwards
    #[tracing::instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let claims = self.tokens.validate(token, TokenScope::PasswordReset)?;
        if self.store.is_token_revoked(claims.jti).await? {
            return Err(AuthError::Unauthorized("Reset link has already been used".to_string()));
        }
        validate_password_strength(new_password).map_err(AuthError::InvalidInput)?;

        let user = self
            .store
            .find_user(claims.sub)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("Reset link is no longer valid".to_string()))?;
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        self.store
            .set_password_hash(user.id, &hash_password(new_password)?)
            .await?;
        self.store.reset_lockout(user.id).await?;
        self.store.revoke_token(claims.jti, claims.expires_at()).await?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    #[tracing::instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self.store.find_user(user_id).await?.ok_or(AuthError::UserNotFound)?;
        let creds = self.credentials_for(user.id).await?;
        ensure_usable(&user, &creds)?;

        let hash = creds
            .password_hash
            .as_deref()
            .ok_or_else(|| AuthError::InvalidInput("No password is set for this account".to_string()))?;
        if !verify_password(current_password, hash)? {
            return Err(AuthError::Unauthorized("Current password is incorrect".to_string()));
        }
        if current_password == new_password {
            return Err(AuthError::InvalidInput(
                "New password must differ from the current password".to_string(),
            ));
        }
        validate_password_strength(new_password).map_err(AuthError::InvalidInput)?;

        self.store
            .set_password_hash(user.id, &hash_password(new_password)?)
            .await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    /// Exchange a refresh token for a fresh access token
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, AuthError> {
        let claims = self.tokens.validate(refresh_token, TokenScope::Refresh)?;
        if self.store.is_token_revoked(claims.jti).await? {
            return Err(AuthError::Unauthorized("Refresh token has been revoked".to_string()));
        }

        let user = self
            .store
            .find_user(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AuthError::Unauthorized("User is no longer active".to_string()))?;
        let creds = self.credentials_for(user.id).await?;
        ensure_usable(&user, &creds)?;

        Ok(AccessToken {
            access_token: self.tokens.issue(&user, TokenScope::Access)?,
            token_type: "Bearer",
            expires_in: self.tokens.access_expires_in(),
        })
    }

    /// Revoke the presented access token and, when given, the refresh token
    #[tracing::instrument(skip_all, fields(user_id = %claims.sub))]
    pub async fn logout(&self, claims: &Claims, refresh_token: Option<&str>) -> Result<(), AuthError> {
        self.store.revoke_token(claims.jti, claims.expires_at()).await?;

        if let Some(token) = refresh_token {
            match self.tokens.validate(token, TokenScope::Refresh) {
                Ok(refresh) if refresh.sub == claims.sub => {
                    self.store.revoke_token(refresh.jti, refresh.expires_at()).await?;
                }
                Ok(_) => tracing::warn!("Logout presented a refresh token of another user"),
                Err(e) => tracing::debug!("Ignoring unusable refresh token on logout: {}", e),
            }
        }

        tracing::info!("Logged out");
        Ok(())
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.store.find_user(user_id).await?.ok_or(AuthError::UserNotFound)
    }

    async fn auth_config(&self, org_id: Uuid) -> Result<OrgAuthConfig, AuthError> {
        Ok(self
            .store
            .get_auth_config(org_id)
            .await?
            .unwrap_or_else(|| OrgAuthConfig::default_for(org_id)))
    }

    async fn credentials_for(&self, user_id: Uuid) -> Result<UserCredentials, AuthError> {
        Ok(self
            .store
            .get_credentials(user_id)
            .await?
            .unwrap_or_else(|| UserCredentials::new(user_id)))
    }

    /// Methods of the current step this session may use right now
    fn allowed_methods(&self, session: &AuthSession, providers: &ProviderSettings) -> Vec<AuthMethod> {
        let Some(step) = session.current() else {
            return Vec::new();
        };
        step.allowed_methods
            .iter()
            .copied()
            .filter(|m| providers.is_configured(*m))
            .filter(|m| session.user_id.is_some() || (m.is_sso() && providers.jit_enabled(*m)))
            .collect()
    }

    fn challenge(&self, session: &AuthSession, providers: &ProviderSettings) -> StepChallenge {
        let allowed_methods = self.allowed_methods(session, providers);
        let auth_providers = allowed_methods
            .iter()
            .filter_map(|m| providers.public_view(*m).map(|v| (m.as_str().to_string(), v)))
            .collect();

        StepChallenge {
            session_token: session.token.clone(),
            current_step: session.current_step,
            allowed_methods,
            auth_providers,
        }
    }

    async fn check_password(
        &self,
        user: User,
        creds: UserCredentials,
        credentials: &Value,
    ) -> Result<User, AuthError> {
        let password = credentials
            .get("password")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AuthError::InvalidInput("credentials.password is required".to_string()))?;
        let hash = creds.password_hash.as_deref().ok_or_else(|| {
            AuthError::InvalidInput(
                "No password is set for this account; use forgot password to choose one".to_string(),
            )
        })?;

        if verify_password(password, hash)? {
            Ok(user)
        } else {
            Err(self.record_failure(&user).await)
        }
    }

    async fn check_otp(
        &self,
        user: User,
        creds: UserCredentials,
        credentials: &Value,
    ) -> Result<User, AuthError> {
        let otp = credentials
            .get("otp")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| AuthError::InvalidInput("credentials.otp is required".to_string()))?;

        let now = Utc::now();
        let stored = match (creds.otp_hash, creds.otp_expires_at) {
            (Some(hash), Some(expires_at)) if expires_at > now => hash,
            _ => return Err(AuthError::OtpExpired),
        };

        if !verify_otp(user.id, otp, &stored) {
            return Err(self.record_failure(&user).await);
        }
        // single use: a concurrent login may have consumed it first
        if !self.store.consume_otp(user.id, &stored, now).await? {
            return Err(AuthError::OtpExpired);
        }
        Ok(user)
    }

    /// Count a failed password/OTP check, blocking the account at the limit
    async fn record_failure(&self, user: &User) -> AuthError {
        let max = self.security.max_failed_attempts;
        let outcome = match self.store.record_failed_attempt(user.id, max).await {
            Ok(outcome) => outcome,
            Err(e) => return e.into(),
        };

        if !outcome.is_blocked {
            tracing::debug!(user_id = %user.id, attempts = outcome.attempts, "Failed login attempt");
            return AuthError::InvalidCredentials;
        }

        // exactly one attempt crosses the limit, so one notice goes out
        if outcome.attempts == max {
            tracing::warn!(user_id = %user.id, attempts = outcome.attempts, "Account locked");
            self.notify(
                &user.email,
                MailTemplate::AccountLocked {
                    attempts: outcome.attempts,
                },
            )
            .await;
        }
        AuthError::AccountBlocked
    }

    async fn verify_sso(
        &self,
        method: AuthMethod,
        providers: &ProviderSettings,
        credentials: &Value,
    ) -> Result<VerifiedIdentity, AuthError> {
        let verifier = self
            .providers
            .get(method)
            .ok_or(ProviderError::NotConfigured(method))?;
        Ok(verifier.verify(providers, credentials).await?)
    }

    async fn provision(
        &self,
        session: &AuthSession,
        identity: &VerifiedIdentity,
        method: AuthMethod,
    ) -> Result<User, AuthError> {
        let user = provision_user(self.store.as_ref(), session.org_id, identity, method).await?;
        if user.org_id != session.org_id {
            return Err(AuthError::IdentityMismatch);
        }
        let creds = self.credentials_for(user.id).await?;
        ensure_usable(&user, &creds)?;
        Ok(user)
    }

    fn issue_tokens(&self, user: User) -> Result<AuthTokens, AuthError> {
        Ok(AuthTokens {
            access_token: self.tokens.issue(&user, TokenScope::Access)?,
            refresh_token: self.tokens.issue(&user, TokenScope::Refresh)?,
            token_type: "Bearer",
            expires_in: self.tokens.access_expires_in(),
            user,
        })
    }

    /// Best-effort mail; failures are logged, never surfaced
    async fn notify(&self, to: &str, template: MailTemplate) {
        let subject = template.subject();
        if let Err(e) = self.mailer.send(MailMessage::new(to, template)).await {
            tracing::error!("Failed to send '{}' mail: {}", subject, e);
        }
    }
}

fn ensure_usable(user: &User, creds: &UserCredentials) -> Result<(), AuthError> {
    if !user.is_active {
        return Err(AuthError::AccountInactive);
    }
    if creds.is_blocked {
        return Err(AuthError::AccountBlocked);
    }
    Ok(())
}
