// Persistence seams used by the services. `MemoryStore` and `PgStore`
// implement all of them; handlers only ever see `Arc<dyn Store>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::manager::DatabaseError;
use super::models::{AuthSession, Org, OrgAuthConfig, User, UserCredentials};

#[async_trait]
pub trait OrgStore: Send + Sync {
    async fn create_org(&self, org: &Org) -> Result<(), DatabaseError>;
    async fn find_org(&self, id: Uuid) -> Result<Option<Org>, DatabaseError>;
    async fn find_org_by_domain(&self, domain: &str) -> Result<Option<Org>, DatabaseError>;
    /// Removes the org together with everything it owns
    async fn delete_org(&self, id: Uuid) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is taken
    async fn create_user(&self, user: &User) -> Result<(), DatabaseError>;
    async fn update_user(&self, user: &User) -> Result<(), DatabaseError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;
}

/// Result of counting one failed password/OTP check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAttempt {
    pub attempts: u32,
    pub is_blocked: bool,
}

/// Lockout and OTP state change through the targeted updates below, each one
/// atomic per row. `save_credentials` replaces the whole row and is only meant
/// for freshly created users.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credentials(&self, user_id: Uuid) -> Result<Option<UserCredentials>, DatabaseError>;
    async fn save_credentials(&self, credentials: &UserCredentials) -> Result<(), DatabaseError>;

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), DatabaseError>;

    /// Clear the failure counter, the block and any pending OTP
    async fn reset_lockout(&self, user_id: Uuid) -> Result<(), DatabaseError>;

    async fn store_otp(
        &self,
        user_id: Uuid,
        otp_hash: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Clear the pending OTP if it is still `otp_hash` and unexpired at `now`.
    /// Returns false when another request consumed it first.
    async fn consume_otp(&self, user_id: Uuid, otp_hash: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError>;

    /// Increment the failure counter, blocking once it reaches `max_attempts`
    async fn record_failed_attempt(&self, user_id: Uuid, max_attempts: u32) -> Result<FailedAttempt, DatabaseError>;

    /// Reset the failure counter (and stamp `last_login_at` when given) unless
    /// the account is blocked. Returns false for a blocked account.
    async fn record_successful_attempt(
        &self,
        user_id: Uuid,
        login_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait AuthConfigStore: Send + Sync {
    async fn get_auth_config(&self, org_id: Uuid) -> Result<Option<OrgAuthConfig>, DatabaseError>;
    async fn save_auth_config(&self, config: &OrgAuthConfig) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &AuthSession) -> Result<(), DatabaseError>;
    /// Expired sessions are reported as missing
    async fn get_session(&self, token: &str) -> Result<Option<AuthSession>, DatabaseError>;
    /// Move an unexpired session from `from_step` to the next step, binding it
    /// to `user_id`. Returns false when the session is gone or already moved on.
    async fn advance_session(&self, token: &str, from_step: usize, user_id: Uuid) -> Result<bool, DatabaseError>;
    /// Returns whether this call removed the session
    async fn delete_session(&self, token: &str) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn revoke_token(&self, jti: Uuid, expires_at: DateTime<Utc>) -> Result<(), DatabaseError>;
    async fn is_token_revoked(&self, jti: Uuid) -> Result<bool, DatabaseError>;
}

/// Everything the service needs from persistence
#[async_trait]
pub trait Store:
    OrgStore + UserStore + CredentialStore + AuthConfigStore + SessionStore + RevocationStore
{
    async fn health_check(&self) -> Result<(), DatabaseError>;
}
