use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::manager::{DatabaseError, DatabaseManager};
use super::models::{AuthSession, AuthStep, Org, OrgAuthConfig, ProviderSettings, User, UserCredentials};
use super::store::{
    AuthConfigStore, CredentialStore, FailedAttempt, OrgStore, RevocationStore, SessionStore, Store, UserStore,
};

/// Postgres-backed store; schema lives in `migrations/`
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct OrgRow {
    id: Uuid,
    name: String,
    domain: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrgRow> for Org {
    fn from(r: OrgRow) -> Self {
        Org {
            id: r.id,
            name: r.name,
            domain: r.domain,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    org_id: Uuid,
    email: String,
    full_name: String,
    is_admin: bool,
    is_active: bool,
    has_logged_in: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            org_id: r.org_id,
            email: r.email,
            full_name: r.full_name,
            is_admin: r.is_admin,
            is_active: r.is_active,
            has_logged_in: r.has_logged_in,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRow {
    user_id: Uuid,
    password_hash: Option<String>,
    failed_attempts: i32,
    is_blocked: bool,
    otp_hash: Option<String>,
    otp_issued_at: Option<DateTime<Utc>>,
    otp_expires_at: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<CredentialsRow> for UserCredentials {
    fn from(r: CredentialsRow) -> Self {
        UserCredentials {
            user_id: r.user_id,
            password_hash: r.password_hash,
            failed_attempts: r.failed_attempts.max(0) as u32,
            is_blocked: r.is_blocked,
            otp_hash: r.otp_hash,
            otp_issued_at: r.otp_issued_at,
            otp_expires_at: r.otp_expires_at,
            last_login_at: r.last_login_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(FromRow)]
struct AuthConfigRow {
    org_id: Uuid,
    auth_steps: Json<Vec<AuthStep>>,
    providers: Json<ProviderSettings>,
    updated_at: DateTime<Utc>,
}

impl From<AuthConfigRow> for OrgAuthConfig {
    fn from(r: AuthConfigRow) -> Self {
        OrgAuthConfig {
            org_id: r.org_id,
            auth_steps: r.auth_steps.0,
            providers: r.providers.0,
            updated_at: r.updated_at,
        }
    }
}

#[derive(FromRow)]
struct SessionRow {
    token: String,
    email: String,
    org_id: Uuid,
    user_id: Option<Uuid>,
    current_step: i32,
    steps: Json<Vec<AuthStep>>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SessionRow> for AuthSession {
    fn from(r: SessionRow) -> Self {
        AuthSession {
            token: r.token,
            email: r.email,
            org_id: r.org_id,
            user_id: r.user_id,
            current_step: r.current_step.max(0) as usize,
            steps: r.steps.0,
            created_at: r.created_at,
            expires_at: r.expires_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, org_id, email, full_name, is_admin, is_active, has_logged_in, created_at, updated_at";

#[async_trait]
impl OrgStore for PgStore {
    async fn create_org(&self, org: &Org) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO orgs (id, name, domain, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(&org.domain)
        .bind(org.is_active)
        .bind(org.created_at)
        .bind(org.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseManager::map_unique(e, &format!("organization domain '{}'", org.domain)))?;
        Ok(())
    }

    async fn find_org(&self, id: Uuid) -> Result<Option<Org>, DatabaseError> {
        let row = sqlx::query_as::<_, OrgRow>(
            "SELECT id, name, domain, is_active, created_at, updated_at FROM orgs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Org::from))
    }

    async fn find_org_by_domain(&self, domain: &str) -> Result<Option<Org>, DatabaseError> {
        let row = sqlx::query_as::<_, OrgRow>(
            "SELECT id, name, domain, is_active, created_at, updated_at FROM orgs WHERE domain = $1",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Org::from))
    }

    async fn delete_org(&self, id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM orgs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: &User) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO users (id, org_id, email, full_name, is_admin, is_active, has_logged_in, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(user.id)
        .bind(user.org_id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.is_admin)
        .bind(user.is_active)
        .bind(user.has_logged_in)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseManager::map_unique(e, &format!("user email '{}'", user.email)))?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE users
             SET full_name = $2, is_admin = $3, is_active = $4, has_logged_in = $5, updated_at = $6
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(user.is_admin)
        .bind(user.is_active)
        .bind(user.has_logged_in)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {}", user.id)));
        }
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn get_credentials(&self, user_id: Uuid) -> Result<Option<UserCredentials>, DatabaseError> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            "SELECT user_id, password_hash, failed_attempts, is_blocked, otp_hash,
                    otp_issued_at, otp_expires_at, last_login_at, updated_at
             FROM user_credentials WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserCredentials::from))
    }

    async fn save_credentials(&self, c: &UserCredentials) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO user_credentials
                (user_id, password_hash, failed_attempts, is_blocked, otp_hash,
                 otp_issued_at, otp_expires_at, last_login_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (user_id) DO UPDATE SET
                password_hash = EXCLUDED.password_hash,
                failed_attempts = EXCLUDED.failed_attempts,
                is_blocked = EXCLUDED.is_blocked,
                otp_hash = EXCLUDED.otp_hash,
                otp_issued_at = EXCLUDED.otp_issued_at,
                otp_expires_at = EXCLUDED.otp_expires_at,
                last_login_at = EXCLUDED.last_login_at,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(c.user_id)
        .bind(&c.password_hash)
        .bind(i32::try_from(c.failed_attempts).unwrap_or(i32::MAX))
        .bind(c.is_blocked)
        .bind(&c.otp_hash)
        .bind(c.otp_issued_at)
        .bind(c.otp_expires_at)
        .bind(c.last_login_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO user_credentials (user_id, password_hash, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (user_id) DO UPDATE SET
                password_hash = EXCLUDED.password_hash,
                updated_at = now()",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_lockout(&self, user_id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO user_credentials (user_id, updated_at)
             VALUES ($1, now())
             ON CONFLICT (user_id) DO UPDATE SET
                failed_attempts = 0,
                is_blocked = FALSE,
                otp_hash = NULL,
                otp_issued_at = NULL,
                otp_expires_at = NULL,
                updated_at = now()",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn store_otp(
        &self,
        user_id: Uuid,
        otp_hash: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO user_credentials (user_id, otp_hash, otp_issued_at, otp_expires_at, updated_at)
             VALUES ($1, $2, $3, $4, $3)
             ON CONFLICT (user_id) DO UPDATE SET
                otp_hash = EXCLUDED.otp_hash,
                otp_issued_at = EXCLUDED.otp_issued_at,
                otp_expires_at = EXCLUDED.otp_expires_at,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(user_id)
        .bind(otp_hash)
        .bind(issued_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_otp(&self, user_id: Uuid, otp_hash: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE user_credentials
             SET otp_hash = NULL, otp_issued_at = NULL, otp_expires_at = NULL, updated_at = $3
             WHERE user_id = $1 AND otp_hash = $2 AND otp_expires_at > $3",
        )
        .bind(user_id)
        .bind(otp_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_failed_attempt(&self, user_id: Uuid, max_attempts: u32) -> Result<FailedAttempt, DatabaseError> {
        let max = i32::try_from(max_attempts).unwrap_or(i32::MAX);
        let (attempts, is_blocked): (i32, bool) = sqlx::query_as(
            "INSERT INTO user_credentials (user_id, failed_attempts, is_blocked, updated_at)
             VALUES ($1, 1, 1 >= $2, now())
             ON CONFLICT (user_id) DO UPDATE SET
                failed_attempts = user_credentials.failed_attempts + 1,
                is_blocked = user_credentials.is_blocked OR user_credentials.failed_attempts + 1 >= $2,
                updated_at = now()
             RETURNING failed_attempts, is_blocked",
        )
        .bind(user_id)
        .bind(max)
        .fetch_one(&self.pool)
        .await?;

        Ok(FailedAttempt {
            attempts: u32::try_from(attempts).unwrap_or(0),
            is_blocked,
        })
    }

    async fn record_successful_attempt(
        &self,
        user_id: Uuid,
        login_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "INSERT INTO user_credentials (user_id, last_login_at, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (user_id) DO UPDATE SET
                failed_attempts = 0,
                last_login_at = COALESCE(EXCLUDED.last_login_at, user_credentials.last_login_at),
                updated_at = now()
             WHERE NOT user_credentials.is_blocked
             RETURNING user_id",
        )
        .bind(user_id)
        .bind(login_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl AuthConfigStore for PgStore {
    async fn get_auth_config(&self, org_id: Uuid) -> Result<Option<OrgAuthConfig>, DatabaseError> {
        let row = sqlx::query_as::<_, AuthConfigRow>(
            "SELECT org_id, auth_steps, providers, updated_at FROM org_auth_configs WHERE org_id = $1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(OrgAuthConfig::from))
    }

    async fn save_auth_config(&self, config: &OrgAuthConfig) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO org_auth_configs (org_id, auth_steps, providers, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (org_id) DO UPDATE SET
                auth_steps = EXCLUDED.auth_steps,
                providers = EXCLUDED.providers,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(config.org_id)
        .bind(Json(&config.auth_steps))
        .bind(Json(&config.providers))
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, s: &AuthSession) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "INSERT INTO auth_sessions (token, email, org_id, user_id, current_step, steps, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&s.token)
        .bind(&s.email)
        .bind(s.org_id)
        .bind(s.user_id)
        .bind(s.current_step as i32)
        .bind(Json(&s.steps))
        .bind(s.created_at)
        .bind(s.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<AuthSession>, DatabaseError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT token, email, org_id, user_id, current_step, steps, created_at, expires_at
             FROM auth_sessions WHERE token = $1 AND expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AuthSession::from))
    }

    async fn advance_session(&self, token: &str, from_step: usize, user_id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET current_step = current_step + 1, user_id = $3
             WHERE token = $1 AND current_step = $2 AND expires_at > now()",
        )
        .bind(token)
        .bind(i32::try_from(from_step).unwrap_or(i32::MAX))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_session(&self, token: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE token = $1 AND expires_at > now()")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RevocationStore for PgStore {
    async fn revoke_token(&self, jti: Uuid, expires_at: DateTime<Utc>) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT INTO revoked_tokens (jti, expires_at) VALUES ($1, $2) ON CONFLICT (jti) DO NOTHING")
            .bind(jti)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_token_revoked(&self, jti: Uuid) -> Result<bool, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM revoked_tokens WHERE jti = $1")
            .bind(jti)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }
}
