use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::manager::DatabaseError;
use super::models::{AuthSession, Org, OrgAuthConfig, User, UserCredentials};
use super::store::{
    AuthConfigStore, CredentialStore, FailedAttempt, OrgStore, RevocationStore, SessionStore, Store, UserStore,
};

#[derive(Default)]
struct MemoryState {
    orgs: HashMap<Uuid, Org>,
    users: HashMap<Uuid, User>,
    credentials: HashMap<Uuid, UserCredentials>,
    auth_configs: HashMap<Uuid, OrgAuthConfig>,
    sessions: HashMap<String, AuthSession>,
    revoked: HashMap<Uuid, DateTime<Utc>>,
}

impl MemoryState {
    fn credentials_mut(&mut self, user_id: Uuid) -> &mut UserCredentials {
        self.credentials
            .entry(user_id)
            .or_insert_with(|| UserCredentials::new(user_id))
    }
}

/// Process-local store used without `DATABASE_URL` and in tests
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrgStore for MemoryStore {
    async fn create_org(&self, org: &Org) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        if state.orgs.values().any(|o| o.domain == org.domain) {
            return Err(DatabaseError::Conflict(format!("organization domain '{}'", org.domain)));
        }
        state.orgs.insert(org.id, org.clone());
        Ok(())
    }

    async fn find_org(&self, id: Uuid) -> Result<Option<Org>, DatabaseError> {
        Ok(self.state.read().await.orgs.get(&id).cloned())
    }

    async fn find_org_by_domain(&self, domain: &str) -> Result<Option<Org>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.orgs.values().find(|o| o.domain == domain).cloned())
    }

    async fn delete_org(&self, id: Uuid) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        state.orgs.remove(&id);
        state.auth_configs.remove(&id);
        let members: Vec<Uuid> = state.users.values().filter(|u| u.org_id == id).map(|u| u.id).collect();
        for user_id in members {
            state.users.remove(&user_id);
            state.credentials.remove(&user_id);
        }
        state.sessions.retain(|_, s| s.org_id != id);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::Conflict(format!("user email '{}'", user.email)));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        match state.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(DatabaseError::NotFound(format!("user {}", user.id))),
        }
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_credentials(&self, user_id: Uuid) -> Result<Option<UserCredentials>, DatabaseError> {
        Ok(self.state.read().await.credentials.get(&user_id).cloned())
    }

    async fn save_credentials(&self, credentials: &UserCredentials) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        state.credentials.insert(credentials.user_id, credentials.clone());
        Ok(())
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let creds = state.credentials_mut(user_id);
        creds.password_hash = Some(password_hash.to_string());
        creds.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_lockout(&self, user_id: Uuid) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let creds = state.credentials_mut(user_id);
        creds.failed_attempts = 0;
        creds.is_blocked = false;
        creds.clear_otp();
        creds.updated_at = Utc::now();
        Ok(())
    }

    async fn store_otp(
        &self,
        user_id: Uuid,
        otp_hash: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let creds = state.credentials_mut(user_id);
        creds.otp_hash = Some(otp_hash.to_string());
        creds.otp_issued_at = Some(issued_at);
        creds.otp_expires_at = Some(expires_at);
        creds.updated_at = issued_at;
        Ok(())
    }

    async fn consume_otp(&self, user_id: Uuid, otp_hash: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        let Some(creds) = state.credentials.get_mut(&user_id) else {
            return Ok(false);
        };
        let pending = creds.otp_hash.as_deref() == Some(otp_hash)
            && creds.otp_expires_at.is_some_and(|exp| exp > now);
        if pending {
            creds.clear_otp();
            creds.updated_at = now;
        }
        Ok(pending)
    }

    async fn record_failed_attempt(&self, user_id: Uuid, max_attempts: u32) -> Result<FailedAttempt, DatabaseError> {
        let mut state = self.state.write().await;
        let creds = state.credentials_mut(user_id);
        creds.failed_attempts = creds.failed_attempts.saturating_add(1);
        creds.is_blocked = creds.is_blocked || creds.failed_attempts >= max_attempts;
        creds.updated_at = Utc::now();
        Ok(FailedAttempt {
            attempts: creds.failed_attempts,
            is_blocked: creds.is_blocked,
        })
    }

    async fn record_successful_attempt(
        &self,
        user_id: Uuid,
        login_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        let creds = state.credentials_mut(user_id);
        if creds.is_blocked {
            return Ok(false);
        }
        creds.failed_attempts = 0;
        if login_at.is_some() {
            creds.last_login_at = login_at;
        }
        creds.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl AuthConfigStore for MemoryStore {
    async fn get_auth_config(&self, org_id: Uuid) -> Result<Option<OrgAuthConfig>, DatabaseError> {
        Ok(self.state.read().await.auth_configs.get(&org_id).cloned())
    }

    async fn save_auth_config(&self, config: &OrgAuthConfig) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        state.auth_configs.insert(config.org_id, config.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &AuthSession) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        // Opportunistic sweep; sessions are short-lived
        state.sessions.retain(|_, s| !s.is_expired());
        state.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<AuthSession>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.sessions.get(token).filter(|s| !s.is_expired()).cloned())
    }

    async fn advance_session(&self, token: &str, from_step: usize, user_id: Uuid) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(token) {
            Some(session) if !session.is_expired() && session.current_step == from_step => {
                session.current_step = from_step + 1;
                session.user_id = Some(user_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_session(&self, token: &str) -> Result<bool, DatabaseError> {
        let removed = self.state.write().await.sessions.remove(token);
        Ok(removed.is_some_and(|s| !s.is_expired()))
    }
}

#[async_trait]
impl RevocationStore for MemoryStore {
    async fn revoke_token(&self, jti: Uuid, expires_at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        state.revoked.retain(|_, exp| *exp > now);
        state.revoked.insert(jti, expires_at);
        Ok(())
    }

    async fn is_token_revoked(&self, jti: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.state.read().await.revoked.contains_key(&jti))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::database::models::AuthStep;
    use crate::types::AuthMethod;

    fn session(token: &str, ttl: Duration) -> AuthSession {
        AuthSession::new(
            token.to_string(),
            "ada@example.com",
            Uuid::new_v4(),
            None,
            vec![AuthStep {
                order: 1,
                allowed_methods: vec![AuthMethod::Password],
            }],
            ttl,
        )
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        let org = Org::new("Example", "example.com");
        store.create_org(&org).await.unwrap();

        store.create_user(&User::new(org.id, "ada@example.com", "Ada")).await.unwrap();
        let err = store
            .create_user(&User::new(org.id, "ADA@example.com ", "Ada again"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_domain_is_a_conflict() {
        let store = MemoryStore::new();
        store.create_org(&Org::new("One", "example.com")).await.unwrap();
        let err = store.create_org(&Org::new("Two", "Example.com")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible() {
        let store = MemoryStore::new();
        store.create_session(&session("live", Duration::minutes(5))).await.unwrap();
        store.create_session(&session("stale", Duration::seconds(-1))).await.unwrap();

        assert!(store.get_session("live").await.unwrap().is_some());
        assert!(store.get_session("stale").await.unwrap().is_none());

        assert!(store.delete_session("live").await.unwrap());
        assert!(store.get_session("live").await.unwrap().is_none());
        assert!(!store.delete_session("live").await.unwrap());
    }

    #[tokio::test]
    async fn sessions_advance_only_from_their_current_step() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store.create_session(&session("s", Duration::minutes(5))).await.unwrap();

        assert!(store.advance_session("s", 0, user_id).await.unwrap());
        assert!(!store.advance_session("s", 0, user_id).await.unwrap());
        assert!(!store.advance_session("gone", 0, user_id).await.unwrap());

        let s = store.get_session("s").await.unwrap().unwrap();
        assert_eq!(s.current_step, 1);
        assert_eq!(s.user_id, Some(user_id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_are_all_counted() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.record_failed_attempt(user_id, 5).await.unwrap() })
            })
            .collect();
        let mut reached_limit = 0;
        for handle in handles {
            if handle.await.unwrap().attempts == 5 {
                reached_limit += 1;
            }
        }

        let creds = store.get_credentials(user_id).await.unwrap().unwrap();
        assert_eq!(creds.failed_attempts, 20);
        assert!(creds.is_blocked);
        assert_eq!(reached_limit, 1);
    }

    #[tokio::test]
    async fn success_never_lifts_a_block() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store.record_failed_attempt(user_id, 1).await.unwrap();

        assert!(!store.record_successful_attempt(user_id, Some(Utc::now())).await.unwrap());
        let creds = store.get_credentials(user_id).await.unwrap().unwrap();
        assert!(creds.is_blocked);
        assert!(creds.last_login_at.is_none());

        store.reset_lockout(user_id).await.unwrap();
        assert!(store.record_successful_attempt(user_id, None).await.unwrap());
    }

    #[tokio::test]
    async fn otp_is_consumed_once() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        store
            .store_otp(user_id, "digest", now, now + Duration::minutes(10))
            .await
            .unwrap();

        assert!(!store.consume_otp(user_id, "other", now).await.unwrap());
        assert!(store.consume_otp(user_id, "digest", now).await.unwrap());
        assert!(!store.consume_otp(user_id, "digest", now).await.unwrap());

        store
            .store_otp(user_id, "late", now - Duration::minutes(20), now - Duration::minutes(10))
            .await
            .unwrap();
        assert!(!store.consume_otp(user_id, "late", now).await.unwrap());
    }

    #[tokio::test]
    async fn revoked_tokens_are_remembered() {
        let store = MemoryStore::new();
        let jti = Uuid::new_v4();
        assert!(!store.is_token_revoked(jti).await.unwrap());
        store
            .revoke_token(jti, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert!(store.is_token_revoked(jti).await.unwrap());
    }
}
