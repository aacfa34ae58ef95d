use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth_config::AuthStep;

/// Server-side record of an in-progress login.
///
/// `steps` is a snapshot of the organization's auth steps taken when the
/// session was opened, so config edits never change a login mid-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub email: String,
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    pub current_step: usize,
    pub steps: Vec<AuthStep>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn new(
        token: String,
        email: &str,
        org_id: Uuid,
        user_id: Option<Uuid>,
        steps: Vec<AuthStep>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            token,
            email: email.to_string(),
            org_id,
            user_id,
            current_step: 0,
            steps,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn current(&self) -> Option<&AuthStep> {
        self.steps.get(self.current_step)
    }

    pub fn is_final_step(&self) -> bool {
        self.current_step + 1 >= self.steps.len()
    }
}
