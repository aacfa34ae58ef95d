use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub has_logged_in: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(org_id: Uuid, email: &str, full_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            org_id,
            email: email.trim().to_lowercase(),
            full_name: full_name.trim().to_string(),
            is_admin: false,
            is_active: true,
            has_logged_in: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Secret material and lockout state kept apart from the user profile
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub password_hash: Option<String>,
    pub failed_attempts: u32,
    pub is_blocked: bool,
    pub otp_hash: Option<String>,
    pub otp_issued_at: Option<DateTime<Utc>>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserCredentials {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            password_hash: None,
            failed_attempts: 0,
            is_blocked: false,
            otp_hash: None,
            otp_issued_at: None,
            otp_expires_at: None,
            last_login_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn clear_otp(&mut self) {
        self.otp_hash = None;
        self.otp_issued_at = None;
        self.otp_expires_at = None;
    }
}
