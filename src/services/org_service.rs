use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{email_domain, normalize_email};
use crate::auth::password::{hash_password, validate_password_strength, PasswordError};
use crate::database::models::{
    AuthStep, ConfigValidationError, Org, OrgAuthConfig, ProviderSettings, User, UserCredentials,
};
use crate::database::{DatabaseError, Store};

const MAX_NAME_LENGTH: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum OrgError {
    #[error("Organization signup is disabled")]
    SignupDisabled,

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigValidationError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Signup form for a new organization and its first admin
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrg {
    pub name: String,
    pub domain: String,
    pub admin_email: String,
    pub admin_full_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Organization administration: signup, auth configuration, user management
pub struct OrgService {
    store: Arc<dyn Store>,
    allow_signup: bool,
}

impl OrgService {
    pub fn new(store: Arc<dyn Store>, allow_signup: bool) -> Self {
        Self { store, allow_signup }
    }

    /// Create an organization, its admin and the default auth configuration
    #[tracing::instrument(skip(self, request), fields(domain = %request.domain))]
    pub async fn create_org(&self, request: NewOrg) -> Result<(Org, User), OrgError> {
        if !self.allow_signup {
            return Err(OrgError::SignupDisabled);
        }

        let name = validate_name(&request.name, "Organization name")?;
        let full_name = validate_name(&request.admin_full_name, "Admin full name")?;
        let domain = validate_domain(&request.domain)?;
        let admin_email = normalize_email(&request.admin_email)
            .ok_or_else(|| OrgError::Invalid("A valid admin email address is required".to_string()))?;
        if email_domain(&admin_email) != domain {
            return Err(OrgError::Invalid(format!(
                "Admin email must belong to the organization domain '{}'",
                domain
            )));
        }
        validate_password_strength(&request.password).map_err(OrgError::Invalid)?;

        if self.store.find_org_by_domain(&domain).await?.is_some() {
            return Err(OrgError::Conflict(format!("An organization already uses domain '{}'", domain)));
        }
        if self.store.find_user_by_email(&admin_email).await?.is_some() {
            return Err(OrgError::Conflict("A user with this email already exists".to_string()));
        }

        let password_hash = hash_password(&request.password)?;
        let org = Org::new(&name, &domain);
        self.store.create_org(&org).await.map_err(conflict_message)?;

        let admin = match self.seed_org(&org, &admin_email, &full_name, password_hash).await {
            Ok(admin) => admin,
            Err(e) => {
                // the domain must not stay claimed by an org nobody can sign in to
                if let Err(cleanup) = self.store.delete_org(org.id).await {
                    tracing::error!(org_id = %org.id, "Failed to remove partially created org: {}", cleanup);
                }
                return Err(e);
            }
        };

        tracing::info!(org_id = %org.id, admin_id = %admin.id, "Organization created");
        Ok((org, admin))
    }

    async fn seed_org(
        &self,
        org: &Org,
        admin_email: &str,
        full_name: &str,
        password_hash: String,
    ) -> Result<User, OrgError> {
        let mut admin = User::new(org.id, admin_email, full_name);
        admin.is_admin = true;
        self.store.create_user(&admin).await.map_err(conflict_message)?;

        let mut creds = UserCredentials::new(admin.id);
        creds.password_hash = Some(password_hash);
        self.store.save_credentials(&creds).await?;
        self.store.save_auth_config(&OrgAuthConfig::default_for(org.id)).await?;
        Ok(admin)
    }

    /// Auth configuration of `org_id` with provider secrets blanked
    pub async fn get_auth_config(&self, org_id: Uuid) -> Result<OrgAuthConfig, OrgError> {
        let mut config = self.load_auth_config(org_id).await?;
        config.providers = config.providers.redacted();
        Ok(config)
    }

    /// Replace the org's steps and provider settings.
    ///
    /// A SAML section sent back with a blank `assertionSecret` (as returned by
    /// [`get_auth_config`](Self::get_auth_config)) keeps the stored secret.
    #[tracing::instrument(skip(self, steps, providers))]
    pub async fn update_auth_config(
        &self,
        org_id: Uuid,
        steps: Vec<AuthStep>,
        mut providers: ProviderSettings,
    ) -> Result<OrgAuthConfig, OrgError> {
        let existing = self.load_auth_config(org_id).await?;
        if let (Some(saml), Some(old)) = (providers.saml.as_mut(), existing.providers.saml.as_ref()) {
            if saml.assertion_secret.is_empty() {
                saml.assertion_secret = old.assertion_secret.clone();
            }
        }

        let mut config = OrgAuthConfig {
            org_id,
            auth_steps: steps,
            providers,
            updated_at: Utc::now(),
        };
        config.validate()?;
        config.auth_steps = config.sorted_steps();
        self.store.save_auth_config(&config).await?;

        tracing::info!(
            steps = config.auth_steps.len(),
            "Auth configuration updated"
        );
        config.providers = config.providers.redacted();
        Ok(config)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn create_user(&self, org_id: Uuid, request: NewUser) -> Result<User, OrgError> {
        let email = normalize_email(&request.email)
            .ok_or_else(|| OrgError::Invalid("A valid email address is required".to_string()))?;
        let full_name = validate_name(&request.full_name, "Full name")?;
        let password_hash = match request.password.as_deref() {
            Some(password) => {
                validate_password_strength(password).map_err(OrgError::Invalid)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let mut user = User::new(org_id, &email, &full_name);
        user.is_admin = request.is_admin;
        self.store.create_user(&user).await.map_err(conflict_message)?;

        let mut creds = UserCredentials::new(user.id);
        creds.password_hash = password_hash;
        self.store.save_credentials(&creds).await?;

        tracing::info!(user_id = %user.id, is_admin = user.is_admin, "User created");
        Ok(user)
    }

    /// Clear the lockout of a user of `org_id`
    #[tracing::instrument(skip(self))]
    pub async fn unblock_user(&self, org_id: Uuid, user_id: Uuid) -> Result<User, OrgError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .filter(|u| u.org_id == org_id)
            .ok_or_else(|| OrgError::NotFound("User not found".to_string()))?;

        self.store.reset_lockout(user.id).await?;

        tracing::info!(user_id = %user.id, "User unblocked");
        Ok(user)
    }

    async fn load_auth_config(&self, org_id: Uuid) -> Result<OrgAuthConfig, OrgError> {
        Ok(self
            .store
            .get_auth_config(org_id)
            .await?
            .unwrap_or_else(|| OrgAuthConfig::default_for(org_id)))
    }
}

fn conflict_message(err: DatabaseError) -> OrgError {
    match err {
        DatabaseError::Conflict(what) => OrgError::Conflict(format!("{} already exists", what)),
        other => other.into(),
    }
}

fn validate_name(raw: &str, field: &str) -> Result<String, OrgError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(OrgError::Invalid(format!("{} is required", field)));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(OrgError::Invalid(format!(
            "{} must be at most {} characters",
            field, MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

fn validate_domain(raw: &str) -> Result<String, OrgError> {
    let domain = raw.trim().to_lowercase();
    let valid = domain.contains('.')
        && domain.len() <= 253
        && domain.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(domain)
    } else {
        Err(OrgError::Invalid(format!("'{}' is not a valid domain", raw.trim())))
    }
}
