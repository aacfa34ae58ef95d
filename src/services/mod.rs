pub mod auth_service;
pub mod org_service;
pub mod provisioning;

pub use auth_service::{AccessToken, AuthError, AuthOutcome, AuthService, AuthTokens, StepChallenge};
pub use org_service::{NewOrg, NewUser, OrgError, OrgService};

const MAX_EMAIL_LENGTH: usize = 254;

/// Trim and lower-case `raw`, returning `None` unless it looks like `local@domain.tld`
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH || email.chars().any(char::is_whitespace) {
        return None;
    }

    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.contains('@') {
        return None;
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return None;
    }
    Some(email)
}

/// Domain part of an already normalised email
pub fn email_domain(email: &str) -> &str {
    email.rsplit_once('@').map(|(_, d)| d).unwrap_or_default()
}
