use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub frontend_url: String,
    pub allow_org_signup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL; when absent the server runs on the in-memory store
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_expiry_hours: u64,
    pub refresh_token_expiry_days: u64,
    pub password_reset_expiry_minutes: u64,
    pub session_ttl_minutes: u64,
    pub max_failed_attempts: u32,
    pub otp_validity_minutes: u64,
    pub otp_resend_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Communication service endpoint; when absent mails are only logged
    pub endpoint: Option<String>,
    pub from: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(v) = env::var("ORGAUTH_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("FRONTEND_URL") {
            self.server.frontend_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("SERVER_ALLOW_ORG_SIGNUP") {
            self.server.allow_org_signup = v.parse().unwrap_or(self.server.allow_org_signup);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            if !v.trim().is_empty() {
                self.database.url = Some(v);
            }
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_ISSUER") {
            self.security.jwt_issuer = v;
        }
        if let Ok(v) = env::var("SECURITY_ACCESS_TOKEN_EXPIRY_HOURS") {
            self.security.access_token_expiry_hours = v.parse().unwrap_or(self.security.access_token_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_TOKEN_EXPIRY_DAYS") {
            self.security.refresh_token_expiry_days = v.parse().unwrap_or(self.security.refresh_token_expiry_days);
        }
        if let Ok(v) = env::var("SECURITY_PASSWORD_RESET_EXPIRY_MINUTES") {
            self.security.password_reset_expiry_minutes = v.parse().unwrap_or(self.security.password_reset_expiry_minutes);
        }
        if let Ok(v) = env::var("SECURITY_SESSION_TTL_MINUTES") {
            self.security.session_ttl_minutes = v.parse().unwrap_or(self.security.session_ttl_minutes);
        }
        if let Ok(v) = env::var("SECURITY_MAX_FAILED_ATTEMPTS") {
            self.security.max_failed_attempts = v.parse().unwrap_or(self.security.max_failed_attempts);
        }
        if let Ok(v) = env::var("SECURITY_OTP_VALIDITY_MINUTES") {
            self.security.otp_validity_minutes = v.parse().unwrap_or(self.security.otp_validity_minutes);
        }
        if let Ok(v) = env::var("SECURITY_OTP_RESEND_INTERVAL_SECS") {
            self.security.otp_resend_interval_secs = v.parse().unwrap_or(self.security.otp_resend_interval_secs);
        }

        // Mail overrides
        if let Ok(v) = env::var("MAIL_ENDPOINT") {
            if !v.trim().is_empty() {
                self.mail.endpoint = Some(v);
            }
        }
        if let Ok(v) = env::var("MAIL_FROM") {
            self.mail.from = v;
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                frontend_url: "http://localhost:5173".to_string(),
                allow_org_signup: true,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: "orgauth-development-secret".to_string(),
                jwt_issuer: "orgauth-api".to_string(),
                access_token_expiry_hours: 24,
                refresh_token_expiry_days: 7,
                password_reset_expiry_minutes: 20,
                session_ttl_minutes: 60,
                max_failed_attempts: 5,
                otp_validity_minutes: 10,
                otp_resend_interval_secs: 30,
            },
            mail: MailConfig {
                endpoint: None,
                from: "no-reply@localhost".to_string(),
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 3000,
                frontend_url: "https://staging.example.com".to_string(),
                allow_org_signup: true,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_issuer: "orgauth-api".to_string(),
                access_token_expiry_hours: 8,
                refresh_token_expiry_days: 7,
                password_reset_expiry_minutes: 20,
                session_ttl_minutes: 30,
                max_failed_attempts: 5,
                otp_validity_minutes: 10,
                otp_resend_interval_secs: 60,
            },
            mail: MailConfig {
                endpoint: None,
                from: "no-reply@staging.example.com".to_string(),
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 3000,
                frontend_url: "https://app.example.com".to_string(),
                allow_org_signup: false,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_issuer: "orgauth-api".to_string(),
                access_token_expiry_hours: 4,
                refresh_token_expiry_days: 7,
                password_reset_expiry_minutes: 20,
                session_ttl_minutes: 15,
                max_failed_attempts: 5,
                otp_validity_minutes: 10,
                otp_resend_interval_secs: 60,
            },
            mail: MailConfig {
                endpoint: None,
                from: "no-reply@app.example.com".to_string(),
            },
        }
    }

    /// Checks that must pass before the server starts
    pub fn validate(&self) -> Result<(), String> {
        if self.security.jwt_secret.is_empty() {
            return Err("JWT_SECRET must be set".to_string());
        }
        if matches!(self.environment, Environment::Production) && self.security.jwt_secret.len() < 32 {
            return Err("JWT_SECRET must be at least 32 characters in production".to_string());
        }
        if self.security.max_failed_attempts == 0 {
            return Err("SECURITY_MAX_FAILED_ATTEMPTS must be greater than zero".to_string());
        }
        Ok(())
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.server.allow_org_signup);
        assert!(config.database.url.is_none());
        assert_eq!(config.security.max_failed_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.server.allow_org_signup);
        assert_eq!(config.security.access_token_expiry_hours, 4);
        // No secret baked into production defaults
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_production_rejects_short_secret() {
        let mut config = AppConfig::production();
        config.security.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
        config.security.jwt_secret = "x".repeat(32);
        assert!(config.validate().is_ok());
    }
}
