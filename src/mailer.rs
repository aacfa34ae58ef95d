//! Outbound mail.
//!
//! Services describe *what* to send with a [`MailTemplate`]; a [`Mailer`]
//! decides how. Without `MAIL_ENDPOINT` the server uses [`LogMailer`], which
//! records recipient and subject only and never the message body.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::MailConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Mail service responded with status {0}")]
    Rejected(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTemplate {
    LoginOtp { otp: String, valid_minutes: u64 },
    PasswordReset { link: String, valid_minutes: u64 },
    AccountLocked { attempts: u32 },
}

impl MailTemplate {
    pub fn subject(&self) -> &'static str {
        match self {
            MailTemplate::LoginOtp { .. } => "Your sign-in code",
            MailTemplate::PasswordReset { .. } => "Reset your password",
            MailTemplate::AccountLocked { .. } => "Your account has been locked",
        }
    }

    pub fn body(&self) -> String {
        match self {
            MailTemplate::LoginOtp { otp, valid_minutes } => format!(
                "Your one-time sign-in code is {otp}.\n\nIt expires in {valid_minutes} minutes. \
                 If you did not try to sign in, you can ignore this message."
            ),
            MailTemplate::PasswordReset { link, valid_minutes } => format!(
                "Someone asked to reset the password for your account.\n\n\
                 Open {link} within {valid_minutes} minutes to choose a new password. \
                 If this was not you, no action is needed."
            ),
            MailTemplate::AccountLocked { attempts } => format!(
                "Your account was locked after {attempts} failed sign-in attempts.\n\n\
                 Reset your password or ask an administrator of your organization to unlock it."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub template: MailTemplate,
}

impl MailMessage {
    pub fn new(to: &str, template: MailTemplate) -> Self {
        Self {
            to: to.to_string(),
            template,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Development mailer: writes a log line instead of delivering
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        tracing::info!(to = %message.to, subject = message.template.subject(), "Mail not delivered (no MAIL_ENDPOINT)");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct OutboundMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: String,
}

/// Posts each message as JSON to the communication service at `mail.endpoint`
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

impl HttpMailer {
    pub fn new(client: reqwest::Client, endpoint: &str, from: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            from: from.to_string(),
        }
    }

    /// `HttpMailer` when an endpoint is configured, `LogMailer` otherwise
    pub fn from_config(client: reqwest::Client, config: &MailConfig) -> Arc<dyn Mailer> {
        match &config.endpoint {
            Some(endpoint) => Arc::new(Self::new(client, endpoint, &config.from)),
            None => Arc::new(LogMailer),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[tracing::instrument(skip_all, fields(to = %message.to, subject = message.template.subject()))]
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let payload = OutboundMail {
            from: &self.from,
            to: &message.to,
            subject: message.template.subject(),
            body: message.template.body(),
        };

        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            tracing::warn!("Mail service returned {}", response.status());
            return Err(MailError::Rejected(response.status().as_u16()));
        }

        tracing::debug!("Mail handed to communication service");
        Ok(())
    }
}
