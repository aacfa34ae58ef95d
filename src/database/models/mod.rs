pub mod auth_config;
pub mod org;
pub mod session;
pub mod user;

pub use auth_config::{
    AuthStep, AzureAdSettings, ConfigValidationError, GoogleSettings, MicrosoftSettings, OAuthSettings, OrgAuthConfig,
    ProviderSettings, SamlSettings,
};
pub use org::Org;
pub use session::AuthSession;
pub use user::{User, UserCredentials};
