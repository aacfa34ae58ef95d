use std::sync::Arc;

use crate::auth::{TokenError, TokenIssuer};
use crate::config::AppConfig;
use crate::database::Store;
use crate::mailer::Mailer;
use crate::providers::ProviderRegistry;
use crate::services::{AuthService, OrgService};

/// Everything a request handler can reach
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub tokens: Arc<TokenIssuer>,
    pub auth: Arc<AuthService>,
    pub orgs: Arc<OrgService>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        providers: ProviderRegistry,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, TokenError> {
        let tokens = Arc::new(TokenIssuer::new(&config.security)?);
        let auth = AuthService::new(&config, store.clone(), tokens.clone(), providers, mailer);
        let orgs = OrgService::new(store.clone(), config.server.allow_org_signup);

        Ok(Self {
            config: Arc::new(config),
            store,
            tokens,
            auth: Arc::new(auth),
            orgs: Arc::new(orgs),
        })
    }
}
