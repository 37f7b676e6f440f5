use crate::auth::credential::Credential;
use crate::auth::oauth::OAuthFlow;
use crate::auth::token_store::TokenStore;
use crate::config::Config;
use crate::error::Result;

/// Hands out a usable credential for one scope, refreshing or re-running
/// consent as needed and keeping the token store current.
pub struct CredentialManager<F> {
    store: TokenStore,
    flow: F,
    scope: String,
}

impl<F: OAuthFlow> CredentialManager<F> {
    pub fn new(store: TokenStore, flow: F, scope: impl Into<String>) -> Self {
        Self {
            store,
            flow,
            scope: scope.into(),
        }
    }

    pub fn from_config(cfg: &Config, flow: F) -> Self {
        Self::new(TokenStore::new(cfg.token_path.clone()), flow, cfg.scope.clone())
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns a valid credential. The token store is written only when a
    /// new or refreshed credential was produced.
    pub fn acquire_credential(&self) -> Result<Credential> {
        let stored = self
            .store
            .load()?
            .filter(|c| {
                let ok = c.grants(&self.scope);
                if !ok {
                    log::info!("stored credential lacks scope {}, re-authorizing", self.scope);
                }
                ok
            });

        let fresh = match stored {
            Some(cred) if cred.is_valid() => {
                log::debug!("using stored credential");
                return Ok(cred);
            }
            Some(cred) if cred.can_refresh() => {
                log::info!("stored credential expired; refreshing");
                self.flow.refresh(&cred)?
            }
            _ => {
                log::info!("no usable credential; starting interactive consent");
                self.flow.consent(&self.scope)?
            }
        };

        self.store.save(&fresh)?;
        Ok(fresh)
    }
}
