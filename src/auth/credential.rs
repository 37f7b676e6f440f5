use chrono::{DateTime, Duration, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Access is considered expired this long before the provider says so.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token bundle plus the client identity needed to refresh it.
///
/// Serialized in the same layout Google's own client libraries use for
/// `token.json`, so an existing token file can be reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|exp| now + Duration::seconds(EXPIRY_MARGIN_SECS) >= exp)
    }

    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && !self.is_expired_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn grants(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Fold a token-endpoint response into this credential. Fields the
    /// response leaves out keep their previous value.
    pub fn refreshed(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: Option<u64>,
        scopes: Option<Vec<String>>,
    ) -> Self {
        Self {
            token: access_token,
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: scopes.unwrap_or_else(|| self.scopes.clone()),
            expiry: expiry_from(expires_in_secs),
        }
    }
}

/// Absolute expiry for a relative `expires_in`. A lifetime chrono cannot
/// represent is logged and treated as no expiry.
pub fn expiry_from(expires_in_secs: Option<u64>) -> Option<DateTime<Utc>> {
    let secs = expires_in_secs?;
    let expiry = i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
    if expiry.is_none() {
        log::warn!("token server sent out-of-range expires_in {secs}; ignoring expiry");
    }
    expiry
}
