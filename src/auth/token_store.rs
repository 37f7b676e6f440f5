use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::credential::Credential;
use crate::error::{Error, Result};

/// Persisted credential at a fixed path (`token.json` by default).
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored credential, if any. A file that exists but does not
    /// parse is an auth failure rather than a silent re-consent.
    pub fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&self.path)?;
        let cred: Credential = serde_json::from_str(&s).map_err(|e| {
            Error::auth(format!(
                "token file {} is invalid ({e}); delete it to sign in again",
                self.path.display()
            ))
        })?;
        Ok(Some(cred))
    }

    /// Overwrite the stored credential.
    pub fn save(&self, cred: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let s = serde_json::to_string_pretty(cred)
            .map_err(|e| Error::auth(format!("could not serialize credential: {e}")))?;
        fs::write(&self.path, s)?;
        log::debug!("saved credential to {}", self.path.display());
        Ok(())
    }
}
