use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConfigLocator;

use super::{AuthError, CachedToken};

/// Persistence abstraction for the cached access token of one profile.
pub trait TokenCache {
    fn load(&self) -> Result<Option<CachedToken>, AuthError>;
    fn save(&self, token: &CachedToken) -> Result<(), AuthError>;
    /// Remove the cached token. Returns `true` only if a token existed and was removed.
    fn invalidate(&self) -> bool;
}

/// Filesystem-backed token cache located in the user configuration directory.
pub struct FileTokenCache {
    locator: ConfigLocator,
    profile: String,
}

impl FileTokenCache {
    pub fn new(locator: ConfigLocator, profile: impl Into<String>) -> Self {
        Self {
            locator,
            profile: profile.into(),
        }
    }

    pub fn with_default_locator(profile: impl Into<String>) -> Result<Self, AuthError> {
        Ok(Self::new(ConfigLocator::new()?, profile))
    }

    fn path(&self) -> PathBuf {
        self.locator.access_token_file(&self.profile)
    }

    fn write_file(path: &Path, payload: &str) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(payload.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = file.metadata()?.permissions();
            perm.set_mode(0o600);
            fs::set_permissions(path, perm)?;
        }

        Ok(())
    }
}

impl TokenCache for FileTokenCache {
    fn load(&self) -> Result<Option<CachedToken>, AuthError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let envelope: TokenEnvelope = serde_json::from_str(&raw)?;
        Ok(Some(envelope.token))
    }

    fn save(&self, token: &CachedToken) -> Result<(), AuthError> {
        let envelope = TokenEnvelope {
            version: 1,
            profile: self.profile.clone(),
            token: token.clone(),
        };
        let payload = serde_json::to_string_pretty(&envelope)?;
        Self::write_file(&self.path(), &payload)
    }

    fn invalidate(&self) -> bool {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed cached access token");
                true
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove cached access token");
                false
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenEnvelope {
    version: u32,
    profile: String,
    token: CachedToken,
}
