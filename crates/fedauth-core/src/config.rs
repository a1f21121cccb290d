use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "config.json";

/// Locates the per-user directory holding the token cache and optional config file.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    root: PathBuf,
}

impl ConfigLocator {
    /// Attempt to discover the persistent configuration directory, creating it if needed.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs =
            ProjectDirs::from("dev", "fedauth", "fedauth").ok_or(ConfigError::MissingProjectDirs)?;
        let config_dir = dirs.config_dir();
        fs::create_dir_all(config_dir).map_err(ConfigError::CreateDir)?;
        set_user_only_permissions(config_dir)?;
        Ok(Self {
            root: config_dir.to_path_buf(),
        })
    }

    /// Use an explicit directory instead of the platform default.
    pub fn from_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Path to the cached access token for the given profile.
    pub fn access_token_file(&self, profile: &str) -> PathBuf {
        self.root.join(format!("access-token-{profile}.json"))
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Read the optional config file. A missing file is `Ok(None)`.
    pub fn load_file_config(&self) -> Result<Option<FileConfig>, ConfigError> {
        let path = self.config_file();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
            path: path.clone(),
            source,
        })?;
        Ok(Some(config))
    }
}

/// Values that may be supplied through the config file instead of flags.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub org_domain: Option<String>,
    pub oidc_client_id: Option<String>,
    pub aws_acct_fed_app_id: Option<String>,
    pub aws_iam_idp: Option<String>,
    pub open_browser_command: Option<String>,
    pub profile: Option<String>,
}

fn set_user_only_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o700);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

/// Errors raised while locating or reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory for fedauth")]
    MissingProjectDirs,
    #[error("failed to create configuration directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("filesystem error: {0}")]
    Io(#[source] std::io::Error),
    #[error("malformed config file {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("required setting '{0}' is missing")]
    MissingSetting(&'static str),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}
