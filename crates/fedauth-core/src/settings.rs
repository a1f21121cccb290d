use crate::config::ConfigError;

pub const DEFAULT_PROFILE: &str = "default";

/// Validated settings for one authentication run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub org_domain: String,
    pub oidc_client_id: String,
    pub fed_app_id: Option<String>,
    pub iam_idp_arn: Option<String>,
    pub open_browser: bool,
    pub open_browser_command: Option<String>,
    pub all_profiles: bool,
    pub cache_access_token: bool,
    pub profile: String,
}

impl Settings {
    pub fn new<D: Into<String>, C: Into<String>>(org_domain: D, oidc_client_id: C) -> Self {
        Self {
            org_domain: org_domain.into(),
            oidc_client_id: oidc_client_id.into(),
            fed_app_id: None,
            iam_idp_arn: None,
            open_browser: false,
            open_browser_command: None,
            all_profiles: false,
            cache_access_token: false,
            profile: DEFAULT_PROFILE.to_owned(),
        }
    }

    pub fn with_fed_app_id<S: Into<String>>(mut self, app_id: S) -> Self {
        self.fed_app_id = Some(app_id.into());
        self
    }

    pub fn with_iam_idp_arn<S: Into<String>>(mut self, arn: S) -> Self {
        self.iam_idp_arn = Some(arn.into());
        self
    }

    pub fn with_profile<S: Into<String>>(mut self, profile: S) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_cache_access_token(mut self, enabled: bool) -> Self {
        self.cache_access_token = enabled;
        self
    }

    /// Check the fields without which no network attempt can succeed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.org_domain.trim().is_empty() {
            return Err(ConfigError::MissingSetting("org-domain"));
        }
        if self.oidc_client_id.trim().is_empty() {
            return Err(ConfigError::MissingSetting("oidc-client-id"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_settings_validate() {
        let settings = Settings::new("example.okta.com", "0oa1");
        assert!(settings.validate().is_ok());
        assert_eq!(settings.profile, DEFAULT_PROFILE);
    }

    #[test]
    fn blank_client_id_is_rejected() {
        let err = Settings::new("example.okta.com", "  ").validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("oidc-client-id")));
    }

    #[test]
    fn domain_is_checked_first() {
        let err = Settings::new("", "").validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("org-domain")));
    }
}
