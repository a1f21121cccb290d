use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ConfigError;

/// Remediation appended to a grant rejection the orchestrator could not recover from.
pub const REMEDIATION_GUIDANCE: &str = "Authentication failed because the identity provider rejected the grant. Please log out of your identity provider in your browser and log back in to resolve the issue.";

/// Errors surfaced by authentication and token cache routines.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{source}\n{}", REMEDIATION_GUIDANCE)]
    GrantRejected {
        attempts: u8,
        #[source]
        source: ProviderError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint error {status}: {body}")]
    TokenEndpoint { status: StatusCode, body: String },
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("device authorization expired before it was approved")]
    DeviceCodeExpired,
    #[error("failed to launch system browser: {0}")]
    BrowserLaunch(String),
    #[error("authorization flow cancelled")]
    Cancelled,
}

impl AuthError {
    /// Classification assigned by the IdP client, if this error came from the provider.
    pub fn provider_kind(&self) -> Option<&ProviderErrorKind> {
        match self {
            AuthError::Provider(err) | AuthError::GrantRejected { source: err, .. } => {
                Some(&err.kind)
            }
            _ => None,
        }
    }

    pub fn is_invalid_grant(&self) -> bool {
        matches!(self.provider_kind(), Some(ProviderErrorKind::InvalidGrant))
    }
}

/// OAuth error codes the provider may return from its token and device endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorKind {
    InvalidGrant,
    AuthorizationPending,
    SlowDown,
    AccessDenied,
    ExpiredToken,
    Other(String),
}

impl ProviderErrorKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "invalid_grant" => ProviderErrorKind::InvalidGrant,
            "authorization_pending" => ProviderErrorKind::AuthorizationPending,
            "slow_down" => ProviderErrorKind::SlowDown,
            "access_denied" => ProviderErrorKind::AccessDenied,
            "expired_token" => ProviderErrorKind::ExpiredToken,
            other => ProviderErrorKind::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProviderErrorKind::InvalidGrant => "invalid_grant",
            ProviderErrorKind::AuthorizationPending => "authorization_pending",
            ProviderErrorKind::SlowDown => "slow_down",
            ProviderErrorKind::AccessDenied => "access_denied",
            ProviderErrorKind::ExpiredToken => "expired_token",
            ProviderErrorKind::Other(code) => code,
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejection reported by the identity provider, classified once at the client boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identity provider error {kind}: {description}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub description: String,
}

impl ProviderError {
    pub fn new<S: Into<String>>(kind: ProviderErrorKind, description: S) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    pub fn invalid_grant<S: Into<String>>(description: S) -> Self {
        Self::new(ProviderErrorKind::InvalidGrant, description)
    }
}

/// RFC 6749 error body.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

impl From<ErrorResponse> for ProviderError {
    fn from(body: ErrorResponse) -> Self {
        let kind = ProviderErrorKind::from_code(&body.error);
        let description = body.error_description.unwrap_or(body.error);
        ProviderError { kind, description }
    }
}
