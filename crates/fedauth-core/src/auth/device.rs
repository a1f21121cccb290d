use std::process::Command;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::error::ErrorResponse;
use super::{
    AuthError, CachedToken, Console, Credentials, IdpClient, ProviderError, ProviderErrorKind,
    TokenCache,
};
use crate::settings::Settings;

const DEFAULT_USER_AGENT: &str = "fedauth/0.1.0";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const WEB_SSO_TOKEN_TYPE: &str = "urn:okta:oauth:token-type:web_sso_token";
const DEVICE_SECRET_TOKEN_TYPE: &str = "urn:x-oath:params:oauth:token-type:device-secret";
const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const BASE_SCOPES: &[&str; 4] = &[
    "openid",
    "okta.apps.sso",
    "okta.apps.read",
    "okta.users.read.self",
];
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const EXPIRY_SKEW_SECS: i64 = 30;
const SLOW_DOWN_STEP: StdDuration = StdDuration::from_secs(5);
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Device authorization and token endpoints of the identity provider.
#[derive(Debug, Clone)]
pub struct DeviceEndpoints {
    pub device_authorization_url: Url,
    pub token_url: Url,
}

impl DeviceEndpoints {
    /// Okta org authorization server endpoints for `domain`.
    pub fn for_domain(domain: &str) -> Result<Self, AuthError> {
        let base = Url::parse(&format!("https://{}/", domain.trim_end_matches('/')))?;
        Ok(Self {
            device_authorization_url: base.join("oauth2/v1/device/authorize")?,
            token_url: base.join("oauth2/v1/token")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DeviceAuthorizationResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    verification_uri_complete: Option<String>,
    expires_in: u64,
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: Option<String>,
    device_secret: Option<String>,
    token_type: String,
    expires_in: Option<i64>,
    scope: Option<String>,
    issued_token_type: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry, or `None` when `expires_in` is absent or out of range.
    fn expires_at(&self, received_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let lifetime = Duration::try_seconds(self.expires_in?)?;
        received_at.checked_add_signed(lifetime)
    }

    fn into_cached_token(self, received_at: DateTime<Utc>) -> CachedToken {
        let expires_at = self.expires_at(received_at);
        let scope = self
            .scope
            .unwrap_or_default()
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect();
        CachedToken {
            access_token: self.access_token,
            id_token: self.id_token,
            device_secret: self.device_secret,
            token_type: self.token_type,
            expires_at,
            scope,
            created_at: received_at,
        }
    }
}

/// Runs the OAuth 2.0 device authorization grant and exchanges the result for credentials.
pub struct DeviceAuthClient<T> {
    http: Client,
    cache: Arc<T>,
    console: Arc<dyn Console>,
    endpoints: Option<DeviceEndpoints>,
}

impl<T> DeviceAuthClient<T>
where
    T: TokenCache + Send + Sync,
{
    pub fn new(cache: Arc<T>, console: Arc<dyn Console>) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            cache,
            console,
            endpoints: None,
        })
    }

    /// Use fixed endpoints instead of deriving them from the org domain.
    pub fn with_endpoints(mut self, endpoints: DeviceEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    fn endpoints(&self, settings: &Settings) -> Result<DeviceEndpoints, AuthError> {
        match &self.endpoints {
            Some(endpoints) => Ok(endpoints.clone()),
            None => DeviceEndpoints::for_domain(&settings.org_domain),
        }
    }

    async fn access_token(
        &self,
        settings: &Settings,
        endpoints: &DeviceEndpoints,
    ) -> Result<CachedToken, AuthError> {
        if settings.cache_access_token {
            let skew = Duration::seconds(EXPIRY_SKEW_SECS);
            match self.cache.load() {
                Ok(Some(token)) if !token.will_expire_within(skew) => {
                    tracing::debug!(profile = %settings.profile, "using cached access token");
                    return Ok(token);
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "ignoring unreadable token cache"),
            }
        }

        let authorization = self.authorize_device(settings, endpoints).await?;
        self.announce(settings, &authorization);
        let token = self
            .poll_for_token(settings, endpoints, &authorization)
            .await?;

        if settings.cache_access_token {
            self.cache.save(&token)?;
        }
        Ok(token)
    }

    async fn authorize_device(
        &self,
        settings: &Settings,
        endpoints: &DeviceEndpoints,
    ) -> Result<DeviceAuthorizationResponse, AuthError> {
        let mut scopes: Vec<&str> = BASE_SCOPES.to_vec();
        if settings.fed_app_id.is_some() {
            scopes.push("device_sso");
        }
        let scope = scopes.join(" ");
        let form = [
            ("client_id", settings.oidc_client_id.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(endpoints.device_authorization_url.clone())
            .form(&form)
            .send()
            .await?;
        read_response(response).await
    }

    fn announce(&self, settings: &Settings, authorization: &DeviceAuthorizationResponse) {
        let activation_url = authorization
            .verification_uri_complete
            .as_deref()
            .unwrap_or(&authorization.verification_uri);

        self.console.print(&format!(
            "Open the following URL to perform authentication with the Identity Provider:\n\n{activation_url}\n"
        ));
        if authorization.verification_uri_complete.is_none() {
            self.console
                .print(&format!("Enter the code: {}\n", authorization.user_code));
        }

        if settings.open_browser || settings.open_browser_command.is_some() {
            let command = settings.open_browser_command.as_deref();
            if let Err(err) = open_activation_url(activation_url, command) {
                self.console.print(&format!("WARNING: {err}"));
            }
        }
    }

    async fn poll_for_token(
        &self,
        settings: &Settings,
        endpoints: &DeviceEndpoints,
        authorization: &DeviceAuthorizationResponse,
    ) -> Result<CachedToken, AuthError> {
        let started = Instant::now();
        let deadline = StdDuration::from_secs(authorization.expires_in);
        let mut interval = StdDuration::from_secs(
            authorization
                .interval
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        );
        let form = [
            ("client_id", settings.oidc_client_id.as_str()),
            ("device_code", authorization.device_code.as_str()),
            ("grant_type", DEVICE_CODE_GRANT),
        ];

        loop {
            if started.elapsed() > deadline {
                return Err(AuthError::DeviceCodeExpired);
            }
            tokio::time::sleep(interval).await;

            let response = self
                .http
                .post(endpoints.token_url.clone())
                .form(&form)
                .send()
                .await?;
            let received_at = Utc::now();

            match read_response::<TokenResponse>(response).await {
                Ok(payload) => return Ok(payload.into_cached_token(received_at)),
                Err(AuthError::Provider(err)) => match err.kind {
                    ProviderErrorKind::AuthorizationPending => continue,
                    ProviderErrorKind::SlowDown => {
                        interval += SLOW_DOWN_STEP;
                        tracing::debug!(?interval, "provider asked to slow down polling");
                    }
                    ProviderErrorKind::ExpiredToken => return Err(AuthError::DeviceCodeExpired),
                    _ => return Err(err.into()),
                },
                Err(other) => return Err(other),
            }
        }
    }

    async fn exchange(
        &self,
        settings: &Settings,
        endpoints: &DeviceEndpoints,
        token: &CachedToken,
        fed_app_id: &str,
    ) -> Result<Credentials, AuthError> {
        let audience = format!("urn:okta:apps:{fed_app_id}");
        let mut form = vec![
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("client_id", settings.oidc_client_id.as_str()),
            ("requested_token_type", WEB_SSO_TOKEN_TYPE),
            ("audience", audience.as_str()),
        ];
        match &token.id_token {
            Some(id_token) => {
                form.push(("subject_token", id_token.as_str()));
                form.push(("subject_token_type", ID_TOKEN_TYPE));
            }
            None => {
                form.push(("subject_token", token.access_token.as_str()));
                form.push(("subject_token_type", ACCESS_TOKEN_TYPE));
            }
        }
        if let Some(secret) = &token.device_secret {
            form.push(("actor_token", secret.as_str()));
            form.push(("actor_token_type", DEVICE_SECRET_TOKEN_TYPE));
        }

        let response = self
            .http
            .post(endpoints.token_url.clone())
            .form(&form)
            .send()
            .await?;
        let received_at = Utc::now();
        let payload: TokenResponse = read_response(response).await?;

        Ok(Credentials {
            expires_at: payload.expires_at(received_at),
            issued_token_type: payload
                .issued_token_type
                .unwrap_or_else(|| WEB_SSO_TOKEN_TYPE.to_owned()),
            token: payload.access_token,
            fed_app_id: Some(fed_app_id.to_owned()),
            iam_idp_arn: settings.iam_idp_arn.clone(),
            all_profiles: settings.all_profiles,
        })
    }
}

impl<T> IdpClient for DeviceAuthClient<T>
where
    T: TokenCache + Send + Sync,
{
    async fn authenticate(&self, settings: &Settings) -> Result<Credentials, AuthError> {
        let endpoints = self.endpoints(settings)?;
        let token = self.access_token(settings, &endpoints).await?;

        match settings.fed_app_id.as_deref() {
            Some(app_id) => self.exchange(settings, &endpoints, &token, app_id).await,
            None => Ok(Credentials {
                issued_token_type: ACCESS_TOKEN_TYPE.to_owned(),
                expires_at: token.expires_at,
                token: token.access_token,
                fed_app_id: None,
                iam_idp_arn: settings.iam_idp_arn.clone(),
                all_profiles: settings.all_profiles,
            }),
        }
    }
}

/// Decode a success body, or classify the failure as a provider rejection when possible.
async fn read_response<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    if !status.is_client_error() {
        return Err(AuthError::TokenEndpoint { status, body });
    }
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(error) => Err(ProviderError::from(error).into()),
        Err(_) => Err(AuthError::TokenEndpoint { status, body }),
    }
}

fn open_activation_url(url: &str, command: Option<&str>) -> Result<(), AuthError> {
    match command {
        Some(command) => {
            let mut parts = command.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| AuthError::BrowserLaunch("empty browser command".into()))?;
            Command::new(program)
                .args(parts)
                .arg(url)
                .spawn()
                .map(|_| ())
                .map_err(|err| AuthError::BrowserLaunch(err.to_string()))
        }
        None => open::that(url).map_err(|err| AuthError::BrowserLaunch(err.to_string())),
    }
}
