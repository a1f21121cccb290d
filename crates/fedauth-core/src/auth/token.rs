use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Access token obtained from a completed device authorization, as kept in the cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    pub id_token: Option<String>,
    pub device_secret: Option<String>,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Vec<String>,
    #[serde(default = "default_created_at")]
    pub created_at: DateTime<Utc>,
}

fn default_created_at() -> DateTime<Utc> {
    Utc::now()
}

impl CachedToken {
    pub fn new_bearer(access_token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token,
            id_token: None,
            device_secret: None,
            token_type: "Bearer".into(),
            expires_at,
            scope: vec![],
            created_at: Utc::now(),
        }
    }

    pub fn will_expire_within(&self, window: Duration) -> bool {
        match self.expires_at {
            Some(ts) => Utc::now() + window >= ts,
            None => false,
        }
    }
}

/// Short-lived credential bundle handed to the caller once authentication succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub issued_token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fed_app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iam_idp_arn: Option<String>,
    #[serde(default)]
    pub all_profiles: bool,
}
