use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;

use super::{AuthError, Console, Credentials, ProviderErrorKind, TokenCache};
use crate::settings::Settings;

/// Hard cap on identity provider calls per run.
pub const MAX_ATTEMPTS: u8 = 2;

/// Printed when a stale cached token was removed and the run is about to retry.
pub const RETRY_NOTICE: &str =
    "Cached access token appears to be stale, removing token and retrying device authorization ...\n";

/// Identity provider operations needed to turn settings into credentials.
pub trait IdpClient {
    /// Run one complete device authorization and credential exchange.
    ///
    /// A grant the provider rejects as stale, expired or revoked must surface as
    /// `AuthError::Provider` with `ProviderErrorKind::InvalidGrant`.
    fn authenticate(
        &self,
        settings: &Settings,
    ) -> impl Future<Output = Result<Credentials, AuthError>> + Send;
}

/// Printed when the provider still rejects the grant and no retry is left.
pub const TERMINAL_NOTICE: &str =
    "The identity provider rejected the grant and the cached access token could not be recovered.\n";

/// One pass through the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AuthAttempt {
    number: u8,
}

impl AuthAttempt {
    fn first() -> Self {
        Self { number: 1 }
    }

    fn next(self) -> Self {
        Self {
            number: self.number + 1,
        }
    }
}

enum RunState {
    FirstAttempt(AuthAttempt),
    Retrying(AuthAttempt),
    Succeeded(Credentials),
    FailedTerminal { attempt: AuthAttempt, error: AuthError },
}

/// Drives authentication attempts and recovers once from a stale cached token.
pub struct AuthOrchestrator<C, T> {
    idp: C,
    cache: Arc<T>,
    console: Arc<dyn Console>,
}

impl<C, T> AuthOrchestrator<C, T>
where
    C: IdpClient + Sync,
    T: TokenCache + Send + Sync,
{
    pub fn new(idp: C, cache: Arc<T>, console: Arc<dyn Console>) -> Self {
        Self {
            idp,
            cache,
            console,
        }
    }

    pub async fn run(&self, settings: &Settings) -> Result<Credentials, AuthError> {
        settings.validate()?;

        let mut state = RunState::FirstAttempt(AuthAttempt::first());
        loop {
            state = match state {
                RunState::FirstAttempt(attempt) | RunState::Retrying(attempt) => {
                    self.attempt(settings, attempt).await
                }
                RunState::Succeeded(credentials) => return Ok(credentials),
                RunState::FailedTerminal { attempt, error } => {
                    return Err(self.terminal(attempt, error))
                }
            };
        }
    }

    async fn attempt(&self, settings: &Settings, attempt: AuthAttempt) -> RunState {
        let span = tracing::info_span!("auth_attempt", attempt = attempt.number);
        let result = self.idp.authenticate(settings).instrument(span).await;

        match result {
            Ok(credentials) => {
                tracing::info!(attempt = attempt.number, "authentication succeeded");
                RunState::Succeeded(credentials)
            }
            Err(error) => self.after_failure(attempt, error),
        }
    }

    fn after_failure(&self, attempt: AuthAttempt, error: AuthError) -> RunState {
        tracing::debug!(attempt = attempt.number, error = %error, "authentication attempt failed");

        // The cap is checked first so the cache is cleared at most once per run.
        if attempt.number < MAX_ATTEMPTS && error.is_invalid_grant() && self.cache.invalidate() {
            self.console.print(RETRY_NOTICE);
            return RunState::Retrying(attempt.next());
        }
        RunState::FailedTerminal { attempt, error }
    }

    fn terminal(&self, attempt: AuthAttempt, error: AuthError) -> AuthError {
        match error {
            AuthError::Provider(source) if source.kind == ProviderErrorKind::InvalidGrant => {
                // The returned error carries the remediation text itself.
                self.console.print(TERMINAL_NOTICE);
                AuthError::GrantRejected {
                    attempts: attempt.number,
                    source,
                }
            }
            other => other,
        }
    }
}
