mod console;
mod device;
mod error;
mod orchestrator;
mod token;
mod token_cache;

pub use console::{Console, StderrConsole};
pub use device::{DeviceAuthClient, DeviceEndpoints};
pub use error::{AuthError, ProviderError, ProviderErrorKind, REMEDIATION_GUIDANCE};
pub use orchestrator::{AuthOrchestrator, IdpClient, MAX_ATTEMPTS, RETRY_NOTICE, TERMINAL_NOTICE};
pub use token::{CachedToken, Credentials};
pub use token_cache::{FileTokenCache, TokenCache};
