use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fedauth_core::auth::{
    AuthError, AuthOrchestrator, Console, Credentials, DeviceAuthClient, FileTokenCache,
    StderrConsole, TokenCache,
};
use fedauth_core::config::{ConfigLocator, FileConfig};
use fedauth_core::settings::{Settings, DEFAULT_PROFILE};

#[derive(Parser, Debug)]
#[command(author, version, about = "Federated cloud credentials via device authorization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Human oriented authentication and device authorization
    Web(WebArgs),
    /// Remove the cached access token for a profile
    Logout(LogoutArgs),
}

#[derive(Args, Debug, Default)]
struct WebArgs {
    /// Identity provider org domain (e.g. example.okta.com)
    #[arg(long = "org-domain", short = 'o', env = "OKTA_ORG_DOMAIN")]
    org_domain: Option<String>,
    /// OIDC native application client id
    #[arg(long = "oidc-client-id", short = 'c', env = "OKTA_OIDC_CLIENT_ID")]
    oidc_client_id: Option<String>,
    /// AWS Account Federation app id
    #[arg(
        long = "aws-acct-fed-app-id",
        short = 'a',
        env = "OKTA_AWS_ACCOUNT_FEDERATION_APP_ID"
    )]
    aws_acct_fed_app_id: Option<String>,
    /// Preset IAM Identity Provider ARN
    #[arg(long = "aws-iam-idp", short = 'i', env = "OKTA_AWSCLI_IAM_IDP")]
    aws_iam_idp: Option<String>,
    /// Automatically open the activation URL with the system web browser
    #[arg(long = "open-browser", short = 'b', env = "OKTA_AWSCLI_OPEN_BROWSER")]
    open_browser: bool,
    /// Automatically open the activation URL with the given web browser command
    #[arg(
        long = "open-browser-command",
        short = 'm',
        env = "OKTA_AWSCLI_OPEN_BROWSER_COMMAND"
    )]
    open_browser_command: Option<String>,
    /// Collect all profiles for a given IdP
    #[arg(long = "all-profiles", short = 'k', env = "OKTA_AWSCLI_ALL_PROFILES")]
    all_profiles: bool,
    /// Cache the access token between runs
    #[arg(long = "cache-access-token", env = "OKTA_AWSCLI_CACHE_ACCESS_TOKEN")]
    cache_access_token: bool,
    /// Profile name for the cached access token
    #[arg(long, env = "OKTA_AWSCLI_PROFILE")]
    profile: Option<String>,
}

#[derive(Args, Debug)]
struct LogoutArgs {
    /// Profile name for the cached access token
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Web(args) => web(args).await?,
        Commands::Logout(args) => logout(args)?,
    }
    Ok(())
}

async fn web(args: WebArgs) -> Result<()> {
    let console: Arc<dyn Console> = Arc::new(StderrConsole);
    let locator = ConfigLocator::new().context("unable to initialise configuration directory")?;

    let file_config = match locator.load_file_config() {
        Ok(config) => config,
        Err(err) => {
            console.print(&format!(
                "WARNING: issue with {} file, it will be ignored.\nError: {err}\n",
                locator.config_file().display()
            ));
            None
        }
    };

    let settings = resolve_settings(args, file_config.unwrap_or_default());
    settings.validate()?;

    let cache = Arc::new(FileTokenCache::new(locator, settings.profile.clone()));
    let idp = DeviceAuthClient::new(cache.clone(), console.clone())
        .context("failed to build identity provider client")?;
    let orchestrator = AuthOrchestrator::new(idp, cache, console);

    let credentials =
        until_interrupted(orchestrator.run(&settings), tokio::signal::ctrl_c()).await?;

    println!("{}", serde_json::to_string_pretty(&credentials)?);
    Ok(())
}

/// Race a run against an interrupt. A failed signal registration never cancels the run.
async fn until_interrupted<R, I>(run: R, interrupt: I) -> Result<Credentials, AuthError>
where
    R: Future<Output = Result<Credentials, AuthError>>,
    I: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = run => result,
        Ok(()) = interrupt => Err(AuthError::Cancelled),
    }
}

fn logout(args: LogoutArgs) -> Result<()> {
    let cache = FileTokenCache::with_default_locator(args.profile.as_str())
        .context("unable to initialise token cache")?;
    if cache.invalidate() {
        println!("Removed cached access token for profile '{}'.", args.profile);
    } else {
        println!("No cached access token for profile '{}'.", args.profile);
    }
    Ok(())
}

/// Merge flags and env vars (already folded together by clap) over the config file.
fn resolve_settings(args: WebArgs, file: FileConfig) -> Settings {
    let org_domain = args.org_domain.or(file.org_domain).unwrap_or_default();
    let client_id = args
        .oidc_client_id
        .or(file.oidc_client_id)
        .unwrap_or_default();

    let mut settings = Settings::new(org_domain.trim(), client_id.trim());
    settings.fed_app_id = args.aws_acct_fed_app_id.or(file.aws_acct_fed_app_id);
    settings.iam_idp_arn = args.aws_iam_idp.or(file.aws_iam_idp);
    settings.open_browser = args.open_browser;
    settings.open_browser_command = args.open_browser_command.or(file.open_browser_command);
    settings.all_profiles = args.all_profiles;
    settings.cache_access_token = args.cache_access_token;
    match args.profile.or(file.profile) {
        Some(profile) => settings.with_profile(profile),
        None => settings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedauth_core::config::ConfigError;

    #[test]
    fn flags_override_config_file() {
        let args = WebArgs {
            org_domain: Some("flag.okta.com".into()),
            ..Default::default()
        };
        let file = FileConfig {
            org_domain: Some("file.okta.com".into()),
            oidc_client_id: Some("0oa-file".into()),
            ..Default::default()
        };
        let settings = resolve_settings(args, file);
        assert_eq!(settings.org_domain, "flag.okta.com");
        assert_eq!(settings.oidc_client_id, "0oa-file");
        assert_eq!(settings.profile, DEFAULT_PROFILE);
    }

    #[test]
    fn missing_client_id_fails_validation() {
        let args = WebArgs {
            org_domain: Some("example.okta.com".into()),
            ..Default::default()
        };
        let err = resolve_settings(args, FileConfig::default())
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("oidc-client-id")));
    }

    #[test]
    fn cli_parses_web_flags() {
        let cli = Cli::parse_from([
            "fedauth",
            "web",
            "--org-domain",
            "example.okta.com",
            "--oidc-client-id",
            "0oa1",
            "-a",
            "0oa-aws",
            "--cache-access-token",
        ]);
        match cli.command {
            Commands::Web(args) => {
                let settings = resolve_settings(args, FileConfig::default());
                assert!(settings.validate().is_ok());
                assert_eq!(settings.fed_app_id.as_deref(), Some("0oa-aws"));
                assert!(settings.cache_access_token);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    fn sample_credentials() -> Credentials {
        Credentials {
            token: "web-sso".into(),
            issued_token_type: "urn:okta:oauth:token-type:web_sso_token".into(),
            expires_at: None,
            fed_app_id: None,
            iam_idp_arn: None,
            all_profiles: false,
        }
    }

    #[tokio::test]
    async fn failed_signal_registration_does_not_cancel() {
        let run = async { Ok::<_, AuthError>(sample_credentials()) };
        let interrupt = async { Err::<(), _>(std::io::Error::other("signal handler unavailable")) };
        let credentials = until_interrupted(run, interrupt).await.unwrap();
        assert_eq!(credentials.token, "web-sso");
    }

    #[tokio::test]
    async fn interrupt_cancels_pending_run() {
        let run = std::future::pending::<Result<Credentials, AuthError>>();
        let err = until_interrupted(run, async { Ok::<(), std::io::Error>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Cancelled));
    }

    #[test]
    fn profile_from_config_file_is_used() {
        let file = FileConfig {
            profile: Some("work".into()),
            ..Default::default()
        };
        let settings = resolve_settings(WebArgs::default(), file);
        assert_eq!(settings.profile, "work");
    }
}
