use crate::{
    api::{self, AuthConfig, AuthState},
    confirmation::ConfirmationService,
    directory::{PgProjectDirectory, ProjectDirectory, StaticProjectDirectory},
    flow::AuthFlow,
    identity::{IdentityStore, MemoryIdentityStore, PgIdentityStore},
    mail::{HttpMailer, LogMailer, MailSender, Mailer},
    notifier::HttpTenantNotifier,
    session::MemorySessionStore,
    token::{SigningSecret, TokenIssuer},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub projects_file: Option<PathBuf>,
    pub public_base_url: String,
    pub jwt_secret_env: String,
    pub token_ttl_minutes: u64,
    pub confirmation_ttl_seconds: u64,
    pub session_ttl_seconds: u64,
    pub tenant_timeout_seconds: u64,
    pub mail_relay_url: Option<String>,
    pub mail_relay_token: Option<SecretString>,
    pub mail_from: String,
    pub mail_from_name: String,
    pub mail_timeout_seconds: u64,
}

type Stores = (Arc<dyn ProjectDirectory>, Arc<dyn IdentityStore>, Option<PgPool>);

/// Execute the server action.
/// # Errors
/// Returns an error if the signing secret is missing, the stores cannot be
/// opened, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let secret = SigningSecret::Env(args.jwt_secret_env.clone());
    secret.current().with_context(|| {
        format!(
            "signing secret environment variable {} is not set",
            args.jwt_secret_env
        )
    })?;

    let confirmation_ttl = Duration::from_secs(args.confirmation_ttl_seconds);
    let (directory, identity, pool) = open_stores(&args, confirmation_ttl).await?;

    let mailer = build_mailer(&args)?;
    let notifier = HttpTenantNotifier::new(Duration::from_secs(args.tenant_timeout_seconds))
        .context("Failed to build tenant HTTP client")?;

    let confirmation =
        ConfirmationService::new(identity.clone(), mailer, args.public_base_url.clone());
    let flow = AuthFlow::new(
        directory,
        identity,
        TokenIssuer::new(secret, args.token_ttl_minutes),
        confirmation,
        Arc::new(notifier),
    );

    let config = AuthConfig::new(&args.public_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds);
    let sessions = Arc::new(MemorySessionStore::new(config.session_ttl()));
    let auth_state = Arc::new(AuthState::new(flow, sessions, config));

    api::new(args.port, auth_state, pool).await
}

async fn open_stores(args: &Args, confirmation_ttl: Duration) -> Result<Stores> {
    if let Some(dsn) = &args.dsn {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        info!("Using PostgreSQL stores");

        let directory: Arc<dyn ProjectDirectory> =
            Arc::new(PgProjectDirectory::new(pool.clone()));
        let identity: Arc<dyn IdentityStore> =
            Arc::new(PgIdentityStore::new(pool.clone(), confirmation_ttl));
        return Ok((directory, identity, Some(pool)));
    }

    let path = args
        .projects_file
        .as_deref()
        .context("missing required argument: --projects-file")?;
    let directory = StaticProjectDirectory::from_file(path)?;

    info!(
        projects = directory.len(),
        "Using in-memory stores, accounts are lost on restart"
    );

    let directory: Arc<dyn ProjectDirectory> = Arc::new(directory);
    let identity: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new(confirmation_ttl));
    Ok((directory, identity, None))
}

fn build_mailer(args: &Args) -> Result<Arc<dyn Mailer>> {
    match &args.mail_relay_url {
        Some(url) => {
            let sender = MailSender {
                email: args.mail_from.clone(),
                name: args.mail_from_name.clone(),
            };
            let mailer = HttpMailer::new(
                url.clone(),
                args.mail_relay_token.clone(),
                sender,
                Duration::from_secs(args.mail_timeout_seconds),
            )
            .context("Failed to build mail relay client")?;
            Ok(Arc::new(mailer))
        }
        None => {
            warn!("No mail relay configured, confirmation links are only logged");
            Ok(Arc::new(LogMailer))
        }
    }
}
