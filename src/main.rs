use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snooze::channel::{AwsChannel, ChannelBackend};
use snooze::config::{RepositoryConfig, load_config};
use snooze::github::GitHubClient;
use snooze::provision::{Channel, provision_repository};
use snooze::webhooks::{SnoozeHandler, SnoozePolicy};
use snooze::worker::{PollConfig, RepositoryListener, Supervisor};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "SNOOZE_LOG";

#[derive(Parser)]
#[command(name = "snooze", version, about = "Clear snooze labels on GitHub activity")]
struct Cli {
    /// Do not long-poll; return from each receive immediately.
    #[arg(long, global = true)]
    no_wait: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Shorthand: `snooze <CONFIG>` (same as `snooze listen <CONFIG>`).
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision every repository, then listen until interrupted.
    Listen {
        /// Path to the TOML configuration file.
        config: PathBuf,
    },
    /// Provision every repository and exit.
    Provision {
        /// Path to the TOML configuration file.
        config: PathBuf,
    },
    /// Validate the configuration and list the repositories it names.
    CheckConfig {
        /// Path to the TOML configuration file.
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| "snooze=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Listen { config }) => listen(&config, !cli.no_wait).await,
        Some(Commands::Provision { config }) => {
            provision_all(&load(&config)?).await?;
            Ok(())
        }
        Some(Commands::CheckConfig { config }) => check_config(&config),
        None => match cli.config {
            Some(config) => listen(&config, !cli.no_wait).await,
            None => anyhow::bail!("no configuration file given; see `snooze --help`"),
        },
    }
}

fn load(path: &Path) -> Result<Vec<RepositoryConfig>> {
    load_config(path).with_context(|| format!("loading configuration from {}", path.display()))
}

fn check_config(path: &Path) -> Result<()> {
    for repo in load(path)? {
        println!(
            "{}\tlabel={:?}\tevents={}\texempt={}",
            repo.repo,
            repo.snooze_label,
            repo.events,
            repo.exempt_org.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// A repository wired up and ready to listen.
struct Provisioned {
    config: RepositoryConfig,
    channel: Channel,
    github: GitHubClient,
    backend: Arc<dyn ChannelBackend>,
}

/// Provisions every repository, stopping at the first failure.
async fn provision_all(configs: &[RepositoryConfig]) -> Result<Vec<Provisioned>> {
    let mut provisioned = Vec::with_capacity(configs.len());
    for config in configs {
        let github = GitHubClient::new(&config.github)
            .with_context(|| format!("creating GitHub client for {}", config.repo))?;
        let backend: Arc<dyn ChannelBackend> = Arc::new(
            AwsChannel::new(&config.aws)
                .with_context(|| format!("creating AWS client for {}", config.repo))?,
        );
        let channel = provision_repository(backend.as_ref(), &github, config)
            .await
            .with_context(|| format!("provisioning {}", config.repo))?;

        provisioned.push(Provisioned {
            config: config.clone(),
            channel,
            github,
            backend,
        });
    }
    Ok(provisioned)
}

async fn listen(path: &Path, long_poll: bool) -> Result<()> {
    let configs = load(path)?;
    let provisioned = provision_all(&configs).await?;

    let shutdown = CancellationToken::new();
    let mut supervisor = Supervisor::new(shutdown.clone());
    for repo in provisioned {
        let mut listener = RepositoryListener::for_channel(&repo.channel, repo.backend);
        listener.register(Arc::new(SnoozeHandler::new(
            repo.github,
            SnoozePolicy::from_config(&repo.config),
        )));
        supervisor.spawn(listener, PollConfig::from_config(&repo.config, long_poll));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after current polls");
            shutdown.cancel();
        }
    });

    info!(repositories = configs.len(), long_poll, "Listening");
    supervisor.run().await.context("listener stopped")?;
    info!("Shut down cleanly");
    Ok(())
}
