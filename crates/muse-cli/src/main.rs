//! MUSE CLI - Command-line interface
//!
//! Usage:
//!   muse user add --username <name> --password <password>
//!   muse user remove --username <name>
//!   muse user list
//!   muse revoked prune
//!   muse tokenize --username <name> --password <password> <sentence>...
//!   muse embed --username <name> --password <password> <sentence>...

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use muse_api::auth::password::PasswordConfig;
use muse_api::auth::repository::{connect, migrate};
use muse_api::auth::{RepositoryError, RevocationStore, RevokedTokenRepository, UserRepository};
use muse_client::MuseClient;
use muse_core::AppConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "muse")]
#[command(about = "MUSE tokenize/embed service CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to $MUSE_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the credential store
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Maintain the revocation store
    Revoked {
        #[command(subcommand)]
        action: RevokedAction,
    },
    /// Tokenize sentences through a running server
    Tokenize(RemoteArgs),
    /// Embed sentences through a running server
    Embed(RemoteArgs),
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Delete a user
    Remove {
        #[arg(long)]
        username: String,
    },
    /// List usernames
    List,
}

#[derive(Subcommand)]
enum RevokedAction {
    /// Delete records whose token has already expired
    Prune,
    /// Show the number of stored records
    Count,
}

#[derive(Args)]
struct RemoteArgs {
    /// Server base URL
    #[arg(long, default_value = "http://localhost:5000")]
    url: String,
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Sentences to process
    #[arg(required = true)]
    sentences: Vec<String>,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::load()?,
    };
    tracing::debug!(database = %config.database.url, "Configuration loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::User { action } => {
            let config = load_config(cli.config)?;
            let pool = connect(&config.database).await?;
            migrate(&pool).await?;
            let users = UserRepository::new(pool);

            match action {
                UserAction::Add { username, password } => {
                    match users
                        .create_user(&username, &password, &PasswordConfig::default())
                        .await
                    {
                        Ok(user) => {
                            tracing::info!(username = %user.username, user_id = user.id, "User created");
                            println!("Created user '{}' (id {})", user.username, user.id)
                        }
                        Err(RepositoryError::UsernameAlreadyExists) => {
                            anyhow::bail!("User '{}' already exists", username)
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                UserAction::Remove { username } => match users.delete_user(&username).await {
                    Ok(()) => {
                        tracing::info!(username = %username, "User removed");
                        println!("Removed user '{}'", username)
                    }
                    Err(RepositoryError::UserNotFound) => {
                        anyhow::bail!("User '{}' does not exist", username)
                    }
                    Err(e) => return Err(e.into()),
                },
                UserAction::List => {
                    for name in users.list_usernames().await? {
                        println!("{}", name);
                    }
                }
            }
        }
        Commands::Revoked { action } => {
            let config = load_config(cli.config)?;
            let pool = connect(&config.database).await?;
            migrate(&pool).await?;
            let revocations = RevokedTokenRepository::new(pool);

            match action {
                RevokedAction::Prune => {
                    let removed = revocations.prune_expired(chrono::Utc::now()).await?;
                    tracing::info!(removed, "Revocation records pruned");
                    println!("Pruned {} expired revocation record(s)", removed);
                }
                RevokedAction::Count => {
                    println!("{}", revocations.count().await?);
                }
            }
        }
        Commands::Tokenize(args) => {
            let client = remote_session(&args).await?;
            let tokens = client.tokenize(&sentence_refs(&args)).await?;
            println!("{}", serde_json::to_string_pretty(&tokens)?);
            client.logout().await?;
        }
        Commands::Embed(args) => {
            let client = remote_session(&args).await?;
            let embedding = client.embed(&sentence_refs(&args)).await?;
            println!("{}", serde_json::to_string(&embedding)?);
            client.logout().await?;
        }
    }

    Ok(())
}

async fn remote_session(args: &RemoteArgs) -> anyhow::Result<MuseClient> {
    let client = MuseClient::with_timeout(&args.url, Duration::from_secs(args.timeout))?;
    tracing::debug!(url = %args.url, username = %args.username, "Logging in");
    client
        .login(&args.username, &args.password)
        .await
        .with_context(|| format!("Login to {} failed", args.url))?;
    Ok(client)
}

fn sentence_refs(args: &RemoteArgs) -> Vec<&str> {
    args.sentences.iter().map(String::as_str).collect()
}
