use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use database::IngestDatabase;
use reddit_client::{Reddit, SearchMode};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod ingest;

#[derive(Debug, Parser)]
#[command(name = "redwrap", version, about = "Reddit keyword ingest")]
struct Cli {
    /// SQLite file holding clients, searches and ingested comments
    #[arg(long, env = "REDWRAP_DB", default_value = "redwrap.db")]
    db: PathBuf,

    /// Client used when a command names none
    #[arg(long, env = "REDWRAP_DEFAULT_CLIENT")]
    default_client: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a standing keyword search for a client
    Register {
        search_term: String,
        #[arg(long)]
        client: Option<String>,
    },
    /// Run every registered search once
    Poll {
        /// praw.ini section with the bot's credentials
        #[arg(long, env = "REDWRAP_ACCOUNT")]
        account: String,
        /// Key prefix inside the praw.ini section
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
        /// auto, primary or beta
        #[arg(long, default_value = "auto")]
        search_mode: SearchMode,
        /// Log writes instead of sending them
        #[arg(long)]
        no_post: bool,
    },
    /// Copy the database into a timestamped file
    Backup {
        #[arg(long, default_value = "backups")]
        folder: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("redwrap=info,reddit_client=info,database=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut db = IngestDatabase::new(&cli.db, cli.default_client)
        .await
        .with_context(|| format!("opening database {}", cli.db.display()))?;

    match cli.command {
        Command::Register {
            search_term,
            client,
        } => {
            db.register_search(&search_term, client.as_deref())
                .await
                .context("registering search")?;
            info!("Registered search: {:?} : {}", client, search_term);
        }
        Command::Poll {
            account,
            prefix,
            user_agent,
            search_mode,
            no_post,
        } => {
            let mut reddit = Reddit::connect(&account, no_post, prefix.as_deref(), user_agent)
                .await
                .with_context(|| format!("connecting as {account}"))?;
            reddit.search_client_mut().set_mode(search_mode);

            ingest::poll_searches(&mut reddit, &db, chrono::Utc::now())
                .await
                .context("polling searches")?;
        }
        Command::Backup { folder } => {
            let destination = db
                .backup(&folder)
                .await
                .with_context(|| format!("backing up to {}", folder.display()))?;
            info!("Backup written to {}", destination.display());
        }
    }

    db.close().await;
    Ok(())
}
