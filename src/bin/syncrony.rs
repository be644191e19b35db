//! syncrony CLI: campaign for a lock, or inspect and edit keys

use clap::{Parser, Subcommand};
use futures_util::{pin_mut, StreamExt};
use std::path::PathBuf;
use syncrony::store::{Precondition, Wait};
use syncrony::{Client, Config, Election};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "syncrony")]
#[command(about = "Leader election over an etcd-style key-value store")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Store endpoints (comma-separated), overriding the config
    #[arg(long, value_delimiter = ',')]
    endpoints: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take part in an election until interrupted
    Campaign {
        /// Lock path
        #[arg(long)]
        path: Option<String>,

        /// Identifier written into the lock (random if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Lease in seconds
        #[arg(long)]
        ttl: Option<u64>,

        /// Renewal interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Read a key
    Get {
        path: String,
    },

    /// Write a key
    Set {
        path: String,
        value: String,

        /// Lease in seconds
        #[arg(long)]
        ttl: Option<u64>,

        /// Require the key to exist (true) or not exist (false)
        #[arg(long, conflicts_with_all = ["prev_value", "prev_index"])]
        prev_exist: Option<bool>,

        /// Require the key's current value
        #[arg(long, conflicts_with = "prev_index")]
        prev_value: Option<String>,

        /// Require the key's current modification index
        #[arg(long)]
        prev_index: Option<u64>,
    },

    /// Delete a key
    Delete {
        path: String,

        /// Require the key's current value
        #[arg(long, conflicts_with = "prev_index")]
        prev_value: Option<String>,

        /// Require the key's current modification index
        #[arg(long)]
        prev_index: Option<u64>,
    },

    /// Print every change to a key
    Watch {
        path: String,
    },
}

fn precondition(
    prev_exist: Option<bool>,
    prev_value: Option<String>,
    prev_index: Option<u64>,
) -> Option<Precondition> {
    match (prev_exist, prev_value, prev_index) {
        (Some(true), _, _) => Some(Precondition::Present),
        (Some(false), _, _) => Some(Precondition::Absent),
        (None, Some(value), _) => Some(Precondition::Value(value)),
        (None, None, Some(index)) => Some(Precondition::Index(index)),
        (None, None, None) => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if !cli.endpoints.is_empty() {
        config.store.endpoints = cli.endpoints;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let client = Client::new(&config.store)?;

    match cli.command {
        Commands::Campaign {
            path,
            id,
            ttl,
            interval_ms,
        } => {
            let mut election_config = config.election.clone();
            if let Some(path) = path {
                election_config.path = path;
            }
            if id.is_some() {
                election_config.identifier = id;
            }
            if let Some(ttl) = ttl {
                election_config.ttl_secs = ttl;
            }
            if let Some(interval_ms) = interval_ms {
                election_config.interval_ms = interval_ms;
            }

            let election = Election::new(client, election_config)?;
            tracing::info!(
                "Campaigning for {} as {}",
                election.path(),
                election.identifier()
            );
            election.run();

            let mut changes = election.subscribe();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let leading = *changes.borrow_and_update();
                        println!("{}", if leading { "leader" } else { "follower" });
                    }
                }
            }

            tracing::info!("Stepping down");
            election.cancel().await?;
        }

        Commands::Get { path } => {
            let response = client.get(&path, Wait::No).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Set {
            path,
            value,
            ttl,
            prev_exist,
            prev_value,
            prev_index,
        } => {
            let response = client
                .set(
                    &path,
                    Some(value.as_str()),
                    precondition(prev_exist, prev_value, prev_index),
                    ttl,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Delete {
            path,
            prev_value,
            prev_index,
        } => {
            let response = client
                .delete(&path, precondition(None, prev_value, prev_index))
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Watch { path } => {
            let events = client.watch(&path);
            pin_mut!(events);
            while let Some(event) = events.next().await {
                let event = event?;
                println!(
                    "{} {} {}",
                    event.modified_index(),
                    event.action,
                    event.value().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}
