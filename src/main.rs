//! cachectl - inspect and maintain persisted storefront caches
//!
//! Operates on the same file-backed slots the data layer writes, using the
//! same environment configuration.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_cache::{Config, HttpApi, ListParams, Resource, ResourceAccessor};

#[derive(Parser, Debug)]
#[command(name = "cachectl", version, about = "Inspect and maintain persisted storefront caches")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print entry counts, expired entries and persisted size
    Stats { slot: String },
    /// Print a cached value if it is still live
    Get { slot: String, key: String },
    /// Remove every entry whose key starts with PREFIX
    Invalidate { slot: String, prefix: String },
    /// Remove every entry
    Clear { slot: String },
    /// Fetch a resource listing through the cache (slot = resource name)
    List {
        resource: String,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
}

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Open the requested cache slot and run the subcommand
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_cache=info,cachectl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.validate()?;
    info!(
        "Configuration loaded: ttl={}ms, storage_dir={}, api={}",
        config.cache_ttl_ms,
        config.storage_dir.display(),
        config.api_base_url
    );

    match cli.command {
        Command::Stats { slot } => {
            let cache = config.open_cache(&slot);
            println!("{}", serde_json::to_string_pretty(&cache.stats())?);
        }
        Command::Get { slot, key } => {
            let mut cache = config.open_cache(&slot);
            match cache.get(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("no live entry for '{}' in slot '{}'", key, slot),
            }
        }
        Command::Invalidate { slot, prefix } => {
            let removed = config.open_cache(&slot).invalidate(&prefix);
            println!("removed {} entries", removed);
        }
        Command::Clear { slot } => {
            config.open_cache(&slot).clear();
            println!("cleared '{}'", slot);
        }
        Command::List {
            resource,
            page,
            limit,
            search,
            category,
            status,
        } => {
            let resource = Resource::new(resource)?;
            let cache = config.open_cache(resource.name()).into_shared();
            let api = HttpApi::from_config(&config).context("building HTTP client")?;
            let accessor = ResourceAccessor::new(resource, cache, Arc::new(api));

            let params = ListParams {
                page,
                limit,
                search,
                category,
                status,
                ..ListParams::default()
            };
            let listing = accessor.get_all(&params).await?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
    }

    Ok(())
}
