use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Method;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use ouroboros_offline::{
    ActivationController, DiskStore, FetchCoordinator, GenerationManager, HttpTransport,
    OfflineConfig, Request, RequestMode, ResourceStore,
};

#[derive(Parser)]
#[command(name = "ouroboros-offline")]
#[command(about = "Network-first resource cache with offline fallback", long_about = None)]
struct Cli {
    /// Deploy configuration (JSON). Falls back to OFFLINE_* environment variables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store directory (overrides the configuration)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the configured generation from its manifest and activate it
    Install,

    /// Fetch a URL through the cache
    Fetch {
        url: String,

        /// Treat as a top-level page load
        #[arg(long)]
        navigate: bool,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
    },

    /// List stored generations
    Generations,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ouroboros_offline=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => OfflineConfig::from_json_file(path)?,
        None => OfflineConfig::from_env()?,
    };
    let cache_dir = cli
        .cache_dir
        .clone()
        .or_else(|| config.cache_dir.clone())
        .unwrap_or_else(|| PathBuf::from(".offline-cache"));

    let store: Arc<dyn ResourceStore> = Arc::new(DiskStore::new(&cache_dir).await?);
    let generations = Arc::new(GenerationManager::restore(store.clone()).await?);
    let transport = Arc::new(HttpTransport::with_timeout(config.fetch_timeout())?);

    match cli.command {
        Commands::Install => {
            let controller =
                ActivationController::new(generations.clone(), transport, config.clone()).await;
            let report = controller
                .run()
                .await
                .with_context(|| format!("rolling out generation {}", config.generation_tag))?;

            if report.already_current {
                println!("Generation {} refreshed", report.tag);
            } else {
                println!(
                    "Generation {} active ({} stale generation(s) removed)",
                    report.tag, report.evicted
                );
            }
        }

        Commands::Fetch {
            url,
            navigate,
            method,
        } => {
            let url = Url::parse(&url).with_context(|| format!("invalid url: {}", url))?;
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .context("invalid method")?;

            let mut request = Request::new(method, url);
            if navigate {
                request.mode = RequestMode::Navigate;
            }

            let coordinator =
                FetchCoordinator::new(transport, generations, &config.offline_document_url()?);
            let response = coordinator.handle(&request).await;
            coordinator.flush_writes().await;

            eprintln!("{} {}", response.status, response.status_text);
            std::io::stdout().write_all(&response.body)?;
        }

        Commands::Generations => {
            let current = generations.current().await;
            for tag in store.generations().await? {
                let handle = store.open(&tag).await?;
                let marker = if current.as_deref() == Some(tag.as_str()) { "*" } else { " " };
                println!("{} {} ({} entries)", marker, tag, store.len(&handle).await?);
            }
        }
    }

    Ok(())
}
