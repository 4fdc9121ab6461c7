use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use feedimg::application::FeedImagesUseCase;
use feedimg::infrastructure::{
    AppConfig, CliArgs, DiskImageCache, HttpImageFetcher, ImageLoader, StorageManager,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = feedimg::VERSION, "Starting feedimg");

    let disk_cache = Arc::new(
        DiskImageCache::new(config.effective_cache_dir(), config.reclaim_policy()).await?,
    );
    let fetcher = Arc::new(HttpImageFetcher::new(
        config.network.timeout(),
        &config.network.user_agent,
    )?);
    let loader = Arc::new(ImageLoader::new(
        config.loader_config(),
        disk_cache.clone(),
        fetcher,
    ));
    let feed = FeedImagesUseCase::new(loader.clone(), disk_cache.clone());

    let reclaim = feed.startup();
    if args.reclaim_only {
        let report = reclaim.await?;
        info!(%report, "Reclamation finished");
        return Ok(());
    }

    if args.urls.is_empty() {
        warn!("No URLs given, nothing to prefetch");
    } else {
        let warmed = match config.default_priority {
            feedimg::domain::FetchPriority::Background => feed.prefetch(&args.urls).await,
            priority => loader
                .load_many(&args.urls, priority)
                .await
                .map_or(0, |images| images.len()),
        };
        let stats = loader.memory_cache_stats();
        info!(
            warmed,
            requested = args.urls.len(),
            %stats,
            "Prefetch finished"
        );
    }

    let report = reclaim.await?;
    let usage = disk_cache.usage().await;
    info!(
        %report,
        files = usage.files,
        bytes = usage.bytes,
        "Disk cache state"
    );

    Ok(())
}
