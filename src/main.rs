use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vinyl_recs::{
    config::Config,
    db::{self, Cache, CacheWriterHandle, PgStore},
    routes::{create_router, AppState},
    services::{
        catalog::{CatalogClient, SpotifyCatalog},
        catalog_search::CatalogSearch,
        recommendations::{PipelineSettings, PipelineStores, RecommendationPipeline},
        scheduler::Scheduler,
    },
};

#[derive(Parser)]
#[command(name = "vinyl-recs")]
#[command(about = "Album recommendation pipeline for the vinyl review service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the operator HTTP server
    Serve,
    /// Run the pipeline once and print the summary as JSON
    RunOnce,
    /// Import every album of the best-matching artist
    ImportArtist {
        /// Artist name to search for
        name: String,
    },
    /// Show a stored album by name, importing the catalog's best match if needed
    ImportAlbum {
        /// Album name to search for
        name: String,
    },
    /// List a user's recommended albums
    Show {
        user_id: i64,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

/// Everything the subcommands share
struct Services {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<PgStore>,
    pipeline: Arc<RecommendationPipeline>,
    cache_writer: Option<CacheWriterHandle>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vinyl_recs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn build_services(config: &Config) -> anyhow::Result<Services> {
    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database ready");

    let (cache, cache_writer) = match &config.redis_url {
        Some(redis_url) => {
            let client = db::create_redis_client(redis_url)?;
            let (cache, handle) = Cache::new(client).await;
            tracing::info!("Catalog response cache enabled");
            (cache, Some(handle))
        }
        None => {
            tracing::info!("REDIS_URL not set, catalog response cache disabled");
            (Cache::disabled(), None)
        }
    };

    let catalog: Arc<dyn CatalogClient> = Arc::new(SpotifyCatalog::from_config(config, cache)?);
    let store = Arc::new(PgStore::new(pool));

    let pipeline = Arc::new(RecommendationPipeline::new(
        catalog.clone(),
        PipelineStores {
            ratings: store.clone(),
            albums: store.clone(),
            recommendations: store.clone(),
        },
        PipelineSettings::from(config),
    ));

    Ok(Services {
        catalog,
        store,
        pipeline,
        cache_writer,
    })
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

async fn serve(config: &Config, services: &Services) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let scheduler = Scheduler::new(
        services.pipeline.clone(),
        config.schedule_interval(),
        config.run_on_startup,
        shutdown.clone(),
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    let app = create_router(AppState::new(services.pipeline.clone(), shutdown.clone()));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Operator server listening");

    tokio::spawn(shutdown_signal(shutdown.clone()));

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    scheduler_task.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let services = build_services(&config).await?;

    let result = match cli.command {
        Commands::Serve => serve(&config, &services).await,
        Commands::RunOnce => {
            let shutdown = CancellationToken::new();
            tokio::spawn(shutdown_signal(shutdown.clone()));

            let summary = services.pipeline.run_once(shutdown).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::ImportArtist { name } => {
            let search = CatalogSearch::new(services.catalog.clone(), services.store.clone());
            let report = search.import_artist_albums(&name).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::ImportAlbum { name } => {
            let search = CatalogSearch::new(services.catalog.clone(), services.store.clone());
            let album = search.find_or_import_album(&name).await?;
            println!("{}", serde_json::to_string_pretty(&album)?);
            Ok(())
        }
        Commands::Show { user_id, limit } => {
            let albums = services
                .pipeline
                .sink()
                .recommendations_for(user_id, limit)
                .await?;
            println!("{}", serde_json::to_string_pretty(&albums)?);
            Ok(())
        }
    };

    if let Some(handle) = services.cache_writer {
        handle.shutdown().await;
    }

    result
}
