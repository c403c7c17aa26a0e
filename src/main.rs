use clap::Parser;
use dotenvy::dotenv;
use media_backup::config::BackupConfig;
use media_backup::infrastructure::{database, storage};
use media_backup::models::MediaCategory;
use media_backup::services::backup_operation::{
    BackupOperation, RemoteBackupOperation, StorageBackupOperation,
};
use media_backup::services::backup_driver::CategoryLocks;
use media_backup::services::backup_runner::run_categories;
use media_backup::services::media_repository::MediaRepository;
use media_backup::services::source_fetcher::HttpSourceFetcher;
use media_backup::services::url_resolver::{HttpProber, UrlResolver};
use media_backup::services::worker::BackupWorker;
use media_backup::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run (api, worker, once, all)
    #[arg(short, long, default_value = "all")]
    mode: String,

    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Restrict backup runs to one category (image, regular, upscale)
    #[arg(short, long)]
    category: Option<MediaCategory>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_backup=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !matches!(args.mode.as_str(), "api" | "worker" | "once" | "all") {
        anyhow::bail!("Unknown mode '{}', expected api, worker, once or all", args.mode);
    }

    info!("🚀 Starting media backup [Mode: {}]...", args.mode);

    // 2. Setup Common Infrastructure
    let config = BackupConfig::from_env();
    info!(
        "🗄️  Backup Config: image={}x{}, regular={}x{}, upscale={}x{}, probe timeout={:?}",
        config.image.batch_size,
        config.image.max_batches,
        config.video.batch_size,
        config.video.max_batches,
        config.upscaled_video.batch_size,
        config.upscaled_video.max_batches,
        config.probe_timeout
    );

    let db = database::setup_database().await?;
    let storage_service = storage::setup_storage().await?;

    let local_operation: Arc<dyn BackupOperation> = Arc::new(StorageBackupOperation::new(
        MediaRepository::new(db.clone()),
        Arc::new(HttpSourceFetcher::new(config.download_timeout)?),
        storage_service.clone(),
        config.retry_cooldown,
    ));

    // Runs go through the remote endpoint when one is configured
    let run_operation: Arc<dyn BackupOperation> = match &config.operation_url {
        Some(url) => {
            info!("🌐 Using remote backup operation at {}", url);
            Arc::new(RemoteBackupOperation::new(
                url.clone(),
                config.download_timeout,
            )?)
        }
        None => local_operation.clone(),
    };

    let categories: Vec<MediaCategory> = match args.category {
        Some(category) => vec![category],
        None => MediaCategory::ALL.to_vec(),
    };

    // Serializes runs per category across the worker and the API
    let locks = CategoryLocks::new();

    // 3. One-shot run: drain the backlog and exit
    if args.mode == "once" {
        let summaries = run_categories(run_operation, &config, &categories, &locks, None).await;
        for summary in &summaries {
            info!(
                "📊 {}: {} backed up, {} failed, {} batches ({:?})",
                summary.category,
                summary.total_backed_up,
                summary.total_failed,
                summary.batches_executed,
                summary.stop_reason
            );
        }
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    // 4. Setup Graceful Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = Vec::new();

    // 5. Initialize Worker Service
    if args.mode == "worker" || args.mode == "all" {
        let worker = BackupWorker::new(
            run_operation.clone(),
            config.clone(),
            categories.clone(),
            locks.clone(),
            shutdown_rx.clone(),
        );
        handles.push(tokio::spawn(async move {
            worker.run().await;
        }));
        info!("👷 Worker service initialized.");
    }

    // 6. Initialize API Service
    if args.mode == "api" || args.mode == "all" {
        let resolver = Arc::new(UrlResolver::new(Arc::new(HttpProber::new(
            config.probe_timeout,
        )?)));

        let state = AppState {
            db: db.clone(),
            storage: storage_service.clone(),
            backup_operation: local_operation.clone(),
            resolver,
            config: config.clone(),
            locks: locks.clone(),
            shutdown: shutdown_rx.clone(),
        };

        let app = create_app(state);
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
        info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

        let mut server_shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.wait_for(|stop| *stop).await;
                })
                .await
            {
                error!("❌ Server runtime error: {}", e);
            }
        }));
    }

    // 7. Wait for Shutdown Signal
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    info!("🛑 Shutting down backup services...");
    for handle in handles {
        let _ = handle.await;
    }

    info!("👋 Media backup exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
