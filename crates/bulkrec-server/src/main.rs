//! Bulkrec Server - Main entry point

use anyhow::{Context, Result};
use bulkrec_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use bulkrec_server::{
    api::{self, AppState},
    apply::{ApplyService, PgCanonicalStore},
    config::Config,
    db,
    ingest::{
        ApplyInvoker, ApplyMode, ChunkStore, HttpApplyInvoker, InProcessApplyInvoker,
        IngestPipeline, MemoryChunkStore, StagingBackend, StagingSweeper,
    },
    storage::{config::StorageConfigRedacted, Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("bulkrec-server")
        .filter_directives("bulkrec_server=debug,tower_http=debug,sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting bulkrec server");

    let config = Config::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        apply_mode = ?config.pipeline.apply_mode,
        staging_backend = ?config.pipeline.staging_backend,
        chunk_size = config.pipeline.chunk_size,
        "Configuration loaded"
    );

    let db_pool = match &config.database {
        Some(db_config) => {
            let pool = db::create_pool(db_config).await?;
            db::run_migrations(&pool).await?;
            Some(pool)
        },
        None => {
            info!("DATABASE_URL not set, apply endpoint disabled");
            None
        },
    };

    let staging: Arc<dyn ChunkStore> = match config.pipeline.staging_backend {
        StagingBackend::S3 => {
            info!(storage = ?StorageConfigRedacted(&config.storage), "Using S3 staging");
            Arc::new(Storage::new(config.storage.clone()).await?)
        },
        StagingBackend::Memory => {
            info!("Using in-memory staging");
            Arc::new(MemoryChunkStore::new())
        },
    };

    let apply_service = db_pool.as_ref().map(|pool| {
        let records = Arc::new(PgCanonicalStore::new(
            pool.clone(),
            config.pipeline.apply_batch_size,
        ));
        Arc::new(ApplyService::new(staging.clone(), records))
    });

    let invoker: Arc<dyn ApplyInvoker> = match config.pipeline.apply_mode {
        ApplyMode::Remote => {
            let url = config
                .pipeline
                .apply_url
                .clone()
                .context("INGEST_APPLY_URL is required for remote apply")?;
            info!(%url, "Chunks will be applied remotely");
            Arc::new(HttpApplyInvoker::new(url, config.pipeline.apply_timeout())?)
        },
        ApplyMode::Inline => {
            let service = apply_service
                .clone()
                .context("Inline apply requires DATABASE_URL")?;
            info!("Chunks will be applied in-process");
            Arc::new(InProcessApplyInvoker::new(service, config.pipeline.apply_timeout()))
        },
    };

    let shutdown = CancellationToken::new();

    let sweeper = StagingSweeper::new(staging.clone(), &config.pipeline, shutdown.clone());
    let sweeper_handle = sweeper.start();

    let pipeline = Arc::new(IngestPipeline::new(
        config.pipeline.clone(),
        staging,
        invoker,
        shutdown.clone(),
    ));

    let state = AppState {
        pipeline,
        apply: apply_service,
        db: db_pool,
    };
    let app = api::router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            shutdown.clone(),
            config.server.shutdown_timeout_secs,
        ))
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper_handle.await {
        tracing::warn!("Staging sweeper did not stop cleanly: {}", e);
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel running jobs
async fn shutdown_signal(shutdown: CancellationToken, timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Running jobs stop at their next chunk boundary
    shutdown.cancel();

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
