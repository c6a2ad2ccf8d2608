//main.rs
use migration::Migrator;
use sea_orm_migration::MigratorTrait;
use services::archive::LocalArchiveStore;
use services::dispatch::{OutboxBroker, OutboxSettings};
use services::fetch::HttpFetcher;
use services::notify::SmtpNotifier;
use services::worker::{ProcessingWorker, WorkerSettings};
use std::{future::IntoFuture, net::SocketAddr, process, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use util::{config::AppConfig, logging::init_logging};
use worker::api::router;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let config = match AppConfig::init() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            process::exit(1);
        }
    };

    let _log_guard = init_logging(config);

    let db = match db::connect(&config.database_path).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, path = %config.database_path, "Failed to open database");
            process::exit(1);
        }
    };

    if let Err(e) = Migrator::up(&db, None).await {
        error!(error = %e, "Failed to apply migrations");
        process::exit(1);
    }

    let fetcher = match HttpFetcher::new() {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            process::exit(1);
        }
    };

    let notifier = match SmtpNotifier::from_config(config) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!(error = %e, "Failed to configure SMTP transport");
            process::exit(1);
        }
    };

    let processing = Arc::new(ProcessingWorker::new(
        db.clone(),
        Arc::new(fetcher),
        Arc::new(LocalArchiveStore::from_config(config)),
        Arc::new(notifier),
        WorkerSettings::from_config(config),
    ));

    let broker = Arc::new(OutboxBroker::new(db, OutboxSettings::from_config(config)));
    let cancel = CancellationToken::new();
    let consumer = Arc::clone(&broker).subscribe(processing, cancel.clone());

    let addr: SocketAddr = match format!("{}:{}", config.host, config.worker_port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, host = %config.host, port = config.worker_port, "Invalid listen address");
            process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %addr, "Failed to bind");
            process::exit(1);
        }
    };
    info!("Worker status on http://{}", addr);

    let shutdown = cancel.clone();
    let server = axum::serve(listener, router(Arc::clone(&broker)))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .into_future();

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "Status server crashed");
            }
        }
        _ = shutdown_signal() => {}
    }

    cancel.cancel();
    if let Err(e) = consumer.await {
        error!(error = %e, "Dispatch consumer task failed");
    }

    if broker.drain(DRAIN_TIMEOUT).await {
        info!("All in-flight deliveries finished");
    } else {
        // Unacknowledged messages become visible again once their lease expires.
        warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "Shutting down with deliveries still running");
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
