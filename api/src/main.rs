use api::{app, state::AppState};
use migration::Migrator;
use sea_orm_migration::MigratorTrait;
use services::accounts::provision_from_csv;
use services::dispatch::{OutboxBroker, OutboxSettings};
use std::{net::SocketAddr, path::Path, process, sync::Arc};
use tracing::{error, info};
use util::{config::AppConfig, logging::init_logging};

#[tokio::main]
async fn main() {
    // Configuration problems are fatal before anything is served.
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

    if let Some(accounts_csv) = &config.accounts_csv {
        if let Err(e) = provision_from_csv(&db, Path::new(accounts_csv)).await {
            error!(error = %e, path = %accounts_csv, "Failed to provision accounts");
            process::exit(1);
        }
    }

    let broker = Arc::new(OutboxBroker::new(
        db.clone(),
        OutboxSettings::from_config(config),
    ));
    let app = app(AppState::new(db, broker));

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, host = %config.host, port = config.port, "Invalid listen address");
            process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %addr, "Failed to bind");
            process::exit(1);
        }
    };

    info!(
        "Starting {} ({}) on http://{}",
        config.project_name, config.env, addr
    );

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        error!(error = %e, "Server crashed");
        process::exit(1);
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
