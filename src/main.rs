use std::sync::Arc;

use stadium_incidents::alerts::{AlertManager, EscalationScheduler, NotificationRouter, ResponderDirectory};
use stadium_incidents::api::{self, AppState};
use stadium_incidents::config::AppConfig;
use stadium_incidents::db::{self, IncidentStore, PgIncidentStore};
use stadium_incidents::hub::{self, ConnectionRegistry};
use stadium_incidents::kafka;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Stadium Incident Service...");

    // Init DB
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    info!("Connected to database");
    let store: Arc<dyn IncidentStore> = Arc::new(PgIncidentStore::new(pool));

    // Core services
    let registry = ConnectionRegistry::new();
    let directory = Arc::new(ResponderDirectory::new(store.clone()));
    directory.hydrate().await?;
    let router = NotificationRouter::new(store.clone(), registry.clone(), directory.clone());
    let manager = AlertManager::new(store, router);
    let scheduler = EscalationScheduler::new(manager.clone());

    let shutdown = CancellationToken::new();

    // Background sweeps
    tokio::spawn(hub::run_liveness_sweep(
        registry.clone(),
        config.liveness_interval(),
        shutdown.clone(),
    ));
    tokio::spawn(scheduler.run(config.escalation_interval(), shutdown.clone()));

    // Start Kafka
    if config.kafka_enabled {
        let kafka_config = config.clone();
        let kafka_manager = manager.clone();
        let kafka_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) =
                kafka::start_report_consumer(&kafka_config, kafka_manager, kafka_shutdown).await
            {
                error!("Kafka consumer exited: {}", e);
            }
        });
    } else {
        info!("Kafka ingestion disabled");
    }

    // HTTP + WebSocket
    let state = AppState {
        manager,
        registry: registry.clone(),
        directory,
        outbound_buffer: config.outbound_buffer,
    };
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);

    let signal = shutdown.clone();
    let closing = registry.clone();
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            signal.cancel();
            // Open sockets would otherwise hold the server past the signal.
            closing.shutdown();
        })
        .await?;

    shutdown.cancel();
    info!("Stadium Incident Service stopped");

    Ok(())
}
