use std::sync::Arc;

use ledger_account::AccountEvent;
use ledger_api::Config;
use ledger_eventlog::RedisEventLog;
use ledger_projector::{AccountProjector, MongoViewStore};
use ledger_service::AccountService;

#[tokio::main]
async fn main() {
    ledger_observability::init();

    let config = Config::from_env();

    let log = Arc::new(
        RedisEventLog::<AccountEvent>::connect(&config.redis_url, config.read_interval)
            .await
            .expect("failed to connect to the event log"),
    );
    let service = Arc::new(AccountService::new(Arc::clone(&log), config.stream_name.clone()));

    let view = Arc::new(
        MongoViewStore::connect(
            &config.view_store_uri,
            &config.view_store_database,
            &config.view_store_collection,
        )
        .await
        .expect("failed to connect to the view store"),
    );
    let projector_log = Arc::new(
        RedisEventLog::<AccountEvent>::connect(&config.redis_url, config.projector_read_interval)
            .await
            .expect("failed to connect to the event log"),
    );
    let projector = AccountProjector::new(
        projector_log,
        view,
        config.stream_name.clone(),
        config.pending_interval,
    );
    let projector_handle = projector.connect().await.expect("failed to start projector");

    let app = ledger_api::app::build_app(service.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.listen_port))
        .await
        .expect("failed to bind listen port");

    tracing::info!(addr = %listener.local_addr().unwrap(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // §4.3/§4.4: both owners clean up their timers/connections on exit.
    if let Err(e) = projector.close(projector_handle).await {
        tracing::warn!(error = %e, "error closing projector");
    }
    if let Err(e) = service.close().await {
        tracing::warn!(error = %e, "error closing account service");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
