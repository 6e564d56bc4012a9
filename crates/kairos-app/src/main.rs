use std::sync::Arc;

use kairos_app::adapters::{HttpDirectory, HttpLedger};
use kairos_app::config::load_config;
use kairos_app::events::{EVENT_BUFFER, spawn_event_logger};
use kairos_db::db::connection::create_pool;
use kairos_db::db::migrate::run_migrations;
use kairos_db::store::PgStore;
use kairos_service::clock::SystemClock;
use kairos_service::context::EngineContext;
use kairos_service::notify::BroadcastBus;
use kairos_service::pass::MaterializationPass;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting kairos materialization pass");

    let config = load_config()?;

    tracing::info!(engine = ?config.engine, "Configuration loaded");

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping debug");
    }

    run_migrations(&config.database.url).await?;

    let pool = create_pool(&config.database, config.engine.worker_concurrency).await?;

    let bus = Arc::new(BroadcastBus::new(EVENT_BUFFER));
    let logger = spawn_event_logger(bus.subscribe());

    let ctx = EngineContext {
        store: Arc::new(PgStore::new(pool)),
        ledger: Arc::new(HttpLedger::new(config.ledger.clone())?),
        bus: bus.clone(),
        directory: Arc::new(HttpDirectory::new(config.directory.clone())?),
        clock: Arc::new(SystemClock),
        settings: config.engine,
    };
    let pass = MaterializationPass::new(ctx);
    let report = pass.run().await?;

    for failure in &report.failures {
        tracing::error!(group_id = %failure.group_id, error = %failure.error, "Group failed");
    }

    // Closing the bus lets the logger drain and stop.
    drop(pass);
    drop(bus);
    let notifications = logger.await?;
    tracing::info!(
        groups = report.groups,
        advanced = report.advanced,
        expanded = report.expanded,
        notifications,
        "Pass complete"
    );

    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} of {} groups failed to materialize",
            report.failures.len(),
            report.groups
        );
    }
    Ok(())
}
