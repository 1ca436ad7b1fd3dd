use std::sync::Arc;

use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use replenish_engine as engine;

use engine::services::coordinator::CoordinatorService;
use engine::services::strategic::StrategicService;
use engine::services::tactical::TacticalService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = engine::config::load_config()?;
    engine::config::init_tracing(cfg.log_level(), cfg.log_json);

    info!(
        environment = %cfg.environment,
        "Starting replenish-engine {}",
        env!("CARGO_PKG_VERSION")
    );

    // Init DB
    let db_pool = engine::db::establish_connection_from_config(&cfg).await?;
    if cfg.auto_migrate {
        engine::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(engine::events::EventSender::new(event_tx));
    tokio::spawn(engine::events::process_events(event_rx));

    // Build the optimization tiers and their supervisor
    let strategic = StrategicService::new(db_arc.clone(), Some(event_sender.clone()), &cfg);
    let tactical = TacticalService::new(db_arc.clone(), Some(event_sender.clone()), &cfg);
    let coordinator = CoordinatorService::new(
        db_arc.clone(),
        Some(event_sender.clone()),
        strategic,
        tactical.clone(),
        &cfg,
    );

    match coordinator.system_status().await {
        Ok(status) => info!(
            products = status.product_count,
            active_policies = status.active_policy_count,
            actions_last_24h = status.actions_last_24h,
            "Engine state at startup"
        ),
        Err(e) => warn!(error = %e, "Could not read engine state at startup"),
    }

    // Start the cadenced loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = engine::scheduler::EngineScheduler::new(coordinator, tactical, &cfg);
    let handles = scheduler.start(shutdown_rx);

    shutdown_signal().await;
    info!("Shutdown signal received, stopping engine loops");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Engine loop ended abnormally");
        }
    }
    drop(scheduler);

    match Arc::try_unwrap(db_arc) {
        Ok(pool) => engine::db::close_pool(pool).await?,
        Err(_) => warn!("Database pool still referenced at shutdown, skipping explicit close"),
    }

    info!("Engine stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
