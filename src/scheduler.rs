use crate::config::{EngineConfig, SchedulerConfig};
use crate::services::coordinator::CoordinatorService;
use crate::services::tactical::TacticalService;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Spawns and owns the three cadenced engine loops.
///
/// The strategic loop re-optimizes reorder policies when the latest run
/// has gone stale, the tactical loop emits replenishment decisions, and
/// the coordination loop supervises both tiers daily. Every loop
/// observes the same shutdown signal and exits at the next tick
/// boundary.
pub struct EngineScheduler {
    coordinator: CoordinatorService,
    tactical: TacticalService,
    scheduler: SchedulerConfig,
}

impl EngineScheduler {
    pub fn new(
        coordinator: CoordinatorService,
        tactical: TacticalService,
        config: &EngineConfig,
    ) -> Self {
        Self {
            coordinator,
            tactical,
            scheduler: config.scheduler.clone(),
        }
    }

    /// Starts the three loops and returns their join handles.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let (strategic_period, tactical_period, coordination_period) =
            loop_periods(&self.scheduler);

        info!(
            strategic_days = self.scheduler.strategic_interval_days,
            tactical_minutes = self.scheduler.tactical_interval_minutes,
            coordination_hours = self.scheduler.coordination_interval_hours,
            "Starting engine scheduler"
        );

        vec![
            tokio::spawn(run_strategic_loop(
                self.coordinator.clone(),
                strategic_period,
                shutdown.clone(),
            )),
            tokio::spawn(run_tactical_loop(
                self.tactical.clone(),
                tactical_period,
                shutdown.clone(),
            )),
            tokio::spawn(run_coordination_loop(
                self.coordinator.clone(),
                coordination_period,
                shutdown,
            )),
        ]
    }
}

fn loop_periods(scheduler: &SchedulerConfig) -> (Duration, Duration, Duration) {
    (
        Duration::from_secs(scheduler.strategic_interval_days as u64 * 24 * 60 * 60),
        Duration::from_secs(scheduler.tactical_interval_minutes as u64 * 60),
        Duration::from_secs(scheduler.coordination_interval_hours as u64 * 60 * 60),
    )
}

/// Periodic strategic re-optimization. The first tick fires
/// immediately, which re-runs a stale pass right after a restart; the
/// due check keeps fresh runs from repeating.
async fn run_strategic_loop(
    coordinator: CoordinatorService,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match coordinator.strategic_due().await {
                    Ok(true) => {
                        if let Err(e) = coordinator.run_strategic_pass().await {
                            error!(error = %e, "Strategic pass failed");
                        }
                    }
                    Ok(false) => debug!("Strategic optimization not due"),
                    Err(e) => error!(error = %e, "Could not determine strategic due state"),
                }
            }
            _ = shutdown.changed() => {
                info!("Strategic loop stopping");
                return;
            }
        }
    }
}

async fn run_tactical_loop(
    tactical: TacticalService,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tactical.run_cycle().await {
                    error!(error = %e, "Tactical cycle failed");
                }
            }
            _ = shutdown.changed() => {
                info!("Tactical loop stopping");
                return;
            }
        }
    }
}

async fn run_coordination_loop(
    coordinator: CoordinatorService,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The interval's first tick fires immediately; consume it so the
    // first coordination runs after a full period while the tier loops
    // cover startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = coordinator.run_cycle().await {
                    error!(error = %e, "Coordination cycle failed");
                }
            }
            _ = shutdown.changed() => {
                info!("Coordination loop stopping");
                return;
            }
        }
    }
}
