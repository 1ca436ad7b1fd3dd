mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend as DbBackend, EntityTrait,
    QueryFilter, Set, Statement,
};
use tokio::sync::watch;
use uuid::Uuid;

use common::{
    activate_policy, create_product, drain_events, event_channel, insert_metric,
    insert_order_action, record_inventory, seed_demand_series, test_config, test_db,
};
use replenish_engine::config::EngineConfig;
use replenish_engine::db::DbPool;
use replenish_engine::entities::{optimization_run, performance_metric};
use replenish_engine::events::{Event, EventSender};
use replenish_engine::scheduler::EngineScheduler;
use replenish_engine::services::coordinator::{
    CoordinatorService, METRIC_COORD_CYCLE_DURATION, METRIC_COORD_INCONSISTENCY,
    METRIC_COORD_SERVICE_LEVEL,
};
use replenish_engine::services::strategic::StrategicService;
use replenish_engine::services::tactical::TacticalService;

fn build_coordinator(
    pool: Arc<DbPool>,
    sender: Arc<EventSender>,
    config: &EngineConfig,
) -> CoordinatorService {
    let strategic = StrategicService::new(pool.clone(), Some(sender.clone()), config);
    let tactical = TacticalService::new(pool.clone(), Some(sender.clone()), config);
    CoordinatorService::new(pool, Some(sender), strategic, tactical, config)
}

#[tokio::test]
async fn consistency_check_flags_large_deviations() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, mut rx) = event_channel();
    let coordinator = build_coordinator(harness.pool.clone(), sender, &config);

    // Ordering at twice the strategic lot size is a 100% deviation.
    let drifted = create_product(&harness.pool, "SKU-DRIFT", 2, 1, 1000, 2.0).await;
    activate_policy(&harness.pool, drifted.id, 30, 10, 20).await;
    insert_order_action(&harness.pool, drifted.id, 40).await;
    insert_order_action(&harness.pool, drifted.id, 40).await;
    insert_order_action(&harness.pool, drifted.id, 40).await;

    // 25% off stays under the threshold.
    let aligned = create_product(&harness.pool, "SKU-ALIGN", 2, 1, 1000, 2.0).await;
    activate_policy(&harness.pool, aligned.id, 30, 10, 20).await;
    insert_order_action(&harness.pool, aligned.id, 25).await;

    // No recent orders leaves nothing to compare.
    let quiet = create_product(&harness.pool, "SKU-QUIET", 2, 1, 1000, 2.0).await;
    activate_policy(&harness.pool, quiet.id, 30, 10, 20).await;

    let issues = coordinator
        .validate_consistency()
        .await
        .expect("consistency check");
    assert_eq!(issues.len(), 1);
    let issue = &issues[0];
    assert_eq!(issue.product_id, drifted.id);
    assert!((issue.tactical_average_quantity - 40.0).abs() < 1e-9);
    assert!((issue.strategic_order_quantity - 20.0).abs() < 1e-9);
    assert!((issue.deviation - 1.0).abs() < 1e-9);

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ConsistencyDeviation { product_id, .. } if *product_id == drifted.id
    )));
}

#[tokio::test]
async fn aggregation_averages_the_trailing_window() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, _rx) = event_channel();
    let coordinator = build_coordinator(harness.pool.clone(), sender, &config);

    insert_metric(&harness.pool, "tactical_average_service_level", 0.9, "service").await;
    insert_metric(&harness.pool, "tactical_average_service_level", 0.8, "service").await;
    insert_metric(&harness.pool, "tactical_total_cost", 120.0, "cost").await;
    insert_metric(&harness.pool, "tactical_products_processed", 5.0, "efficiency").await;

    let summary = coordinator
        .aggregate_performance()
        .await
        .expect("aggregation");
    assert_eq!(summary.metrics_considered, 4);

    let service = summary.average_service_level.expect("service average");
    assert!((service - 0.85).abs() < 1e-9);
    let cost = summary.average_cycle_cost.expect("cost average");
    assert!((cost - 120.0).abs() < 1e-9);
    let efficiency = summary.cost_efficiency.expect("efficiency score");
    assert!((efficiency - 0.838).abs() < 1e-9);
}

#[tokio::test]
async fn empty_window_aggregates_to_nothing() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, _rx) = event_channel();
    let coordinator = build_coordinator(harness.pool.clone(), sender, &config);

    let summary = coordinator
        .aggregate_performance()
        .await
        .expect("aggregation");
    assert_eq!(summary.metrics_considered, 0);
    assert!(summary.average_service_level.is_none());
    assert!(summary.average_cycle_cost.is_none());
    assert!(summary.cost_efficiency.is_none());
}

#[tokio::test]
async fn coordination_cycle_supervises_both_tiers() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, mut rx) = event_channel();
    let coordinator = build_coordinator(harness.pool.clone(), sender, &config);

    let product = create_product(&harness.pool, "SKU-FULL", 3, 5, 800, 3.0).await;
    let series: Vec<i32> = (0..60).map(|i| 14 + (i % 5)).collect();
    seed_demand_series(&harness.pool, product.id, &series).await;
    record_inventory(&harness.pool, product.id, 12, 0, 0).await;

    let report = coordinator.run_cycle().await.expect("coordination cycle");

    // No prior strategic run, so the pass was due and optimized the
    // one product; the tactical cycle then ordered against its policy.
    let strategic = report.strategic.expect("strategic pass ran");
    assert_eq!(strategic.products_total, 1);
    assert_eq!(strategic.optimized, 1);
    assert_eq!(strategic.failed, 0);

    let tactical = report.tactical.expect("tactical cycle ran");
    assert_eq!(tactical.products_processed, 1);
    assert_eq!(tactical.actions_taken, 1);
    assert_eq!(tactical.errors, 0);

    assert!(report.performance.metrics_considered >= 6);
    assert!(report.performance.average_service_level.is_some());
    assert!(report.duration_seconds >= 0.0);
    assert!(report.started_at <= Utc::now());

    for name in [
        METRIC_COORD_INCONSISTENCY,
        METRIC_COORD_CYCLE_DURATION,
        METRIC_COORD_SERVICE_LEVEL,
    ] {
        let rows = performance_metric::Entity::find()
            .filter(performance_metric::Column::MetricName.eq(name))
            .all(&*harness.pool)
            .await
            .expect("query metrics");
        assert_eq!(rows.len(), 1, "expected one {} row", name);
    }

    let events = drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ReplenishmentOrdered { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::CoordinationCompleted { .. })));

    // The strategic pass just ran, so the next cycle skips it.
    let second = coordinator.run_cycle().await.expect("coordination cycle");
    assert!(second.strategic.is_none());
    assert!(second.tactical.is_some());
}

#[tokio::test]
async fn strategic_cadence_follows_the_latest_run() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, _rx) = event_channel();
    let coordinator = build_coordinator(harness.pool.clone(), sender, &config);

    assert!(coordinator.strategic_due().await.expect("due check"));

    optimization_run::ActiveModel {
        run_id: Set(Uuid::new_v4()),
        product_id: Set(None),
        method: Set("strategic".to_string()),
        constraints_satisfied: Set(true),
        ..Default::default()
    }
    .insert(&*harness.pool)
    .await
    .expect("insert run");

    assert!(!coordinator.strategic_due().await.expect("due check"));

    // Age the run past the weekly interval.
    let stamp = (Utc::now() - Duration::days(8))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    harness
        .pool
        .execute(Statement::from_string(
            DbBackend::Sqlite,
            format!(
                "UPDATE optimization_runs SET created_at = '{}' WHERE method = 'strategic'",
                stamp
            ),
        ))
        .await
        .expect("backdate run");

    assert!(coordinator.strategic_due().await.expect("due check"));
}

#[tokio::test]
async fn system_status_counts_live_rows() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, _rx) = event_channel();
    let coordinator = build_coordinator(harness.pool.clone(), sender, &config);

    let product = create_product(&harness.pool, "SKU-STAT", 2, 1, 1000, 2.0).await;
    activate_policy(&harness.pool, product.id, 30, 10, 20).await;
    insert_order_action(&harness.pool, product.id, 10).await;

    let status = coordinator.system_status().await.expect("status");
    assert_eq!(status.product_count, 1);
    assert_eq!(status.active_policy_count, 1);
    assert_eq!(status.actions_last_24h, 1);
    assert!(status.last_strategic_run.is_none());
    assert!(status.last_tactical_run.is_none());
    assert_eq!(status.tracked_agents, 0);
}

#[tokio::test]
async fn scheduler_loops_stop_on_shutdown() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, _rx) = event_channel();

    let strategic = StrategicService::new(harness.pool.clone(), Some(sender.clone()), &config);
    let tactical = TacticalService::new(harness.pool.clone(), Some(sender.clone()), &config);
    let coordinator = CoordinatorService::new(
        harness.pool.clone(),
        Some(sender),
        strategic,
        tactical.clone(),
        &config,
    );
    let scheduler = EngineScheduler::new(coordinator, tactical, &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = scheduler.start(shutdown_rx);
    assert_eq!(handles.len(), 3);

    // Let the immediate first ticks run against the empty database.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    shutdown_tx.send(true).expect("signal shutdown");

    for handle in handles {
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("loop exits after shutdown")
            .expect("loop does not panic");
    }
}
