mod common;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use common::{
    create_product, drain_events, event_channel, seed_constant_demand, seed_demand_series,
    test_config, test_db,
};
use replenish_engine::entities::{demand_record, optimization_run, policy_parameters};
use replenish_engine::events::Event;
use replenish_engine::services::strategic::StrategicService;

#[tokio::test]
async fn thin_history_is_skipped_until_the_threshold() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, mut rx) = event_channel();
    let service = StrategicService::new(harness.pool.clone(), Some(sender), &config);

    let product = create_product(&harness.pool, "SKU-THIN", 3, 1, 1000, 2.0).await;
    seed_constant_demand(&harness.pool, product.id, 29, 10).await;

    // A forecast row must not count toward the observed history.
    demand_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        date: Set(Utc::now().date_naive() + chrono::Duration::days(1)),
        quantity_demanded: Set(10),
        quantity_fulfilled: Set(0),
        is_forecast: Set(true),
        ..Default::default()
    }
    .insert(&*harness.pool)
    .await
    .expect("insert forecast row");

    let outcome = service.optimize_product(product.id).await.expect("optimize");
    assert!(outcome.is_none());

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::StrategicRunSkipped { product_id, history_days }
            if *product_id == product.id && *history_days == 29
    )));

    let policies = policy_parameters::Entity::find()
        .filter(policy_parameters::Column::ProductId.eq(product.id))
        .all(&*harness.pool)
        .await
        .expect("query policies");
    assert!(policies.is_empty(), "a skipped run must not write a policy");

    // One more observed day reaches the 30-day threshold.
    demand_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        date: Set(Utc::now().date_naive()),
        quantity_demanded: Set(10),
        quantity_fulfilled: Set(10),
        is_forecast: Set(false),
        ..Default::default()
    }
    .insert(&*harness.pool)
    .await
    .expect("insert observed row");

    let outcome = service.optimize_product(product.id).await.expect("optimize");
    assert!(outcome.is_some());
}

#[tokio::test]
async fn optimization_activates_a_single_policy_version() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, mut rx) = event_channel();
    let service = StrategicService::new(harness.pool.clone(), Some(sender), &config);

    let product = create_product(&harness.pool, "SKU-OPT", 5, 10, 1000, 4.0).await;
    // 90 days averaging 20/day, peaking at 22.
    let series: Vec<i32> = (0..90).map(|i| 18 + (i % 5)).collect();
    seed_demand_series(&harness.pool, product.id, &series).await;

    let outcome = service
        .optimize_product(product.id)
        .await
        .expect("optimize")
        .expect("enough history");

    // The chosen triple stays inside the demand-scaled search box:
    // reorder point in [mean*lead/2, max*lead*2], order quantity under
    // supplier limits.
    assert!(outcome.reorder_point >= 50, "rop {}", outcome.reorder_point);
    assert!(outcome.reorder_point <= 220, "rop {}", outcome.reorder_point);
    assert!(outcome.safety_stock >= 0);
    assert!(outcome.safety_stock <= 600);
    assert!(outcome.order_quantity >= 10);
    assert!(outcome.order_quantity <= 1000);
    assert!(outcome.objective_value.is_finite());
    assert!((0.0..=1.0).contains(&outcome.service_level));
    assert!(outcome.iterations >= 2);
    assert!(outcome.execution_time_seconds >= 0.0);

    let policies = policy_parameters::Entity::find()
        .filter(policy_parameters::Column::ProductId.eq(product.id))
        .all(&*harness.pool)
        .await
        .expect("query policies");
    assert_eq!(policies.len(), 1);
    let policy = &policies[0];
    assert!(policy.is_active);
    assert_eq!(policy.id, outcome.policy_id);
    assert_eq!(policy.reorder_point, outcome.reorder_point);
    assert_eq!(policy.safety_stock, outcome.safety_stock);
    assert_eq!(policy.order_quantity, outcome.order_quantity);
    assert!(policy.gp_mean.is_some());

    let runs = optimization_run::Entity::find()
        .filter(optimization_run::Column::ProductId.eq(product.id))
        .all(&*harness.pool)
        .await
        .expect("query runs");
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.run_id, outcome.run_id);
    assert_eq!(run.method, "strategic");
    assert_eq!(run.convergence_iterations, Some(outcome.iterations as i32));
    assert_eq!(run.objective_value, Some(outcome.objective_value));

    let params: serde_json::Value =
        serde_json::from_str(run.parameters.as_deref().expect("parameters json"))
            .expect("valid parameters json");
    assert_eq!(params["demand_stats"]["days"], 90);
    assert_eq!(params["reorder_point"], outcome.reorder_point);

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::StrategicRunCompleted { run_id, .. } if *run_id == outcome.run_id
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ParametersActivated { policy_id, .. } if *policy_id == outcome.policy_id
    )));
}

#[tokio::test]
async fn reoptimization_retires_the_previous_version() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, _rx) = event_channel();
    let service = StrategicService::new(harness.pool.clone(), Some(sender), &config);

    let product = create_product(&harness.pool, "SKU-VERS", 4, 1, 2000, 3.0).await;
    seed_constant_demand(&harness.pool, product.id, 60, 15).await;

    let first = service
        .optimize_product(product.id)
        .await
        .expect("optimize")
        .expect("outcome");
    let second = service
        .optimize_product(product.id)
        .await
        .expect("optimize")
        .expect("outcome");
    assert_ne!(first.policy_id, second.policy_id);

    let all = policy_parameters::Entity::find()
        .filter(policy_parameters::Column::ProductId.eq(product.id))
        .all(&*harness.pool)
        .await
        .expect("query policies");
    assert_eq!(all.len(), 2, "history rows are kept, not overwritten");

    let active: Vec<_> = all.iter().filter(|p| p.is_active).collect();
    assert_eq!(active.len(), 1, "exactly one live version per product");
    assert_eq!(active[0].id, second.policy_id);

    let current = service
        .active_parameters(product.id)
        .await
        .expect("query active")
        .expect("active version");
    assert_eq!(current.id, second.policy_id);
}

#[tokio::test]
async fn fixed_seed_reproduces_the_search() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, _rx) = event_channel();
    let service = StrategicService::new(harness.pool.clone(), Some(sender), &config);

    let product = create_product(&harness.pool, "SKU-SEED", 3, 1, 1500, 2.5).await;
    let series: Vec<i32> = (0..60).map(|i| 12 + (i % 7)).collect();
    seed_demand_series(&harness.pool, product.id, &series).await;

    let first = service
        .optimize_product(product.id)
        .await
        .expect("optimize")
        .expect("outcome");

    // Clear the activated version so the second run warm-starts from
    // the same cold state.
    policy_parameters::Entity::delete_many()
        .filter(policy_parameters::Column::ProductId.eq(product.id))
        .exec(&*harness.pool)
        .await
        .expect("clear policies");

    let second = service
        .optimize_product(product.id)
        .await
        .expect("optimize")
        .expect("outcome");

    assert_eq!(first.reorder_point, second.reorder_point);
    assert_eq!(first.safety_stock, second.safety_stock);
    assert_eq!(first.order_quantity, second.order_quantity);
    assert_eq!(first.objective_value, second.objective_value);
    assert_eq!(first.iterations, second.iterations);
}

#[tokio::test]
async fn zero_demand_yields_a_minimal_policy() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, _rx) = event_channel();
    let service = StrategicService::new(harness.pool.clone(), Some(sender), &config);

    let product = create_product(&harness.pool, "SKU-IDLE", 4, 5, 500, 1.0).await;
    seed_constant_demand(&harness.pool, product.id, 40, 0).await;

    let outcome = service
        .optimize_product(product.id)
        .await
        .expect("optimize")
        .expect("outcome");

    // Nothing to cover, so the search box collapses to the floor: no
    // reorder point, no safety stock, the supplier minimum as the lot.
    assert_eq!(outcome.reorder_point, 0);
    assert_eq!(outcome.safety_stock, 0);
    assert_eq!(outcome.order_quantity, 5);
    assert_eq!(outcome.service_level, 1.0);
    assert!(outcome.constraints_satisfied);
}

#[tokio::test]
async fn fleet_pass_isolates_thin_history_products() {
    let harness = test_db().await;
    let config = test_config();
    let (sender, _rx) = event_channel();
    let service = StrategicService::new(harness.pool.clone(), Some(sender), &config);

    let ready = create_product(&harness.pool, "SKU-READY", 3, 1, 1000, 2.0).await;
    seed_constant_demand(&harness.pool, ready.id, 45, 12).await;

    let thin = create_product(&harness.pool, "SKU-NEW", 3, 1, 1000, 2.0).await;
    seed_constant_demand(&harness.pool, thin.id, 5, 12).await;

    let summary = service.optimize_all_products().await.expect("fleet pass");
    assert_eq!(summary.products_total, 2);
    assert_eq!(summary.optimized, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    assert!(service
        .active_parameters(ready.id)
        .await
        .expect("query")
        .is_some());
    assert!(service
        .active_parameters(thin.id)
        .await
        .expect("query")
        .is_none());
}
