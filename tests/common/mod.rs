#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use replenish_engine::{
    config::EngineConfig,
    db::{establish_connection_with_config, run_migrations, DbConfig, DbPool},
    entities::{
        demand_record, inventory_action, inventory_level, performance_metric, policy_parameters,
        product,
    },
    events::{Event, EventSender},
};

/// Integration harness backed by a SQLite file in a temporary
/// directory. Keep it alive for the duration of the test; dropping it
/// removes the database.
pub struct TestDb {
    pub pool: Arc<DbPool>,
    _dir: TempDir,
}

pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("replenish-test.db").display()
    );
    // A single connection keeps SQLite writes serialized under the
    // async pool.
    let config = DbConfig {
        url,
        max_connections: 1,
        ..DbConfig::default()
    };
    let pool = establish_connection_with_config(&config)
        .await
        .expect("failed to open test database");
    run_migrations(&pool).await.expect("failed to run migrations");

    TestDb {
        pool: Arc::new(pool),
        _dir: dir,
    }
}

/// Engine configuration tuned for fast, reproducible tests: a fixed
/// seed, a small strategic search, and greedy tactical action selection.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.random_seed = Some(7);
    config.strategic.max_iterations = 12;
    config.strategic.n_candidates = 8;
    config.tactical.exploration_rate = 0.0;
    config
}

/// Bounded event channel sized well above anything a single test emits.
pub fn event_channel() -> (Arc<EventSender>, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(128);
    (Arc::new(EventSender::new(tx)), rx)
}

/// Collects every event already sitting in the channel.
pub fn drain_events(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub async fn create_product(
    db: &DbPool,
    sku: &str,
    lead_time_days: i32,
    min_order: i32,
    max_order: i32,
    unit_cost: f64,
) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        sku: Set(sku.to_string()),
        name: Set(format!("{} test product", sku)),
        category: Set("test".to_string()),
        unit_cost: Set(unit_cost),
        selling_price: Set(unit_cost * 2.0),
        lead_time_days: Set(lead_time_days),
        shelf_life_days: Set(365),
        min_order_quantity: Set(min_order),
        max_order_quantity: Set(max_order),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to insert product")
}

/// Seeds one observed demand row per entry, oldest first, ending
/// yesterday. Fulfilled equals demanded so history carries no stockouts.
pub async fn seed_demand_series(db: &DbPool, product_id: Uuid, quantities: &[i32]) {
    let today = Utc::now().date_naive();
    for (idx, quantity) in quantities.iter().enumerate() {
        let date = today - Duration::days((quantities.len() - idx) as i64);
        demand_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            date: Set(date),
            quantity_demanded: Set(*quantity),
            quantity_fulfilled: Set(*quantity),
            is_forecast: Set(false),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("failed to insert demand record");
    }
}

pub async fn seed_constant_demand(db: &DbPool, product_id: Uuid, days: usize, quantity: i32) {
    seed_demand_series(db, product_id, &vec![quantity; days]).await;
}

pub async fn record_inventory(
    db: &DbPool,
    product_id: Uuid,
    stock: i32,
    reserved: i32,
    in_transit: i32,
) -> inventory_level::Model {
    inventory_level::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        stock_level: Set(stock),
        reserved_stock: Set(reserved),
        in_transit: Set(in_transit),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to insert inventory level")
}

pub async fn activate_policy(
    db: &DbPool,
    product_id: Uuid,
    reorder_point: i32,
    safety_stock: i32,
    order_quantity: i32,
) -> policy_parameters::Model {
    policy_parameters::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        reorder_point: Set(reorder_point),
        safety_stock: Set(safety_stock),
        order_quantity: Set(order_quantity),
        review_period_days: Set(1),
        is_active: Set(true),
        gp_mean: Set(None),
        gp_variance: Set(None),
        acquisition_value: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to insert policy parameters")
}

pub async fn insert_order_action(
    db: &DbPool,
    product_id: Uuid,
    quantity: i32,
) -> inventory_action::Model {
    inventory_action::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        action_type: Set("order".to_string()),
        quantity: Set(quantity),
        expected_delivery: Set(None),
        cost: Set(None),
        state_vector: Set(None),
        q_value: Set(None),
        reward: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to insert inventory action")
}

/// Inserts an order action carrying a decision trace of the shape the
/// tactical learning pass reads back.
pub async fn insert_traced_action(
    db: &DbPool,
    product_id: Uuid,
    quantity: i32,
    stock_level: f64,
) -> inventory_action::Model {
    // Layout mirrors TacticalState::to_vector: nothing reserved or in
    // transit, so available equals the stock level.
    let state: Vec<f64> = vec![
        stock_level,
        0.0,
        0.0,
        stock_level,
        10.0,
        10.0,
        10.0,
        10.0,
        2.0,
        1.0,
    ];
    let forecast: Vec<f64> = vec![10.0; 7];
    let trace = serde_json::json!({
        "mpc_recommendation": quantity,
        "rl_action_index": 2,
        "state_features": state,
        "demand_forecast": forecast,
        "predicted_service_level": 0.95,
    });
    inventory_action::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        action_type: Set("order".to_string()),
        quantity: Set(quantity),
        cost: Set(Some(quantity as f64 * 5.0)),
        state_vector: Set(Some(trace.to_string())),
        q_value: Set(Some(0.0)),
        expected_delivery: Set(None),
        reward: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to insert traced inventory action")
}

pub async fn insert_metric(
    db: &DbPool,
    name: &str,
    value: f64,
    category: &str,
) -> performance_metric::Model {
    performance_metric::ActiveModel {
        id: Set(Uuid::new_v4()),
        metric_name: Set(name.to_string()),
        metric_value: Set(value),
        metric_category: Set(category.to_string()),
        time_period: Set("daily".to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to insert performance metric")
}
