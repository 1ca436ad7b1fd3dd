use crate::{
    config::{EconomicsConfig, EngineConfig, TacticalConfig},
    db::DbPool,
    entities::demand_record::{self, Entity as DemandRecordEntity},
    entities::inventory_action::{self, ActionType, Entity as InventoryActionEntity},
    entities::inventory_level::{self, Entity as InventoryLevelEntity},
    entities::optimization_run::{self, OptimizationMethod},
    entities::performance_metric,
    entities::policy_parameters::{self, Entity as PolicyParametersEntity},
    entities::product::{Entity as ProductEntity, Model as ProductModel},
    errors::EngineError,
    events::{Event, EventSender},
    ml::forecast::forecast_demand,
    ml::policy::{
        action_reward, Experience, PolicyConfig, QLearningPolicy, RewardParams, ACTION_COUNT,
    },
    ml::solver::{
        ConstrainedPlanSolver, HeuristicPlanSolver, OrderPlan, PlanSolver, PlanStatus,
        ProductConstraints, SolverConfig, TacticalState, STATE_DIM,
    },
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Demand days consulted when building the tactical state; wide enough
/// for the forecaster's two-week trend split.
const STATE_DEMAND_DAYS: u64 = 14;

/// Trailing window and cap for the learning update's action pairing.
const LEARNING_WINDOW_DAYS: i64 = 7;
const LEARNING_ACTION_LIMIT: u64 = 10;

pub const METRIC_PRODUCTS_PROCESSED: &str = "tactical_products_processed";
pub const METRIC_ACTIONS_TAKEN: &str = "tactical_actions_taken";
pub const METRIC_TOTAL_COST: &str = "tactical_total_cost";
pub const METRIC_AVERAGE_SERVICE_LEVEL: &str = "tactical_average_service_level";

/// Decision trace persisted on each action row as JSON.
///
/// The learning update reads these back to reconstruct state/action
/// pairs, so the struct is the single definition of the wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DecisionTrace {
    mpc_recommendation: i32,
    rl_action_index: usize,
    state_features: Vec<f64>,
    demand_forecast: Vec<f64>,
    predicted_service_level: f64,
}

/// One emitted replenishment decision.
#[derive(Debug, Clone)]
pub struct TacticalActionSummary {
    pub action_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub baseline_quantity: i32,
    pub multiplier_index: usize,
    pub cost: f64,
    pub expected_delivery: DateTime<Utc>,
    pub predicted_service_level: f64,
    pub plan_status: PlanStatus,
    pub constraints_satisfied: bool,
    pub used_fallback: bool,
}

/// Aggregate counters for one tactical cycle.
#[derive(Debug, Clone, Default)]
pub struct TacticalCycleSummary {
    pub products_processed: usize,
    pub actions_taken: usize,
    pub fallbacks: usize,
    pub errors: usize,
    pub total_cost: f64,
    pub average_service_level: f64,
}

/// Short-horizon replenishment decisions with a learned correction.
///
/// Each decision plans orders over the prediction horizon with the
/// configured solver, takes the first-period quantity as a baseline,
/// and lets a per-product Q-learning policy scale it by a multiplier.
/// Positive corrected orders become `inventory_actions` rows carrying
/// the full decision trace; a later learning pass pairs consecutive
/// actions to attribute rewards and train the policy.
#[derive(Clone)]
pub struct TacticalService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    tactical: TacticalConfig,
    economics: EconomicsConfig,
    random_seed: Option<u64>,
    planner: Arc<dyn PlanSolver>,
    fallback: HeuristicPlanSolver,
    agents: Arc<DashMap<Uuid, QLearningPolicy>>,
}

impl TacticalService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        config: &EngineConfig,
    ) -> Self {
        let solver_config = SolverConfig {
            prediction_horizon: config.tactical.prediction_horizon as usize,
            control_horizon: config.tactical.control_horizon as usize,
            warehouse_capacity: config.economics.warehouse_capacity,
            service_level_target: config.economics.service_level_target,
            holding_cost_rate: config.economics.holding_cost_rate,
            stockout_penalty: config.economics.stockout_penalty,
            order_cost: config.economics.order_cost,
        };

        let planner: Arc<dyn PlanSolver> = if config.tactical.use_constrained_solver {
            Arc::new(ConstrainedPlanSolver::with_config(solver_config.clone()))
        } else {
            Arc::new(HeuristicPlanSolver::with_config(solver_config.clone()))
        };

        Self {
            db_pool,
            event_sender,
            tactical: config.tactical.clone(),
            economics: config.economics.clone(),
            random_seed: config.random_seed,
            planner,
            fallback: HeuristicPlanSolver::with_config(solver_config),
            agents: Arc::new(DashMap::new()),
        }
    }

    /// Number of products with a live learned policy.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Makes one replenishment decision for a product.
    ///
    /// Returns `Ok(None)` when no action is warranted: no active
    /// strategic policy, no inventory snapshot, or a corrected order
    /// quantity of zero.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn decide_for_product(
        &self,
        product_id: Uuid,
    ) -> Result<Option<TacticalActionSummary>, EngineError> {
        let db = &*self.db_pool;

        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(EngineError::db_error)?
            .ok_or_else(|| EngineError::not_found(format!("Product {} not found", product_id)))?;

        let Some(_policy) = self.active_policy(product_id).await? else {
            info!(
                product_id = %product_id,
                "No active strategic policy, skipping tactical decision"
            );
            return Ok(None);
        };

        let Some(inventory) = self.latest_inventory(product_id).await? else {
            info!(
                product_id = %product_id,
                "No inventory snapshot, skipping tactical decision"
            );
            return Ok(None);
        };

        let recent_demand = self.fetch_recent_demand(product_id).await?;
        let state = TacticalState::new(
            product_id,
            inventory.stock_level,
            inventory.reserved_stock,
            inventory.in_transit,
            recent_demand,
            product.lead_time_days,
        );

        let forecast = forecast_demand(
            &state.recent_demand,
            self.tactical.prediction_horizon as usize,
            Utc::now().date_naive(),
        );
        let constraints = product_constraints(&product);

        let (plan, fallback_reason) = self.compute_plan(&state, &constraints, &forecast)?;
        let used_fallback = fallback_reason.is_some();
        if let Some(reason) = fallback_reason {
            self.emit(Event::HeuristicFallbackUsed { product_id, reason })
                .await;
        }

        let baseline = plan.first_period_order() as i32;
        let state_vector = state.to_vector();

        // Registry access stays synchronous; the guard must drop before
        // the next await.
        let choice = {
            let mut agent = self
                .agents
                .entry(product_id)
                .or_insert_with(|| self.new_agent(product_id));
            agent.select_action(&state_vector, baseline, true)
        };

        let headroom = self.economics.warehouse_capacity
            - (inventory.stock_level + inventory.in_transit) as f64;
        let quantity = clamp_corrected_quantity(choice.quantity, &constraints, headroom.max(0.0));

        if quantity == 0 {
            debug!(
                product_id = %product_id,
                baseline,
                multiplier_index = choice.index,
                "Corrected order quantity is zero, no action emitted"
            );
            return Ok(None);
        }

        let cost = quantity as f64 * product.unit_cost + self.economics.order_cost;
        let expected_delivery =
            Utc::now() + Duration::days(product.lead_time_days.max(0) as i64);

        let trace = DecisionTrace {
            mpc_recommendation: baseline,
            rl_action_index: choice.index,
            state_features: state_vector.to_vec(),
            demand_forecast: plan.demand_forecast.clone(),
            predicted_service_level: plan.service_level,
        };

        let action_id = Uuid::new_v4();
        let action = inventory_action::ActiveModel {
            id: Set(action_id),
            product_id: Set(product_id),
            action_type: Set(ActionType::Order.as_str().to_string()),
            quantity: Set(quantity),
            expected_delivery: Set(Some(expected_delivery)),
            cost: Set(Some(cost)),
            state_vector: Set(Some(serde_json::to_string(&trace)?)),
            q_value: Set(Some(choice.q_value)),
            reward: Set(None),
            ..Default::default()
        };
        action.insert(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to persist inventory action");
            EngineError::db_error(e)
        })?;

        info!(
            product_id = %product_id,
            action_id = %action_id,
            quantity,
            baseline,
            multiplier_index = choice.index,
            cost,
            plan_status = plan.status.as_str(),
            "Replenishment order emitted"
        );

        self.emit(Event::ReplenishmentOrdered {
            action_id,
            product_id,
            quantity,
            cost,
            expected_delivery,
        })
        .await;

        Ok(Some(TacticalActionSummary {
            action_id,
            product_id,
            quantity,
            baseline_quantity: baseline,
            multiplier_index: choice.index,
            cost,
            expected_delivery,
            predicted_service_level: plan.service_level,
            plan_status: plan.status,
            constraints_satisfied: plan.constraints_satisfied,
            used_fallback,
        }))
    }

    /// Replays recent action pairs into the product's policy and runs
    /// one learning pass. Returns the number of pairs processed.
    ///
    /// Rewards are attributed from the state observed at the following
    /// decision and written back onto the earlier action row.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_agent_learning(&self, product_id: Uuid) -> Result<usize, EngineError> {
        let db = &*self.db_pool;

        let cutoff = Utc::now() - Duration::days(LEARNING_WINDOW_DAYS);
        let mut actions = InventoryActionEntity::find()
            .filter(inventory_action::Column::ProductId.eq(product_id))
            .filter(inventory_action::Column::ActionType.eq(ActionType::Order.as_str()))
            .filter(inventory_action::Column::CreatedAt.gte(cutoff))
            .order_by_desc(inventory_action::Column::CreatedAt)
            .limit(LEARNING_ACTION_LIMIT)
            .all(db)
            .await
            .map_err(EngineError::db_error)?;

        if actions.len() < 2 {
            debug!(
                product_id = %product_id,
                actions = actions.len(),
                "Not enough recent actions for a learning update"
            );
            return Ok(0);
        }
        // Oldest first so each action is rewarded by its successor.
        actions.reverse();

        let reward_params = RewardParams {
            unit_cost: self.product_unit_cost(product_id).await?,
            stockout_penalty: self.economics.stockout_penalty,
            order_cost: self.economics.order_cost,
        };
        let pairs = pair_experiences(&actions, &reward_params);
        if pairs.is_empty() {
            return Ok(0);
        }

        let learned = {
            let mut agent = self
                .agents
                .entry(product_id)
                .or_insert_with(|| self.new_agent(product_id));
            for pair in &pairs {
                agent.store_experience(pair.experience);
            }
            agent.learn()
        };

        for pair in &pairs {
            let mut rewarded: inventory_action::ActiveModel = pair.action.clone().into();
            rewarded.reward = Set(Some(pair.experience.reward));
            rewarded.update(db).await.map_err(EngineError::db_error)?;
        }

        debug!(
            product_id = %product_id,
            pairs = pairs.len(),
            learned,
            "Learning update applied"
        );
        Ok(pairs.len())
    }

    /// Runs one decision plus learning pass over every product.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<TacticalCycleSummary, EngineError> {
        let started = Instant::now();
        let db = &*self.db_pool;

        let products = ProductEntity::find().all(db).await.map_err(|e| {
            error!(error = %e, "Failed to list products for tactical cycle");
            EngineError::db_error(e)
        })?;

        let mut summary = TacticalCycleSummary::default();
        let mut service_levels: Vec<f64> = Vec::new();
        let mut all_constraints_satisfied = true;

        for item in products {
            match self.decide_for_product(item.id).await {
                Ok(Some(action)) => {
                    summary.products_processed += 1;
                    summary.actions_taken += 1;
                    summary.total_cost += action.cost;
                    service_levels.push(action.predicted_service_level);
                    if action.used_fallback {
                        summary.fallbacks += 1;
                    }
                    if !action.constraints_satisfied {
                        all_constraints_satisfied = false;
                    }
                }
                Ok(None) => summary.products_processed += 1,
                Err(e) => {
                    error!(
                        product_id = %item.id,
                        sku = %item.sku,
                        error = %e,
                        "Tactical decision failed for product"
                    );
                    summary.errors += 1;
                }
            }

            // Learning trouble must not undo an already-emitted decision.
            if let Err(e) = self.update_agent_learning(item.id).await {
                warn!(product_id = %item.id, error = %e, "Learning update failed");
            }
        }

        summary.average_service_level = if service_levels.is_empty() {
            0.0
        } else {
            service_levels.iter().sum::<f64>() / service_levels.len() as f64
        };

        self.record_metric(
            METRIC_PRODUCTS_PROCESSED,
            summary.products_processed as f64,
            "efficiency",
        )
        .await?;
        self.record_metric(
            METRIC_ACTIONS_TAKEN,
            summary.actions_taken as f64,
            "efficiency",
        )
        .await?;
        self.record_metric(METRIC_TOTAL_COST, summary.total_cost, "cost")
            .await?;
        self.record_metric(
            METRIC_AVERAGE_SERVICE_LEVEL,
            summary.average_service_level,
            "service",
        )
        .await?;

        let cycle_run = optimization_run::ActiveModel {
            run_id: Set(Uuid::new_v4()),
            product_id: Set(None),
            method: Set(OptimizationMethod::Tactical.as_str().to_string()),
            objective_value: Set(Some(summary.total_cost)),
            constraints_satisfied: Set(all_constraints_satisfied),
            convergence_iterations: Set(None),
            execution_time_seconds: Set(Some(started.elapsed().as_secs_f64())),
            parameters: Set(Some(
                serde_json::json!({
                    "products_processed": summary.products_processed,
                    "actions_taken": summary.actions_taken,
                    "fallbacks": summary.fallbacks,
                    "errors": summary.errors,
                })
                .to_string(),
            )),
            ..Default::default()
        };
        cycle_run.insert(db).await.map_err(EngineError::db_error)?;

        info!(
            products_processed = summary.products_processed,
            actions_taken = summary.actions_taken,
            fallbacks = summary.fallbacks,
            errors = summary.errors,
            total_cost = summary.total_cost,
            average_service_level = summary.average_service_level,
            "Tactical cycle completed"
        );

        self.emit(Event::TacticalCycleCompleted {
            products_processed: summary.products_processed,
            actions_emitted: summary.actions_taken,
            fallbacks: summary.fallbacks,
        })
        .await;

        Ok(summary)
    }

    fn compute_plan(
        &self,
        state: &TacticalState,
        constraints: &ProductConstraints,
        forecast: &[f64],
    ) -> Result<(OrderPlan, Option<String>), EngineError> {
        match self.planner.solve(state, constraints, forecast) {
            Ok(plan) => Ok((plan, None)),
            Err(EngineError::SolverError(reason))
                if self.planner.name() != self.fallback.name() =>
            {
                warn!(
                    product_id = %state.product_id,
                    reason = %reason,
                    "Predictive solve failed, using heuristic fallback"
                );
                let plan = self.fallback.solve(state, constraints, forecast)?;
                Ok((plan, Some(reason)))
            }
            Err(e) => Err(e),
        }
    }

    fn new_agent(&self, product_id: Uuid) -> QLearningPolicy {
        let config = PolicyConfig {
            learning_rate: self.tactical.learning_rate,
            discount_factor: self.tactical.discount_factor,
            exploration_rate: self.tactical.exploration_rate,
            exploration_decay: self.tactical.exploration_decay,
            batch_size: self.tactical.batch_size as usize,
            memory_size: self.tactical.memory_size as usize,
            ..PolicyConfig::default()
        };
        let seed = self
            .random_seed
            .map(|seed| seed ^ (product_id.as_u128() as u64));
        QLearningPolicy::new(config, seed)
    }

    async fn active_policy(
        &self,
        product_id: Uuid,
    ) -> Result<Option<policy_parameters::Model>, EngineError> {
        let db = &*self.db_pool;
        PolicyParametersEntity::find()
            .filter(policy_parameters::Column::ProductId.eq(product_id))
            .filter(policy_parameters::Column::IsActive.eq(true))
            .order_by_desc(policy_parameters::Column::CreatedAt)
            .one(db)
            .await
            .map_err(EngineError::db_error)
    }

    async fn latest_inventory(
        &self,
        product_id: Uuid,
    ) -> Result<Option<inventory_level::Model>, EngineError> {
        let db = &*self.db_pool;
        InventoryLevelEntity::find()
            .filter(inventory_level::Column::ProductId.eq(product_id))
            .order_by_desc(inventory_level::Column::RecordedAt)
            .one(db)
            .await
            .map_err(EngineError::db_error)
    }

    /// Observed demand for the state window, oldest first.
    async fn fetch_recent_demand(&self, product_id: Uuid) -> Result<Vec<f64>, EngineError> {
        let db = &*self.db_pool;
        let records = DemandRecordEntity::find()
            .filter(demand_record::Column::ProductId.eq(product_id))
            .filter(demand_record::Column::IsForecast.eq(false))
            .order_by_desc(demand_record::Column::Date)
            .limit(STATE_DEMAND_DAYS)
            .all(db)
            .await
            .map_err(EngineError::db_error)?;

        let mut demand: Vec<f64> = records
            .iter()
            .map(|r| r.quantity_demanded as f64)
            .collect();
        demand.reverse();
        Ok(demand)
    }

    async fn product_unit_cost(&self, product_id: Uuid) -> Result<f64, EngineError> {
        let db = &*self.db_pool;
        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(EngineError::db_error)?
            .ok_or_else(|| EngineError::not_found(format!("Product {} not found", product_id)))?;
        Ok(product.unit_cost)
    }

    async fn record_metric(
        &self,
        name: &str,
        value: f64,
        category: &str,
    ) -> Result<(), EngineError> {
        let db = &*self.db_pool;
        let metric = performance_metric::ActiveModel {
            id: Set(Uuid::new_v4()),
            metric_name: Set(name.to_string()),
            metric_value: Set(value),
            metric_category: Set(category.to_string()),
            time_period: Set("daily".to_string()),
            ..Default::default()
        };
        metric.insert(db).await.map_err(EngineError::db_error)?;
        Ok(())
    }

    async fn emit(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, "Failed to send tactical event");
            }
        }
    }
}

fn product_constraints(product: &ProductModel) -> ProductConstraints {
    ProductConstraints {
        unit_cost: product.unit_cost,
        lead_time_days: product.lead_time_days.max(0) as usize,
        min_order_quantity: product.min_order_quantity.max(0) as f64,
        max_order_quantity: product.max_order_quantity.max(0) as f64,
    }
}

/// Applies supplier and capacity limits to a corrected order quantity.
///
/// Positive orders are raised to the supplier minimum and capped at
/// both the supplier maximum and the remaining warehouse headroom; when
/// even the minimum does not fit, the order is dropped to zero.
fn clamp_corrected_quantity(
    quantity: i32,
    constraints: &ProductConstraints,
    capacity_headroom: f64,
) -> i32 {
    if quantity <= 0 {
        return 0;
    }
    let ceiling = constraints
        .max_order_quantity
        .min(capacity_headroom)
        .floor();
    if ceiling < constraints.min_order_quantity {
        return 0;
    }
    (quantity as f64).clamp(constraints.min_order_quantity, ceiling) as i32
}

struct ExperiencePair {
    action: inventory_action::Model,
    experience: Experience,
}

/// Builds training pairs from consecutive actions, oldest first.
///
/// Rows with a missing or malformed decision trace are skipped rather
/// than failing the whole update.
fn pair_experiences(
    actions: &[inventory_action::Model],
    reward_params: &RewardParams,
) -> Vec<ExperiencePair> {
    let mut pairs = Vec::new();

    for window in actions.windows(2) {
        let older = &window[0];
        let newer = &window[1];

        let Some((older_trace, older_state)) = decision_state(older) else {
            continue;
        };
        let Some((_, newer_state)) = decision_state(newer) else {
            continue;
        };
        if older_trace.rl_action_index >= ACTION_COUNT {
            warn!(
                action_id = %older.id,
                index = older_trace.rl_action_index,
                "Skipping action with out-of-range correction index"
            );
            continue;
        }

        let reward = action_reward(&newer_state, older.quantity as f64, reward_params);
        pairs.push(ExperiencePair {
            action: older.clone(),
            experience: Experience {
                state: older_state,
                action_index: older_trace.rl_action_index,
                reward,
                next_state: newer_state,
                done: false,
            },
        });
    }

    pairs
}

fn decision_state(
    action: &inventory_action::Model,
) -> Option<(DecisionTrace, [f64; STATE_DIM])> {
    let raw = action.state_vector.as_deref()?;
    let trace: DecisionTrace = match serde_json::from_str(raw) {
        Ok(trace) => trace,
        Err(e) => {
            warn!(
                action_id = %action.id,
                error = %e,
                "Skipping action with unreadable decision trace"
            );
            return None;
        }
    };
    let features: [f64; STATE_DIM] = match trace.state_features.clone().try_into() {
        Ok(features) => features,
        Err(_) => {
            warn!(
                action_id = %action.id,
                "Skipping action with wrong state dimension"
            );
            return None;
        }
    };
    Some((trace, features))
}
