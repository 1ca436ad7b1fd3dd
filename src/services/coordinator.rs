use crate::{
    config::{EngineConfig, StrategicConfig, TacticalConfig},
    db::DbPool,
    entities::inventory_action::{self, ActionType, Entity as InventoryActionEntity},
    entities::optimization_run::{self, Entity as OptimizationRunEntity, OptimizationMethod},
    entities::performance_metric::{self, Entity as PerformanceMetricEntity},
    entities::policy_parameters::{self, Entity as PolicyParametersEntity},
    entities::product::Entity as ProductEntity,
    errors::EngineError,
    events::{Event, EventSender},
    services::strategic::{StrategicCycleSummary, StrategicService},
    services::tactical::{TacticalCycleSummary, TacticalService},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Tactical orders are flagged once their recent average drifts from
/// the active strategic order quantity by more than this fraction.
const DEVIATION_THRESHOLD: f64 = 0.5;

/// Trailing windows for the consistency check and metric aggregation.
const CONSISTENCY_WINDOW_DAYS: i64 = 7;
const AGGREGATION_WINDOW_DAYS: i64 = 7;

/// Tuning thresholds and the bounds proposals may not leave.
const MIN_COST_EFFICIENCY: f64 = 0.7;
const MIN_SERVICE_LEVEL: f64 = 0.90;
const MAX_SERVICE_LEVEL: f64 = 0.98;
const MAX_STRATEGIC_ITERATIONS: f64 = 100.0;
const MAX_PREDICTION_HORIZON: f64 = 14.0;
const MIN_PREDICTION_HORIZON: f64 = 3.0;

pub const METRIC_STRATEGIC_RUNTIME: &str = "strategic_optimization_runtime";
pub const METRIC_STRATEGIC_PRODUCTS: &str = "strategic_products_optimized";
pub const METRIC_COORD_SERVICE_LEVEL: &str = "coordination_average_service_level";
pub const METRIC_COORD_COST_EFFICIENCY: &str = "coordination_cost_efficiency";
pub const METRIC_COORD_INCONSISTENCY: &str = "coordination_inconsistency_count";
pub const METRIC_COORD_CYCLE_DURATION: &str = "coordination_cycle_duration";

/// One product whose tactical behavior contradicts its strategic policy.
#[derive(Debug, Clone)]
pub struct ConsistencyIssue {
    pub product_id: Uuid,
    pub strategic_order_quantity: f64,
    pub tactical_average_quantity: f64,
    pub deviation: f64,
}

/// Averages over the trailing metric window. Fields are `None` when no
/// rows of the matching category were recorded in the window.
#[derive(Debug, Clone)]
pub struct PerformanceSummary {
    pub average_service_level: Option<f64>,
    pub average_cycle_cost: Option<f64>,
    pub cost_efficiency: Option<f64>,
    pub metrics_considered: usize,
}

/// Advisory configuration change derived from aggregated performance.
#[derive(Debug, Clone)]
pub struct TuningProposal {
    pub parameter: String,
    pub current_value: f64,
    pub proposed_value: f64,
    pub reason: String,
}

/// Everything one coordination cycle observed and decided.
#[derive(Debug, Clone)]
pub struct CoordinationReport {
    pub started_at: DateTime<Utc>,
    pub strategic: Option<StrategicCycleSummary>,
    pub tactical: Option<TacticalCycleSummary>,
    pub consistency_issues: Vec<ConsistencyIssue>,
    pub performance: PerformanceSummary,
    pub proposals: Vec<TuningProposal>,
    pub duration_seconds: f64,
}

/// Point-in-time view of the engine for health endpoints and operators.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub product_count: u64,
    pub active_policy_count: u64,
    pub actions_last_24h: u64,
    pub last_strategic_run: Option<DateTime<Utc>>,
    pub last_tactical_run: Option<DateTime<Utc>>,
    pub tracked_agents: usize,
}

/// Supervision across the two optimization tiers.
///
/// A coordination cycle runs the strategic pass when it is due, drives
/// one tactical cycle, checks recent tactical orders against the active
/// strategic policies, aggregates the trailing week of performance
/// metrics, and derives tuning proposals. Proposals are advisory only:
/// they are logged and emitted as events, never applied to the running
/// configuration.
#[derive(Clone)]
pub struct CoordinatorService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    strategic: StrategicService,
    tactical: TacticalService,
    strategic_config: StrategicConfig,
    tactical_config: TacticalConfig,
}

impl CoordinatorService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        strategic: StrategicService,
        tactical: TacticalService,
        config: &EngineConfig,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            strategic,
            tactical,
            strategic_config: config.strategic.clone(),
            tactical_config: config.tactical.clone(),
        }
    }

    /// True when no strategic run exists yet or the latest one is older
    /// than the configured re-optimization interval.
    pub async fn strategic_due(&self) -> Result<bool, EngineError> {
        let interval = Duration::days(self.strategic_config.optimization_interval_days as i64);
        let due = match self.last_run(OptimizationMethod::Strategic).await? {
            Some(last) => Utc::now() - last >= interval,
            None => true,
        };
        Ok(due)
    }

    /// Runs the strategic optimizer over all products and records the
    /// pass runtime and coverage as weekly metrics.
    #[instrument(skip(self))]
    pub async fn run_strategic_pass(&self) -> Result<StrategicCycleSummary, EngineError> {
        let started = Instant::now();
        let summary = self.strategic.optimize_all_products().await?;
        let elapsed = started.elapsed().as_secs_f64();

        self.record_metric(METRIC_STRATEGIC_RUNTIME, elapsed, "efficiency", "weekly")
            .await?;
        self.record_metric(
            METRIC_STRATEGIC_PRODUCTS,
            summary.optimized as f64,
            "efficiency",
            "weekly",
        )
        .await?;

        info!(
            products_total = summary.products_total,
            optimized = summary.optimized,
            skipped = summary.skipped,
            failed = summary.failed,
            runtime_seconds = elapsed,
            "Strategic pass completed"
        );
        Ok(summary)
    }

    /// Runs one full coordination cycle.
    ///
    /// A failed strategic or tactical phase is logged and leaves its
    /// slot in the report empty; the remaining phases still run so one
    /// tier's outage never silences the other's supervision.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CoordinationReport, EngineError> {
        let started_at = Utc::now();
        let started = Instant::now();
        info!("Starting coordination cycle");

        let strategic = if self.strategic_due().await? {
            match self.run_strategic_pass().await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    log_phase_failure("strategic", &e);
                    None
                }
            }
        } else {
            debug!("Strategic optimization not due yet");
            None
        };

        let tactical = match self.tactical.run_cycle().await {
            Ok(summary) => Some(summary),
            Err(e) => {
                log_phase_failure("tactical", &e);
                None
            }
        };

        let consistency_issues = self.validate_consistency().await?;
        let performance = self.aggregate_performance().await?;
        let proposals = propose_tuning(&self.strategic_config, &self.tactical_config, &performance);

        for proposal in &proposals {
            info!(
                parameter = %proposal.parameter,
                current = proposal.current_value,
                proposed = proposal.proposed_value,
                reason = %proposal.reason,
                "Tuning proposal"
            );
            self.emit(Event::TuningProposed {
                parameter: proposal.parameter.clone(),
                current_value: proposal.current_value,
                proposed_value: proposal.proposed_value,
                reason: proposal.reason.clone(),
            })
            .await;
        }

        if let Some(service) = performance.average_service_level {
            self.record_metric(METRIC_COORD_SERVICE_LEVEL, service, "service", "daily")
                .await?;
        }
        if let Some(efficiency) = performance.cost_efficiency {
            self.record_metric(METRIC_COORD_COST_EFFICIENCY, efficiency, "efficiency", "daily")
                .await?;
        }
        self.record_metric(
            METRIC_COORD_INCONSISTENCY,
            consistency_issues.len() as f64,
            "consistency",
            "daily",
        )
        .await?;

        let duration_seconds = started.elapsed().as_secs_f64();
        self.record_metric(METRIC_COORD_CYCLE_DURATION, duration_seconds, "efficiency", "daily")
            .await?;

        info!(
            flagged_products = consistency_issues.len(),
            proposals = proposals.len(),
            duration_seconds,
            "Coordination cycle completed"
        );
        self.emit(Event::CoordinationCompleted {
            flagged_products: consistency_issues.len(),
            proposals: proposals.len(),
        })
        .await;

        Ok(CoordinationReport {
            started_at,
            strategic,
            tactical,
            consistency_issues,
            performance,
            proposals,
            duration_seconds,
        })
    }

    /// Flags products whose recent tactical order quantities drift from
    /// the active strategic order quantity by more than the threshold.
    /// Products without recent orders are skipped.
    #[instrument(skip(self))]
    pub async fn validate_consistency(&self) -> Result<Vec<ConsistencyIssue>, EngineError> {
        let db = &*self.db_pool;
        let cutoff = Utc::now() - Duration::days(CONSISTENCY_WINDOW_DAYS);

        let active_policies = PolicyParametersEntity::find()
            .filter(policy_parameters::Column::IsActive.eq(true))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list active policies for consistency check");
                EngineError::db_error(e)
            })?;

        let mut issues = Vec::new();
        for policy in active_policies {
            let average = match self.recent_order_average(policy.product_id, cutoff).await {
                Ok(Some(average)) => average,
                Ok(None) => continue,
                Err(e) => {
                    error!(
                        product_id = %policy.product_id,
                        error = %e,
                        "Consistency check failed for product"
                    );
                    continue;
                }
            };

            let target = policy.order_quantity as f64;
            let deviation = order_deviation(average, target);
            if deviation > DEVIATION_THRESHOLD {
                warn!(
                    product_id = %policy.product_id,
                    tactical_average = average,
                    strategic_order_quantity = target,
                    deviation,
                    "Tactical orders deviate from the active strategic policy"
                );
                self.emit(Event::ConsistencyDeviation {
                    product_id: policy.product_id,
                    tactical_avg_quantity: average,
                    strategic_order_quantity: target,
                    deviation,
                })
                .await;
                issues.push(ConsistencyIssue {
                    product_id: policy.product_id,
                    strategic_order_quantity: target,
                    tactical_average_quantity: average,
                    deviation,
                });
            }
        }

        Ok(issues)
    }

    /// Averages the trailing week of recorded metrics by category.
    pub async fn aggregate_performance(&self) -> Result<PerformanceSummary, EngineError> {
        let db = &*self.db_pool;
        let cutoff = Utc::now() - Duration::days(AGGREGATION_WINDOW_DAYS);

        let metrics = PerformanceMetricEntity::find()
            .filter(performance_metric::Column::RecordedAt.gte(cutoff))
            .all(db)
            .await
            .map_err(EngineError::db_error)?;

        let average_service_level = category_average(&metrics, "service");
        let average_cycle_cost = category_average(&metrics, "cost");
        let cost_efficiency = match (average_service_level, average_cycle_cost) {
            (Some(service), Some(cost)) => Some(cost_efficiency(service, cost)),
            _ => None,
        };

        Ok(PerformanceSummary {
            average_service_level,
            average_cycle_cost,
            cost_efficiency,
            metrics_considered: metrics.len(),
        })
    }

    /// Counts and recency queries for health reporting.
    pub async fn system_status(&self) -> Result<SystemStatus, EngineError> {
        let db = &*self.db_pool;

        let product_count = ProductEntity::find()
            .count(db)
            .await
            .map_err(EngineError::db_error)?;
        let active_policy_count = PolicyParametersEntity::find()
            .filter(policy_parameters::Column::IsActive.eq(true))
            .count(db)
            .await
            .map_err(EngineError::db_error)?;
        let actions_last_24h = InventoryActionEntity::find()
            .filter(inventory_action::Column::CreatedAt.gte(Utc::now() - Duration::hours(24)))
            .count(db)
            .await
            .map_err(EngineError::db_error)?;

        Ok(SystemStatus {
            product_count,
            active_policy_count,
            actions_last_24h,
            last_strategic_run: self.last_run(OptimizationMethod::Strategic).await?,
            last_tactical_run: self.last_run(OptimizationMethod::Tactical).await?,
            tracked_agents: self.tactical.agent_count(),
        })
    }

    async fn last_run(
        &self,
        method: OptimizationMethod,
    ) -> Result<Option<DateTime<Utc>>, EngineError> {
        let db = &*self.db_pool;
        let run = OptimizationRunEntity::find()
            .filter(optimization_run::Column::Method.eq(method.as_str()))
            .order_by_desc(optimization_run::Column::CreatedAt)
            .one(db)
            .await
            .map_err(EngineError::db_error)?;
        Ok(run.map(|r| r.created_at))
    }

    /// Average quantity of the product's recent order actions, `None`
    /// when the window holds no orders.
    async fn recent_order_average(
        &self,
        product_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<f64>, EngineError> {
        let db = &*self.db_pool;
        let actions = InventoryActionEntity::find()
            .filter(inventory_action::Column::ProductId.eq(product_id))
            .filter(inventory_action::Column::ActionType.eq(ActionType::Order.as_str()))
            .filter(inventory_action::Column::CreatedAt.gte(cutoff))
            .all(db)
            .await
            .map_err(EngineError::db_error)?;

        if actions.is_empty() {
            return Ok(None);
        }
        let total: f64 = actions.iter().map(|a| a.quantity as f64).sum();
        Ok(Some(total / actions.len() as f64))
    }

    async fn record_metric(
        &self,
        name: &str,
        value: f64,
        category: &str,
        period: &str,
    ) -> Result<(), EngineError> {
        let db = &*self.db_pool;
        let metric = performance_metric::ActiveModel {
            id: Set(Uuid::new_v4()),
            metric_name: Set(name.to_string()),
            metric_value: Set(value),
            metric_category: Set(category.to_string()),
            time_period: Set(period.to_string()),
            ..Default::default()
        };
        metric.insert(db).await.map_err(EngineError::db_error)?;
        Ok(())
    }

    async fn emit(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, "Failed to send coordination event");
            }
        }
    }
}

fn log_phase_failure(phase: &str, error: &EngineError) {
    if error.is_contract_violation() {
        error!(phase, error = %error, "Coordination phase failed");
    } else {
        warn!(phase, error = %error, "Coordination phase failed, retrying next cycle");
    }
}

fn order_deviation(average: f64, target: f64) -> f64 {
    (average - target).abs() / target
}

fn category_average(metrics: &[performance_metric::Model], category: &str) -> Option<f64> {
    let values: Vec<f64> = metrics
        .iter()
        .filter(|m| m.metric_category == category)
        .map(|m| m.metric_value)
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Composite score blending realized service against weekly spend; one
/// point of service level offsets ten thousand in cost.
fn cost_efficiency(service_level: f64, average_cost: f64) -> f64 {
    (service_level - average_cost / 10_000.0).clamp(0.0, 1.0)
}

/// Derives advisory tuning proposals from aggregated performance.
///
/// Proposals that would not change the current value (already at a
/// bound) are suppressed.
fn propose_tuning(
    strategic: &StrategicConfig,
    tactical: &TacticalConfig,
    performance: &PerformanceSummary,
) -> Vec<TuningProposal> {
    let mut proposals = Vec::new();

    if let Some(efficiency) = performance.cost_efficiency {
        if efficiency < MIN_COST_EFFICIENCY {
            let current = strategic.max_iterations as f64;
            let proposed = (current * 1.2).round().min(MAX_STRATEGIC_ITERATIONS);
            if proposed > current {
                proposals.push(TuningProposal {
                    parameter: "strategic.max_iterations".to_string(),
                    current_value: current,
                    proposed_value: proposed,
                    reason: format!(
                        "cost efficiency {:.2} below {:.2} floor",
                        efficiency, MIN_COST_EFFICIENCY
                    ),
                });
            }
        }
    }

    if let Some(service) = performance.average_service_level {
        let current = tactical.prediction_horizon as f64;
        if service < MIN_SERVICE_LEVEL {
            let proposed = (current + 1.0).min(MAX_PREDICTION_HORIZON);
            if proposed > current {
                proposals.push(TuningProposal {
                    parameter: "tactical.prediction_horizon".to_string(),
                    current_value: current,
                    proposed_value: proposed,
                    reason: format!(
                        "service level {:.2} below {:.2} floor",
                        service, MIN_SERVICE_LEVEL
                    ),
                });
            }
        } else if service > MAX_SERVICE_LEVEL {
            let proposed = (current - 1.0).max(MIN_PREDICTION_HORIZON);
            if proposed < current {
                proposals.push(TuningProposal {
                    parameter: "tactical.prediction_horizon".to_string(),
                    current_value: current,
                    proposed_value: proposed,
                    reason: format!(
                        "service level {:.2} above {:.2} ceiling",
                        service, MAX_SERVICE_LEVEL
                    ),
                });
            }
        }
    }

    proposals
}
