/*!
 * # Finite-Horizon Order Plan Solver
 *
 * Plans replenishment orders over a prediction horizon of N days with
 * orders decided only for the first M control periods. Two
 * implementations share the [`PlanSolver`] trait: a constrained direct
 * search that enumerates order-up-to candidate levels, and a
 * safety-stock heuristic used when the constrained path is disabled.
 * Both produce the same output shape so downstream consumers never
 * branch on which one ran.
 */

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::EngineError;
use crate::ml::simulator::SERVICE_SHORTFALL_WEIGHT;

/// Length of the feature vector learned policies consume.
pub const STATE_DIM: usize = 10;

/// Snapshot of one product's inventory position plus demand-derived
/// features. `recent_demand` holds up to the trailing two weeks of
/// daily demand, oldest first. The derived statistics and the
/// learned-policy feature vector use only the final week; the wider
/// window exists for the demand forecaster's trend split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TacticalState {
    pub product_id: Uuid,
    pub current_stock: i32,
    pub reserved_stock: i32,
    pub in_transit: i32,
    pub available_stock: i32,
    pub recent_demand: Vec<f64>,
    pub lead_time_days: i32,
    pub avg_demand: f64,
    pub demand_volatility: f64,
    pub stock_coverage: f64,
    pub stockout_risk: f64,
}

impl TacticalState {
    pub fn new(
        product_id: Uuid,
        current_stock: i32,
        reserved_stock: i32,
        in_transit: i32,
        recent_demand: Vec<f64>,
        lead_time_days: i32,
    ) -> Self {
        let available_stock = current_stock - reserved_stock;
        let week_start = recent_demand.len().saturating_sub(7);
        let week = &recent_demand[week_start..];
        let avg_demand = mean(week);
        let demand_volatility = if week.len() > 1 {
            population_std(week, avg_demand)
        } else {
            0.0
        };
        let demand_floor = avg_demand.max(1.0);
        let stock_coverage = available_stock as f64 / demand_floor;
        let stockout_risk =
            ((avg_demand * lead_time_days as f64 - available_stock as f64) / demand_floor).max(0.0);

        Self {
            product_id,
            current_stock,
            reserved_stock,
            in_transit,
            available_stock,
            recent_demand,
            lead_time_days,
            avg_demand,
            demand_volatility,
            stock_coverage,
            stockout_risk,
        }
    }

    /// The final week of the demand window.
    pub fn last_week(&self) -> &[f64] {
        let start = self.recent_demand.len().saturating_sub(7);
        &self.recent_demand[start..]
    }

    /// Feature vector for the learned correction policy.
    pub fn to_vector(&self) -> [f64; STATE_DIM] {
        [
            self.current_stock as f64,
            self.reserved_stock as f64,
            self.in_transit as f64,
            self.available_stock as f64,
            self.avg_demand,
            self.demand_volatility,
            self.stock_coverage,
            self.stockout_risk,
            self.lead_time_days as f64,
            self.last_week().len() as f64,
        ]
    }
}

/// How a plan was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Optimal,
    HeuristicFallback,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Optimal => "optimal",
            PlanStatus::HeuristicFallback => "heuristic_fallback",
        }
    }
}

/// Solver output. `order_quantities` has one entry per control period,
/// `predicted_inventory` one per horizon day plus the initial position,
/// and `predicted_stockouts` one per horizon day, for both solver
/// implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlan {
    pub status: PlanStatus,
    pub order_quantities: Vec<f64>,
    pub predicted_inventory: Vec<f64>,
    pub predicted_stockouts: Vec<f64>,
    pub demand_forecast: Vec<f64>,
    pub total_cost: f64,
    pub service_level: f64,
    /// False when the projection could not be kept inside the
    /// warehouse capacity ceiling.
    pub constraints_satisfied: bool,
}

impl OrderPlan {
    /// Order quantity for the first control period.
    pub fn first_period_order(&self) -> f64 {
        self.order_quantities.first().copied().unwrap_or(0.0)
    }
}

/// Horizon and economic settings shared by both solver implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub prediction_horizon: usize,
    pub control_horizon: usize,
    pub warehouse_capacity: f64,
    pub service_level_target: f64,
    /// Annual holding cost as a fraction of unit cost
    pub holding_cost_rate: f64,
    pub stockout_penalty: f64,
    pub order_cost: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            prediction_horizon: 7,
            control_horizon: 3,
            warehouse_capacity: 100_000.0,
            service_level_target: 0.95,
            holding_cost_rate: 0.25,
            stockout_penalty: 10.0,
            order_cost: 50.0,
        }
    }
}

/// Per-product physical and contractual order constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConstraints {
    pub unit_cost: f64,
    pub lead_time_days: usize,
    pub min_order_quantity: f64,
    pub max_order_quantity: f64,
}

/// Strategy interface over the two planning implementations.
pub trait PlanSolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produces an order plan for one product. `forecast` supplies the
    /// predicted daily demand for the prediction horizon; an empty
    /// forecast is an error, not a no-op plan.
    fn solve(
        &self,
        state: &TacticalState,
        constraints: &ProductConstraints,
        forecast: &[f64],
    ) -> Result<OrderPlan, EngineError>;
}

/// Constrained direct-search solver.
///
/// Candidate order levels per control period are the order-up-to
/// quantities that cover each cumulative-forecast prefix from the
/// current position, plus zero and the contractual min/max. The
/// cross-product of candidates is replayed through the inventory
/// balance and the cheapest capacity-feasible combination wins. With a
/// fixed order fee and linear holding/stockout costs, optimal orders
/// sit at one of these levels.
pub struct ConstrainedPlanSolver {
    config: SolverConfig,
}

impl ConstrainedPlanSolver {
    pub fn new() -> Self {
        Self {
            config: SolverConfig::default(),
        }
    }

    pub fn with_config(config: SolverConfig) -> Self {
        Self { config }
    }

    fn candidate_levels(
        &self,
        available: f64,
        constraints: &ProductConstraints,
        forecast: &[f64],
    ) -> Vec<f64> {
        let mut levels = vec![0.0];
        let mut cumulative = 0.0;
        for &day in forecast {
            cumulative += day;
            let needed = (cumulative - available).ceil();
            if needed > 0.0 {
                levels.push(clamp_order(needed, constraints));
            }
        }
        levels.push(clamp_order(constraints.min_order_quantity, constraints));
        levels.push(constraints.max_order_quantity);

        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup_by(|a, b| (*a - *b).abs() < 0.5);
        levels
    }
}

impl Default for ConstrainedPlanSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanSolver for ConstrainedPlanSolver {
    fn name(&self) -> &'static str {
        "constrained_direct_search"
    }

    fn solve(
        &self,
        state: &TacticalState,
        constraints: &ProductConstraints,
        forecast: &[f64],
    ) -> Result<OrderPlan, EngineError> {
        if forecast.is_empty() {
            return Err(EngineError::SolverError(
                "cannot plan over an empty forecast".to_string(),
            ));
        }

        let n = forecast.len();
        let m = self.config.control_horizon.min(n).max(1);
        let available = state.available_stock as f64;
        let levels = self.candidate_levels(available, constraints, forecast);
        let daily_holding = constraints.unit_cost * self.config.holding_cost_rate / 365.0;

        let mut best: Option<(f64, Vec<f64>, Trajectory, PlanCosts)> = None;
        let mut indices = vec![0usize; m];

        'combinations: loop {
            let orders: Vec<f64> = indices.iter().map(|&i| levels[i]).collect();
            let trajectory = project_trajectory(
                available,
                &orders,
                forecast,
                constraints.lead_time_days,
                self.config.warehouse_capacity,
            );

            if trajectory.capacity_ok {
                let costs = evaluate_costs(
                    &trajectory,
                    &orders,
                    forecast,
                    daily_holding,
                    self.config.stockout_penalty,
                    self.config.order_cost,
                    self.config.service_level_target,
                );
                let objective = costs.objective();
                let better = best
                    .as_ref()
                    .map_or(true, |(current, ..)| objective < *current);
                if better {
                    best = Some((objective, orders, trajectory, costs));
                }
            }

            // Odometer increment over the candidate index space.
            let mut position = 0;
            loop {
                indices[position] += 1;
                if indices[position] < levels.len() {
                    break;
                }
                indices[position] = 0;
                position += 1;
                if position == m {
                    break 'combinations;
                }
            }
        }

        let (objective, orders, trajectory, costs) = best.ok_or_else(|| {
            EngineError::SolverError(
                "no capacity-feasible order plan exists for this horizon".to_string(),
            )
        })?;

        Ok(OrderPlan {
            status: PlanStatus::Optimal,
            order_quantities: orders,
            predicted_inventory: trajectory.inventory,
            predicted_stockouts: trajectory.stockouts,
            demand_forecast: forecast.to_vec(),
            total_cost: objective,
            service_level: costs.service_level,
            constraints_satisfied: true,
        })
    }
}

/// Safety-stock heuristic used when the constrained solver is
/// disabled. Sizes safety stock with a service-level z-score, orders
/// up to reorder point plus a week of average demand whenever the
/// projected position dips to the reorder point, then replays the
/// result through the same inventory balance as the constrained path.
#[derive(Clone)]
pub struct HeuristicPlanSolver {
    config: SolverConfig,
}

impl HeuristicPlanSolver {
    pub fn new() -> Self {
        Self {
            config: SolverConfig::default(),
        }
    }

    pub fn with_config(config: SolverConfig) -> Self {
        Self { config }
    }
}

impl Default for HeuristicPlanSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanSolver for HeuristicPlanSolver {
    fn name(&self) -> &'static str {
        "safety_stock_heuristic"
    }

    fn solve(
        &self,
        state: &TacticalState,
        constraints: &ProductConstraints,
        forecast: &[f64],
    ) -> Result<OrderPlan, EngineError> {
        if forecast.is_empty() {
            return Err(EngineError::SolverError(
                "cannot plan over an empty forecast".to_string(),
            ));
        }

        let n = forecast.len();
        let m = self.config.control_horizon.min(n).max(1);
        let available = state.available_stock as f64;

        let avg_demand = if state.recent_demand.is_empty() {
            1.0
        } else {
            state.avg_demand
        };
        let demand_std = if state.recent_demand.len() > 1 {
            state.demand_volatility
        } else {
            avg_demand * 0.3
        };

        let z = service_level_z(self.config.service_level_target);
        let lead = constraints.lead_time_days as f64;
        let safety_stock = z * demand_std * lead.sqrt();
        let reorder_point = avg_demand * lead + safety_stock;

        let mut orders = vec![0.0; m];
        let mut position = available;
        for t in 0..m {
            let projected = position - forecast[t];
            if projected <= reorder_point {
                let target_stock = reorder_point + avg_demand * 7.0;
                let mut quantity = (target_stock - projected).max(0.0);
                if quantity > 0.0 {
                    quantity = clamp_order(quantity, constraints);
                }
                orders[t] = quantity;
                position += quantity;
            }
            position = (position - forecast[t]).max(0.0);
        }

        // Walk violations back onto the arriving orders so the
        // projection never exceeds capacity silently.
        let mut trajectory = project_trajectory(
            available,
            &orders,
            forecast,
            constraints.lead_time_days,
            self.config.warehouse_capacity,
        );
        let mut guard = 0;
        while !trajectory.capacity_ok && guard < 2 * m {
            if !reduce_first_violation(
                &mut orders,
                &trajectory,
                constraints,
                self.config.warehouse_capacity,
            ) {
                break;
            }
            trajectory = project_trajectory(
                available,
                &orders,
                forecast,
                constraints.lead_time_days,
                self.config.warehouse_capacity,
            );
            guard += 1;
        }

        let daily_holding = constraints.unit_cost * self.config.holding_cost_rate / 365.0;
        let costs = evaluate_costs(
            &trajectory,
            &orders,
            forecast,
            daily_holding,
            self.config.stockout_penalty,
            self.config.order_cost,
            self.config.service_level_target,
        );

        Ok(OrderPlan {
            status: PlanStatus::HeuristicFallback,
            constraints_satisfied: trajectory.capacity_ok,
            order_quantities: orders,
            predicted_inventory: trajectory.inventory,
            predicted_stockouts: trajectory.stockouts,
            demand_forecast: forecast.to_vec(),
            total_cost: costs.raw_total(),
            service_level: costs.service_level,
        })
    }
}

/// z-score lookup for common service-level targets.
pub fn service_level_z(target: f64) -> f64 {
    if target >= 0.99 {
        2.33
    } else if target >= 0.975 {
        1.96
    } else if target >= 0.95 {
        1.645
    } else {
        1.28
    }
}

struct Trajectory {
    inventory: Vec<f64>,
    stockouts: Vec<f64>,
    capacity_ok: bool,
}

/// Inventory balance over the horizon. An order placed in control
/// period p arrives in period p + lead_time; demand in a period is
/// served from the start-of-period position, so a same-period arrival
/// helps the next period, not this one. Unmet demand becomes stockout
/// slack rather than negative inventory. Capacity is checked on every
/// position except the final one.
fn project_trajectory(
    initial: f64,
    orders: &[f64],
    forecast: &[f64],
    lead_time: usize,
    capacity: f64,
) -> Trajectory {
    let n = forecast.len();
    let mut inventory = vec![0.0; n + 1];
    let mut stockouts = vec![0.0; n];
    inventory[0] = initial;
    let mut capacity_ok = initial <= capacity;

    for t in 0..n {
        let arrival = if t >= lead_time {
            orders.get(t - lead_time).copied().unwrap_or(0.0)
        } else {
            0.0
        };
        stockouts[t] = (forecast[t] - inventory[t]).max(0.0);
        inventory[t + 1] = inventory[t] + arrival - forecast[t] + stockouts[t];
        if t + 1 < n && inventory[t + 1] > capacity {
            capacity_ok = false;
        }
    }

    Trajectory {
        inventory,
        stockouts,
        capacity_ok,
    }
}

struct PlanCosts {
    holding: f64,
    stockout: f64,
    ordering: f64,
    service_level: f64,
    service_penalty: f64,
}

impl PlanCosts {
    fn raw_total(&self) -> f64 {
        self.holding + self.stockout + self.ordering
    }

    fn objective(&self) -> f64 {
        self.raw_total() + self.service_penalty
    }
}

fn evaluate_costs(
    trajectory: &Trajectory,
    orders: &[f64],
    forecast: &[f64],
    daily_holding: f64,
    stockout_penalty: f64,
    order_cost: f64,
    service_target: f64,
) -> PlanCosts {
    let holding: f64 = trajectory.inventory[1..].iter().sum::<f64>() * daily_holding;
    let total_stockouts: f64 = trajectory.stockouts.iter().sum();
    let stockout = total_stockouts * stockout_penalty;
    let ordering = orders.iter().filter(|q| **q > 0.0).count() as f64 * order_cost;

    let total_demand: f64 = forecast.iter().sum();
    let service_level = 1.0 - total_stockouts / total_demand.max(1.0);
    let service_penalty = (service_target - service_level).max(0.0) * SERVICE_SHORTFALL_WEIGHT;

    PlanCosts {
        holding,
        stockout,
        ordering,
        service_level,
        service_penalty,
    }
}

/// Shrinks the order arriving at the first capacity violation.
/// Returns false when no order can absorb the excess.
fn reduce_first_violation(
    orders: &mut [f64],
    trajectory: &Trajectory,
    constraints: &ProductConstraints,
    capacity: f64,
) -> bool {
    let n = trajectory.stockouts.len();
    for idx in 0..n {
        if trajectory.inventory[idx] <= capacity {
            continue;
        }
        if idx == 0 {
            // Initial position already violates; nothing to shrink.
            return false;
        }
        // The arrival during period idx-1 produced this position.
        let arrival_period = idx - 1;
        if arrival_period < constraints.lead_time_days {
            return false;
        }
        let order_index = arrival_period - constraints.lead_time_days;
        if order_index >= orders.len() || orders[order_index] <= 0.0 {
            return false;
        }
        let excess = trajectory.inventory[idx] - capacity;
        let reduced = orders[order_index] - excess;
        orders[order_index] = if reduced < constraints.min_order_quantity {
            0.0
        } else {
            reduced
        };
        return true;
    }
    false
}

fn clamp_order(quantity: f64, constraints: &ProductConstraints) -> f64 {
    quantity
        .max(constraints.min_order_quantity)
        .min(constraints.max_order_quantity)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(lead: usize) -> ProductConstraints {
        ProductConstraints {
            unit_cost: 10.0,
            lead_time_days: lead,
            min_order_quantity: 5.0,
            max_order_quantity: 1_000.0,
        }
    }

    fn state(stock: i32, demand: Vec<f64>, lead: i32) -> TacticalState {
        TacticalState::new(Uuid::new_v4(), stock, 0, 0, demand, lead)
    }

    #[test]
    fn state_derives_features() {
        let s = TacticalState::new(Uuid::new_v4(), 100, 30, 10, vec![10.0; 14], 5);
        assert_eq!(s.available_stock, 70);
        assert!((s.avg_demand - 10.0).abs() < 1e-9);
        assert_eq!(s.demand_volatility, 0.0);
        assert!((s.stock_coverage - 7.0).abs() < 1e-9);
        // Lead-time demand 50 is fully covered by 70 available.
        assert_eq!(s.stockout_risk, 0.0);
        assert_eq!(s.to_vector()[9], 7.0);
    }

    #[test]
    fn stockout_risk_positive_when_undercovered() {
        let s = state(10, vec![20.0; 14], 5);
        // Lead-time demand 100 vs 10 available.
        assert!((s.stockout_risk - 4.5).abs() < 1e-9);
    }

    #[test]
    fn constrained_covers_demand_with_zero_lead() {
        let solver = ConstrainedPlanSolver::new();
        let forecast = vec![10.0; 7];
        let plan = solver
            .solve(&state(0, vec![10.0; 14], 0), &constraints(0), &forecast)
            .unwrap();
        assert_eq!(plan.status, PlanStatus::Optimal);
        assert!(plan.constraints_satisfied);
        assert!(plan.first_period_order() > 0.0);
        // Day one is always short: demand is served before the arrival lands.
        assert!(plan.predicted_stockouts[0] >= 10.0);
        assert!(plan.service_level > 0.5);
    }

    #[test]
    fn constrained_orders_nothing_when_stock_is_ample() {
        let solver = ConstrainedPlanSolver::new();
        let forecast = vec![10.0; 7];
        let plan = solver
            .solve(&state(1_000, vec![10.0; 14], 2), &constraints(2), &forecast)
            .unwrap();
        assert!(plan.order_quantities.iter().all(|q| *q == 0.0));
        assert_eq!(plan.predicted_stockouts.iter().sum::<f64>(), 0.0);
        assert!((plan.service_level - 1.0).abs() < 1e-9);
    }

    #[test]
    fn arrivals_respect_lead_time() {
        let solver = ConstrainedPlanSolver::new();
        let forecast = vec![10.0; 7];
        let plan = solver
            .solve(&state(0, vec![10.0; 14], 3), &constraints(3), &forecast)
            .unwrap();
        // Nothing can arrive before period 3, so the first three days
        // are stockouts no matter what is ordered.
        for t in 0..3 {
            assert!(plan.predicted_stockouts[t] >= 10.0 - 1e-9, "day {}", t);
        }
    }

    #[test]
    fn constrained_rejects_initial_stock_over_capacity() {
        let solver = ConstrainedPlanSolver::with_config(SolverConfig {
            warehouse_capacity: 100.0,
            ..SolverConfig::default()
        });
        let result = solver.solve(&state(500, vec![1.0; 14], 0), &constraints(0), &[1.0; 7]);
        assert!(result.is_err());
    }

    #[test]
    fn constrained_projection_stays_within_capacity() {
        let solver = ConstrainedPlanSolver::with_config(SolverConfig {
            warehouse_capacity: 60.0,
            ..SolverConfig::default()
        });
        let forecast = vec![10.0; 7];
        let plan = solver
            .solve(&state(20, vec![10.0; 14], 0), &constraints(0), &forecast)
            .unwrap();
        for (t, level) in plan.predicted_inventory[..forecast.len()].iter().enumerate() {
            assert!(*level <= 60.0 + 1e-9, "period {} holds {}", t, level);
        }
    }

    #[test]
    fn fallback_matches_solver_output_shape() {
        let forecast = vec![12.0; 7];
        let s = state(5, vec![12.0; 14], 1);
        let exact = ConstrainedPlanSolver::new()
            .solve(&s, &constraints(1), &forecast)
            .unwrap();
        let heuristic = HeuristicPlanSolver::new()
            .solve(&s, &constraints(1), &forecast)
            .unwrap();

        assert_eq!(heuristic.status, PlanStatus::HeuristicFallback);
        assert_eq!(
            heuristic.order_quantities.len(),
            exact.order_quantities.len()
        );
        assert_eq!(
            heuristic.predicted_inventory.len(),
            exact.predicted_inventory.len()
        );
        assert_eq!(
            heuristic.predicted_stockouts.len(),
            exact.predicted_stockouts.len()
        );
        assert_eq!(heuristic.demand_forecast.len(), exact.demand_forecast.len());
    }

    #[test]
    fn fallback_orders_when_position_hits_reorder_point() {
        let forecast = vec![10.0; 7];
        let plan = HeuristicPlanSolver::new()
            .solve(&state(0, vec![10.0; 14], 2), &constraints(2), &forecast)
            .unwrap();
        assert!(plan.first_period_order() >= 5.0);
    }

    #[test]
    fn fallback_reduces_orders_that_would_breach_capacity() {
        let solver = HeuristicPlanSolver::with_config(SolverConfig {
            warehouse_capacity: 50.0,
            ..SolverConfig::default()
        });
        let forecast = vec![2.0; 7];
        // High volatility inflates the heuristic order; capacity must cap it.
        let mut demand = vec![0.0; 7];
        demand.extend(vec![40.0; 7]);
        let plan = solver
            .solve(&state(10, demand, 1), &constraints(1), &forecast)
            .unwrap();
        assert!(plan.constraints_satisfied);
        for level in &plan.predicted_inventory[..forecast.len()] {
            assert!(*level <= 50.0 + 1e-9);
        }
    }

    #[test]
    fn empty_forecast_is_an_error_for_both_solvers() {
        let s = state(10, vec![1.0; 14], 1);
        assert!(ConstrainedPlanSolver::new()
            .solve(&s, &constraints(1), &[])
            .is_err());
        assert!(HeuristicPlanSolver::new()
            .solve(&s, &constraints(1), &[])
            .is_err());
    }

    #[test]
    fn z_score_table_covers_common_targets() {
        assert_eq!(service_level_z(0.99), 2.33);
        assert_eq!(service_level_z(0.975), 1.96);
        assert_eq!(service_level_z(0.95), 1.645);
        assert_eq!(service_level_z(0.90), 1.28);
    }
}
