/*!
 * # Inventory Replay Simulator
 *
 * Replays a reorder-point policy against a time-ordered demand sequence,
 * one day at a time, and accumulates holding, stockout, and ordering
 * costs. Strategic policy search calls this as its objective function,
 * so the replay is a pure function of its inputs: identical policy,
 * demand, and cost model always produce identical outcomes.
 */

use serde::{Deserialize, Serialize};

/// Weight applied to service-level shortfall in planning objectives.
pub const SERVICE_SHORTFALL_WEIGHT: f64 = 10_000.0;

/// A reorder-point policy parameter triple.
///
/// Values are kept as floats because candidates move through normalized
/// search space during optimization; they are rounded to whole units
/// before being persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyVector {
    pub reorder_point: f64,
    pub safety_stock: f64,
    pub order_quantity: f64,
}

impl PolicyVector {
    pub fn new(reorder_point: f64, safety_stock: f64, order_quantity: f64) -> Self {
        Self {
            reorder_point,
            safety_stock,
            order_quantity,
        }
    }

    /// Rounds each component to whole units, never below zero.
    pub fn rounded(&self) -> Self {
        Self {
            reorder_point: self.reorder_point.round().max(0.0),
            safety_stock: self.safety_stock.round().max(0.0),
            order_quantity: self.order_quantity.round().max(1.0),
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.reorder_point, self.safety_stock, self.order_quantity]
    }

    pub fn from_array(values: [f64; 3]) -> Self {
        Self {
            reorder_point: values[0],
            safety_stock: values[1],
            order_quantity: values[2],
        }
    }
}

/// Economic inputs for cost evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModel {
    /// Purchase cost per unit
    pub unit_cost: f64,
    /// Annual holding cost as a fraction of unit cost
    pub holding_cost_rate: f64,
    /// Penalty per unit of unmet demand
    pub stockout_penalty: f64,
    /// Fixed fee per order event
    pub order_cost: f64,
    /// Target fill-day fraction, e.g. 0.95
    pub target_service_level: f64,
    /// Weight applied to service-level shortfall in the objective
    pub service_penalty: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            unit_cost: 1.0,
            holding_cost_rate: 0.25,
            stockout_penalty: 10.0,
            order_cost: 50.0,
            target_service_level: 0.95,
            service_penalty: SERVICE_SHORTFALL_WEIGHT,
        }
    }
}

/// Outcome of replaying one policy against one demand sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub total_cost: f64,
    pub holding_cost: f64,
    pub stockout_cost: f64,
    pub ordering_cost: f64,
    /// Fraction of days fully served, in [0, 1]
    pub service_level: f64,
    pub stockout_days: u32,
    pub orders_placed: u32,
    /// total_cost plus the service-level shortfall penalty
    pub objective: f64,
}

/// Deterministic day-by-day policy replay.
#[derive(Debug, Clone)]
pub struct InventorySimulator {
    cost_model: CostModel,
}

impl InventorySimulator {
    pub fn new(cost_model: CostModel) -> Self {
        Self { cost_model }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    /// Replays `policy` against `demand`, one entry per day.
    ///
    /// Starting stock is safety_stock + order_quantity. Each day the
    /// reorder check runs first: at or below the reorder point, the
    /// order quantity is received immediately (lead time is the
    /// caller's concern). Demand is then fulfilled up to available
    /// stock, and holding cost accrues on the end-of-day position.
    /// A day with unmet demand counts as one stockout day regardless
    /// of shortfall size.
    pub fn replay(&self, policy: &PolicyVector, demand: &[f64]) -> SimulationOutcome {
        let mut stock = policy.safety_stock + policy.order_quantity;
        let mut holding_cost = 0.0;
        let mut stockout_cost = 0.0;
        let mut ordering_cost = 0.0;
        let mut stockout_days = 0u32;
        let mut orders_placed = 0u32;

        let daily_holding_rate =
            self.cost_model.unit_cost * self.cost_model.holding_cost_rate / 365.0;

        for &day_demand in demand {
            let day_demand = day_demand.max(0.0);

            if stock <= policy.reorder_point {
                stock += policy.order_quantity;
                ordering_cost += self.cost_model.order_cost;
                orders_placed += 1;
            }

            let fulfilled = day_demand.min(stock);
            stock -= fulfilled;

            if fulfilled < day_demand {
                stockout_days += 1;
                stockout_cost += (day_demand - fulfilled) * self.cost_model.stockout_penalty;
            }

            holding_cost += stock * daily_holding_rate;
        }

        let service_level = if demand.is_empty() {
            1.0
        } else {
            1.0 - stockout_days as f64 / demand.len() as f64
        };

        let total_cost = holding_cost + stockout_cost + ordering_cost;
        let shortfall = (self.cost_model.target_service_level - service_level).max(0.0);
        let objective = total_cost + shortfall * self.cost_model.service_penalty;

        SimulationOutcome {
            total_cost,
            holding_cost,
            stockout_cost,
            ordering_cost,
            service_level,
            stockout_days,
            orders_placed,
            objective,
        }
    }

    /// Objective-only shorthand for optimization loops.
    pub fn objective(&self, policy: &PolicyVector, demand: &[f64]) -> f64 {
        self.replay(policy, demand).objective
    }
}
