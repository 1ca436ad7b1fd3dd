/*!
 * # Optimization and Learning Module
 *
 * Numerical core of the replenishment engine: the day-by-day inventory
 * replay simulator, the Gaussian process surrogate behind strategic
 * policy search, short-horizon demand forecasting, the finite-horizon
 * order plan solver, and the online learning policy that corrects
 * solver output.
 */

/// Deterministic inventory replay used as the strategic objective evaluator
pub mod simulator;

/// Gaussian process surrogate and expected-improvement acquisition
pub mod surrogate;

/// Short-horizon demand forecasting (trend + weekday seasonality)
pub mod forecast;

/// Finite-horizon order plan solver with heuristic fallback
pub mod solver;

/// Online learning policy for order-quantity correction
pub mod policy;
