pub mod demand_record;
pub mod inventory_action;
pub mod inventory_level;
pub mod optimization_run;
pub mod performance_metric;
pub mod policy_parameters;
pub mod product;
