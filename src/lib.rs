//! Replenish Engine Library
//!
//! Two-tier inventory replenishment optimization over a relational
//! store: a strategic tier that searches reorder policies with a
//! Gaussian process surrogate, a tactical tier that plans short-horizon
//! orders and corrects them with an online-learned policy, and a
//! coordinator that supervises both on fixed cadences.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod ml;
pub mod scheduler;
pub mod services;

pub use config::{load_config, EngineConfig};
pub use errors::EngineError;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::db::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::scheduler::*;
    pub use crate::services::coordinator::CoordinatorService;
    pub use crate::services::strategic::StrategicService;
    pub use crate::services::tactical::TacticalService;
}
