// Optimization tiers
pub mod strategic;
pub mod tactical;

// Cross-tier supervision
pub mod coordinator;
