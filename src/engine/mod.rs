pub mod aggregator;
pub mod cascade;
pub mod context;
pub mod executor;
pub mod metrics;
pub mod pivots;
pub mod simulator;
pub mod timeline;
