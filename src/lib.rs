pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod overlay;
pub mod perception;
pub mod planner;
pub mod runner;
