//! Stepflow - in-process workflow orchestration engine
//!
//! Registers named workflows of sequential steps, runs them through a
//! pluggable step executor, triggers them on interval schedules and keeps
//! aggregate metrics plus a bounded audit history of finished runs.

pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod executors;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod registry;
pub mod scheduler;
