//! Broker Health Agent
//!
//! Polls an alerting backend for firing alerts and Prometheus-compatible
//! endpoints for raw samples, evaluates declarative bound rules against a
//! bounded sample history, and folds every signal into one explainable
//! health verdict per monitored element plus a global status.
//!
//! # Design Principles
//! - Deterministic: bound evaluation is a pure function of a store snapshot
//! - Isolated failures: one unreachable endpoint never blocks the tick
//! - Explainable: every violated or undecidable bit carries its cause

pub mod client;
pub mod config;
pub mod engine;
pub mod handler;
pub mod store;

// Re-export contracts
#[path = "../contracts/mod.rs"]
pub mod contracts;

pub use config::{Config, ConfigError};
pub use contracts::*;
pub use engine::HealthEngine;
