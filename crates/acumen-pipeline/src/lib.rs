//! Pipeline execution engine for Acumen queries.
//!
//! This crate implements the core query runner: the agent registry and field
//! contracts, plan compilation, stage-by-stage execution with retries,
//! timeouts, and cancellation, collaborator enrichment, result aggregation,
//! post-aggregation validation, the audit log, and lifecycle events.

pub mod agent;
pub mod aggregator;
pub mod audit;
pub mod compiler;
pub mod engine;
pub mod events;
pub mod retry;
pub mod stages;
pub mod validation;

pub use agent::{default_registry, Agent, AgentRegistry, DynAgent};
pub use aggregator::aggregate;
pub use audit::AuditLog;
pub use compiler::{compile, ExecutionPlan, PlannedStage};
pub use engine::{EngineConfig, QueryEngine};
pub use events::{EventEmitter, QueryEvent};
pub use retry::{execute_with_retry, BackoffPolicy};
pub use stages::{ExtractionAgent, ForecastingAgent, MonitoringAgent};
pub use validation::apply_validation;
