//! Dependency-aware, bounded-parallel coordination of tool batches.
//!
//! # Module layout
//!
//! - [`config`]: `CoordinatorConfig`, routing tables and execution tunables
//! - [`task`]: `ToolCall`, `AgentTask`, `AgentResult` and their enums
//! - [`payload`]: `ToolPayload` typed views over tool output
//! - [`plan`]: `TaskManager`, `ExecutionPlan`
//! - [`validators`]: `ResultValidator` and the per-role validators
//! - [`tools`]: `ToolInvoker`, `ToolRegistry` and the async/blocking adapters
//! - [`orchestrator`]: `Orchestrator::coordinate`
//! - [`summary`]: `ExecutionSummary`, `OrchestratorStatistics`
//! - [`analytics`]: run history and per-role metrics
//! - [`report`]: tool messages and the text execution report
//! - [`error`]: `CoordinationError`, `PlanWarning`

pub mod analytics;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod plan;
pub mod report;
pub mod summary;
pub mod task;
pub mod tools;
pub mod validators;
