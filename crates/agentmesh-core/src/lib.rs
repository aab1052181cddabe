//! agentmesh core library
//!
//! Plans and executes batches of tool calls requested by a language-model
//! turn: tasks are routed to agent roles, leveled by priority and
//! dependency, run with bounded parallelism, retries and timeouts, validated
//! per role, and summarised.

pub mod coordination;
pub mod obs;
pub mod telemetry;

pub use coordination::analytics::{
    AgentMetrics, AgentPerformanceRecord, AgentReport, PerformanceAnalyzer, PerformanceReport,
    PerformanceTrend,
};
pub use coordination::config::{
    CoordinatorConfig, ExecutionTunables, RoutingTable, ValidationRules,
};
pub use coordination::error::{
    CoordinationError, CoordinationResult, PlanWarning, ValidatorFault,
};
pub use coordination::orchestrator::{CoordinationRun, Orchestrator};
pub use coordination::payload::{
    AnalysisPayload, CalculationPayload, RiskPayload, ToolPayload,
};
pub use coordination::plan::{ExecutionPlan, Promotion, TaskManager};
pub use coordination::report::{execution_report, tool_messages, ToolMessage};
pub use coordination::summary::{ExecutionSummary, OrchestratorStatistics, PerformanceMetrics};
pub use coordination::task::{
    AgentResult, AgentRole, AgentTask, TaskId, TaskPriority, TaskStatus, ToolCall,
};
pub use coordination::tools::{AsyncTool, BlockingTool, ToolInvoker, ToolRegistry};
pub use coordination::validators::{
    CalculatorValidator, FinancialAnalystValidator, GenericValidator, ResultValidator,
    RiskAssessorValidator, ValidatorFactory,
};

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
