//! Error and warning types for tool-batch coordination.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::task::AgentRole;

/// Errors produced while planning or executing a tool batch.
///
/// Task-level variants (`ToolNotFound`, `ExecutionTimeout`,
/// `ExecutionException`, `ValidationFailure`) never escape the orchestrator;
/// they are rendered into the `error_message` of a failed result.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("tool not found: {tool_name}")]
    ToolNotFound { tool_name: String },

    #[error("tool '{tool_name}' timed out after {timeout_secs}s")]
    ExecutionTimeout { tool_name: String, timeout_secs: u64 },

    #[error("tool '{tool_name}' failed: {message}")]
    ExecutionException { tool_name: String, message: String },

    #[error("result of tool '{tool_name}' failed validation")]
    ValidationFailure { tool_name: String },

    #[error("duplicate tool registration: {tool_name}")]
    DuplicateTool { tool_name: String },

    #[error("invalid tool call at index {index}: {reason}")]
    InvalidToolCall { index: usize, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for coordination operations.
pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

/// A validator could not reach a verdict.
///
/// The orchestrator keeps the result unchanged when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validator for role {role} faulted: {detail}")]
pub struct ValidatorFault {
    pub role: AgentRole,
    pub detail: String,
}

impl ValidatorFault {
    pub fn new(role: AgentRole, detail: impl Into<String>) -> Self {
        Self {
            role,
            detail: detail.into(),
        }
    }
}

/// Advisory findings about an execution plan. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// A dependency chain starting at the first id returns to it.
    CircularDependency { task_ids: Vec<String> },
    /// Tools with configured prerequisites whose prerequisites are all absent.
    OrphanedTasks { tool_names: Vec<String> },
    /// More tasks than the configured overload threshold.
    Overloaded { total_tasks: usize, threshold: usize },
    /// A dependent was moved past a dependency that shared its level.
    TaskPromoted {
        task_id: String,
        tool_name: String,
        from_level: u32,
        to_level: u32,
    },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircularDependency { task_ids } => {
                write!(f, "circular dependency detected: {}", task_ids.join(" -> "))
            }
            Self::OrphanedTasks { tool_names } => {
                write!(f, "orphaned tasks detected: {}", tool_names.join(", "))
            }
            Self::Overloaded {
                total_tasks,
                threshold,
            } => write!(
                f,
                "large number of tasks ({total_tasks}) exceeds threshold {threshold}; consider optimization"
            ),
            Self::TaskPromoted {
                task_id,
                tool_name,
                from_level,
                to_level,
            } => write!(
                f,
                "task {task_id} ({tool_name}) promoted from level {from_level} to level {to_level}"
            ),
        }
    }
}
