//! Tasks, results and the vocabulary they share.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::payload::ToolPayload;

/// One requested tool invocation, as handed over by the upstream model turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Correlation id assigned by the caller (e.g. the model's tool-call id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolCall {
    /// Build a call; non-object `args` are replaced by an empty map.
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            args,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Responsibility category a task is routed to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    DataRetriever,
    Calculator,
    FinancialAnalyst,
    RiskAssessor,
    Validator,
    ComplianceChecker,
    Coordinator,
}

impl AgentRole {
    pub const ALL: [AgentRole; 7] = [
        AgentRole::DataRetriever,
        AgentRole::Calculator,
        AgentRole::FinancialAnalyst,
        AgentRole::RiskAssessor,
        AgentRole::Validator,
        AgentRole::ComplianceChecker,
        AgentRole::Coordinator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataRetriever => "data_retriever",
            Self::Calculator => "calculator",
            Self::FinancialAnalyst => "financial_analyst",
            Self::RiskAssessor => "risk_assessor",
            Self::Validator => "validator",
            Self::ComplianceChecker => "compliance_checker",
            Self::Coordinator => "coordinator",
        }
    }

    /// Parse the snake_case name used in configuration files.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution priority. Lower value runs in an earlier level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High = 1,
    Medium = 2,
    Low = 3,
}

impl TaskPriority {
    /// The plan level this priority maps to before promotion.
    pub fn level(self) -> u32 {
        self as u32
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Batch-unique task identifier of the form `task_<role>_<tool>_<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate(role: AgentRole, tool_name: &str) -> Self {
        Self(format!("task_{role}_{tool_name}_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

pub(crate) fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// A scheduled unit of work derived from one [`ToolCall`].
#[derive(Debug, Clone, Serialize)]
pub struct AgentTask {
    pub id: TaskId,
    pub role: AgentRole,
    pub tool_name: String,
    pub args: Map<String, Value>,
    pub priority: TaskPriority,
    /// Ids of tasks in the same batch that must complete first.
    pub dependencies: BTreeSet<TaskId>,
    pub status: TaskStatus,
    pub max_retries: u32,
    #[serde(rename = "timeout_secs", serialize_with = "serialize_secs")]
    pub timeout: Duration,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

/// Outcome of executing one task, including every retry.
///
/// `success` and `status` only change together: `succeeded` yields a
/// completed result, `failed` and [`AgentResult::reject`] a failed one.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub task_id: TaskId,
    pub role: AgentRole,
    pub tool_name: String,
    success: bool,
    pub payload: Option<ToolPayload>,
    status: TaskStatus,
    error_message: Option<String>,
    #[serde(rename = "execution_time", serialize_with = "serialize_secs")]
    pub execution_time: Duration,
    pub retry_count: u32,
    pub completed_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

impl AgentResult {
    pub fn succeeded(
        task: &AgentTask,
        payload: ToolPayload,
        execution_time: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            role: task.role,
            tool_name: task.tool_name.clone(),
            success: true,
            payload: Some(payload),
            status: TaskStatus::Completed,
            error_message: None,
            execution_time,
            retry_count,
            completed_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn failed(
        task: &AgentTask,
        error: impl Into<String>,
        execution_time: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            role: task.role,
            tool_name: task.tool_name.clone(),
            success: false,
            payload: None,
            status: TaskStatus::Failed,
            error_message: Some(error.into()),
            execution_time,
            retry_count,
            completed_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Flip a successful result to failed after the fact. The payload is kept
    /// for inspection.
    pub fn reject(&mut self, error: impl Into<String>) {
        self.success = false;
        self.status = TaskStatus::Failed;
        self.error_message = Some(error.into());
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(tool: &str) -> AgentTask {
        AgentTask {
            id: TaskId::generate(AgentRole::Calculator, tool),
            role: AgentRole::Calculator,
            tool_name: tool.to_string(),
            args: Map::new(),
            priority: TaskPriority::Medium,
            dependencies: BTreeSet::new(),
            status: TaskStatus::Pending,
            max_retries: 3,
            timeout: Duration::from_secs(30),
            created_at: Utc::now(),
            call_id: None,
        }
    }

    #[test]
    fn test_task_id_shape() {
        let id = TaskId::generate(AgentRole::RiskAssessor, "calculate_var");
        assert!(id.as_str().starts_with("task_risk_assessor_calculate_var_"));
        assert_ne!(id, TaskId::generate(AgentRole::RiskAssessor, "calculate_var"));
    }

    #[test]
    fn test_priority_ordering_and_levels() {
        assert!(TaskPriority::High < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::Low);
        assert_eq!(TaskPriority::High.level(), 1);
        assert_eq!(TaskPriority::Low.level(), 3);
    }

    #[test]
    fn test_role_names_round_trip_through_parse() {
        for role in AgentRole::ALL {
            assert_eq!(AgentRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(AgentRole::parse("planner"), None);
    }

    #[test]
    fn test_non_object_args_become_empty_map() {
        let call = ToolCall::new("get_financial_data", json!("oops"));
        assert!(call.args.is_empty());
        let call: ToolCall = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert!(call.args.is_empty());
        assert!(call.id.is_none());
    }

    #[test]
    fn test_success_and_status_move_together() {
        let t = task("calculate_metrics");
        let mut r = AgentResult::succeeded(
            &t,
            ToolPayload::Opaque(json!({"result": 1})),
            Duration::from_millis(5),
            0,
        );
        assert!(r.is_success());
        assert_eq!(r.status(), TaskStatus::Completed);

        r.reject("result failed validation");
        assert!(!r.is_success());
        assert_eq!(r.status(), TaskStatus::Failed);
        assert_eq!(r.error_message(), Some("result failed validation"));

        let f = AgentResult::failed(&t, "boom", Duration::ZERO, 3);
        assert!(!f.is_success());
        assert_eq!(f.status(), TaskStatus::Failed);
        assert!(f.payload.is_none());
    }
}
