//! Routing tables and execution tunables.
//!
//! A [`CoordinatorConfig`] is built once (defaults, file, env) and shared
//! read-only by the task manager and the orchestrator. Every table may be
//! replaced wholesale from TOML or JSON; missing sections keep their defaults.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{CoordinationError, CoordinationResult};
use super::task::{AgentRole, TaskPriority};

pub const DEFAULT_MAX_PARALLEL_TASKS: usize = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_BLOCKING_POOL_SIZE: usize = 8;
pub const DEFAULT_OVERLOAD_THRESHOLD: usize = 20;

/// Role used for tools missing from the routing table.
pub const DEFAULT_ROLE: AgentRole = AgentRole::DataRetriever;
/// Priority used for roles missing from the priority table.
pub const DEFAULT_PRIORITY: TaskPriority = TaskPriority::Medium;

/// Field rules a role's validator enforces on result payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub required_fields: Vec<String>,
    /// Fields that, when present, must hold finite numbers.
    pub numeric_fields: Vec<String>,
}

impl ValidationRules {
    pub fn new<const R: usize, const N: usize>(required: [&str; R], numeric: [&str; N]) -> Self {
        Self {
            required_fields: required.iter().map(|f| (*f).to_string()).collect(),
            numeric_fields: numeric.iter().map(|f| (*f).to_string()).collect(),
        }
    }
}

/// Declarative routing: who runs a tool, how early, and after what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingTable {
    pub tool_roles: BTreeMap<String, AgentRole>,
    pub role_priorities: BTreeMap<AgentRole, TaskPriority>,
    /// Tool name → names of tools that must run first when present in a batch.
    pub prerequisites: BTreeMap<String, Vec<String>>,
    pub validation_rules: BTreeMap<AgentRole, ValidationRules>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        use AgentRole::*;

        let tool_roles = [
            ("get_financial_data", DataRetriever),
            ("get_market_data", DataRetriever),
            ("get_company_info", DataRetriever),
            ("search_transactions", DataRetriever),
            ("calculate_metrics", Calculator),
            ("calculate_ratios", Calculator),
            ("calculate_returns", Calculator),
            ("calculate_valuation", Calculator),
            ("analyze_portfolio", FinancialAnalyst),
            ("analyze_performance", FinancialAnalyst),
            ("generate_insights", FinancialAnalyst),
            ("comparative_analysis", FinancialAnalyst),
            ("risk_assessment", RiskAssessor),
            ("calculate_var", RiskAssessor),
            ("stress_testing", RiskAssessor),
            ("validate_transaction", Validator),
            ("data_quality_check", Validator),
            ("compliance_check", ComplianceChecker),
            ("regulatory_validation", ComplianceChecker),
        ]
        .into_iter()
        .map(|(tool, role)| (tool.to_string(), role))
        .collect();

        let role_priorities = [
            (DataRetriever, TaskPriority::High),
            (Calculator, TaskPriority::Medium),
            (FinancialAnalyst, TaskPriority::Medium),
            (RiskAssessor, TaskPriority::Medium),
            (Validator, TaskPriority::Low),
            (ComplianceChecker, TaskPriority::Low),
            (Coordinator, TaskPriority::High),
        ]
        .into_iter()
        .collect();

        let prerequisite_table: [(&str, &[&str]); 11] = [
            ("calculate_metrics", &["get_financial_data"]),
            ("calculate_ratios", &["get_financial_data"]),
            ("calculate_returns", &["get_financial_data"]),
            ("analyze_portfolio", &["get_financial_data", "calculate_metrics"]),
            ("analyze_performance", &["calculate_returns", "get_market_data"]),
            ("comparative_analysis", &["get_financial_data", "get_market_data"]),
            ("risk_assessment", &["analyze_portfolio", "calculate_metrics"]),
            ("calculate_var", &["get_financial_data", "calculate_returns"]),
            ("stress_testing", &["analyze_portfolio", "risk_assessment"]),
            ("validate_transaction", &["calculate_metrics"]),
            ("compliance_check", &["analyze_portfolio", "risk_assessment"]),
        ];
        let prerequisites = prerequisite_table
            .into_iter()
            .map(|(tool, deps)| {
                (
                    tool.to_string(),
                    deps.iter().map(|d| (*d).to_string()).collect(),
                )
            })
            .collect();

        let validation_rules = [
            (
                FinancialAnalyst,
                ValidationRules::new(
                    ["status", "data", "analysis"],
                    ["value", "percentage", "ratio"],
                ),
            ),
            (
                Calculator,
                ValidationRules::new(["status", "result"], ["value", "amount", "total"]),
            ),
            (
                RiskAssessor,
                ValidationRules::new(
                    ["status", "risk_level", "metrics"],
                    ["var", "volatility", "beta"],
                ),
            ),
        ]
        .into_iter()
        .collect();

        Self {
            tool_roles,
            role_priorities,
            prerequisites,
            validation_rules,
        }
    }
}

/// Limits applied while executing a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionTunables {
    /// Maximum tasks in flight within one level.
    pub max_parallel_tasks: usize,
    pub default_timeout_secs: u64,
    pub max_retries: u32,
    /// Fixed pause between attempts of the same task.
    pub retry_backoff_ms: u64,
    /// Worker slots shared by all blocking tools.
    pub blocking_pool_size: usize,
    /// Plans with more tasks than this get an overload warning.
    pub overload_threshold: usize,
}

impl Default for ExecutionTunables {
    fn default() -> Self {
        Self {
            max_parallel_tasks: DEFAULT_MAX_PARALLEL_TASKS,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            blocking_pool_size: DEFAULT_BLOCKING_POOL_SIZE,
            overload_threshold: DEFAULT_OVERLOAD_THRESHOLD,
        }
    }
}

impl ExecutionTunables {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Complete coordinator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub routing: RoutingTable,
    pub execution: ExecutionTunables,
}

impl CoordinatorConfig {
    /// Role for a tool, or [`DEFAULT_ROLE`] for unknown tools.
    pub fn role_for(&self, tool_name: &str) -> AgentRole {
        self.routing
            .tool_roles
            .get(tool_name)
            .copied()
            .unwrap_or(DEFAULT_ROLE)
    }

    pub fn priority_for(&self, role: AgentRole) -> TaskPriority {
        self.routing
            .role_priorities
            .get(&role)
            .copied()
            .unwrap_or(DEFAULT_PRIORITY)
    }

    pub fn prerequisites_for(&self, tool_name: &str) -> &[String] {
        self.routing
            .prerequisites
            .get(tool_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rules for a role; roles without an entry get empty rules.
    pub fn validation_rules_for(&self, role: AgentRole) -> ValidationRules {
        self.routing
            .validation_rules
            .get(&role)
            .cloned()
            .unwrap_or_default()
    }

    pub fn with_tool_role(mut self, tool_name: impl Into<String>, role: AgentRole) -> Self {
        self.routing.tool_roles.insert(tool_name.into(), role);
        self
    }

    pub fn with_role_priority(mut self, role: AgentRole, priority: TaskPriority) -> Self {
        self.routing.role_priorities.insert(role, priority);
        self
    }

    pub fn with_prerequisites<const N: usize>(
        mut self,
        tool_name: impl Into<String>,
        prerequisites: [&str; N],
    ) -> Self {
        self.routing.prerequisites.insert(
            tool_name.into(),
            prerequisites.iter().map(|p| (*p).to_string()).collect(),
        );
        self
    }

    pub fn with_validation_rules(mut self, role: AgentRole, rules: ValidationRules) -> Self {
        self.routing.validation_rules.insert(role, rules);
        self
    }

    pub fn with_execution(mut self, execution: ExecutionTunables) -> Self {
        self.execution = execution;
        self
    }

    pub fn from_toml_str(s: &str) -> CoordinationResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> CoordinationResult<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file, chosen by extension.
    pub fn load_from_file(path: &Path) -> CoordinationResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&raw),
            Some("json") => Self::from_json_str(&raw),
            other => Err(CoordinationError::Config(format!(
                "unsupported config extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    /// Apply `AGENTMESH_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// logged and ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key = key, value = %raw, "ignoring unparseable config override");
                    None
                }
            }
        }

        let exec = &mut self.execution;
        if let Some(v) = parse(&lookup, "AGENTMESH_MAX_PARALLEL_TASKS") {
            exec.max_parallel_tasks = v;
        }
        if let Some(v) = parse(&lookup, "AGENTMESH_DEFAULT_TIMEOUT_SECS") {
            exec.default_timeout_secs = v;
        }
        if let Some(v) = parse(&lookup, "AGENTMESH_MAX_RETRIES") {
            exec.max_retries = v;
        }
        if let Some(v) = parse(&lookup, "AGENTMESH_RETRY_BACKOFF_MS") {
            exec.retry_backoff_ms = v;
        }
        self
    }

    pub fn validate(&self) -> CoordinationResult<()> {
        if self.execution.max_parallel_tasks == 0 {
            return Err(CoordinationError::Config(
                "max_parallel_tasks must be at least 1".into(),
            ));
        }
        if self.execution.blocking_pool_size == 0 {
            return Err(CoordinationError::Config(
                "blocking_pool_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Render as TOML, e.g. for `agentmesh config`.
    pub fn to_toml_string(&self) -> CoordinationResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoordinationError::Config(e.to_string()))
    }
}
