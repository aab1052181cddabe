//! Level-by-level execution of a tool batch.
//!
//! The coordinating flow owns the completed set and the result list and only
//! touches them between levels. Within a level every ready task runs on its
//! own tokio task, with at most
//! [`ExecutionTunables::max_parallel_tasks`](super::config::ExecutionTunables)
//! in flight (a limit of zero is treated as one).

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{error, instrument, warn, Instrument};
use uuid::Uuid;

use crate::obs;

use super::analytics::{AgentMetrics, AgentReport, PerformanceAnalyzer, PerformanceReport};
use super::config::CoordinatorConfig;
use super::error::{CoordinationError, PlanWarning};
use super::payload::ToolPayload;
use super::plan::{ExecutionPlan, TaskManager};
use super::summary::{ExecutionSummary, OrchestratorStatistics};
use super::task::{AgentResult, AgentRole, AgentTask, TaskId, TaskStatus, ToolCall};
use super::tools::{ToolInvoker, ToolRegistry};
use super::validators::ValidatorFactory;

/// Argument key holding `{dependency_task_id: result}` for completed dependencies.
pub const DEPENDENCY_RESULTS_KEY: &str = "dependency_results";

/// Argument key carrying one dependency's result, keyed by its tool name.
pub fn dependency_result_key(tool_name: &str) -> String {
    format!("dependency_{tool_name}_result")
}

/// Everything one run produced, for callers that need more than the summary.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationRun {
    pub run_id: String,
    pub summary: ExecutionSummary,
    /// Results in level order, then in plan order within a level.
    pub results: Vec<AgentResult>,
    /// Tasks that never became ready (failed or cyclic dependencies).
    pub skipped: Vec<AgentTask>,
    pub plan_warnings: Vec<PlanWarning>,
}

#[derive(Debug, Default)]
struct RunHistory {
    stats: OrchestratorStatistics,
    analyzer: PerformanceAnalyzer,
    agents: AgentMetrics,
}

/// Executes tool batches against a [`ToolRegistry`].
///
/// Safe to share (`Arc<Orchestrator>`) across concurrent runs; the rolling
/// statistics sit behind an async mutex.
pub struct Orchestrator {
    config: Arc<CoordinatorConfig>,
    task_manager: TaskManager,
    registry: Arc<ToolRegistry>,
    validators: ValidatorFactory,
    history: Mutex<RunHistory>,
}

impl Orchestrator {
    pub fn new(config: Arc<CoordinatorConfig>, registry: ToolRegistry) -> Self {
        Self {
            task_manager: TaskManager::new(Arc::clone(&config)),
            validators: ValidatorFactory::from_config(&config),
            registry: Arc::new(registry),
            history: Mutex::new(RunHistory::default()),
            config,
        }
    }

    pub fn with_validators(mut self, validators: ValidatorFactory) -> Self {
        self.validators = validators;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run a batch and return its summary. Never fails: problems surface as
    /// failed tasks and entries in `errors`.
    pub async fn coordinate(&self, tool_calls: &[ToolCall]) -> ExecutionSummary {
        self.coordinate_detailed(tool_calls).await.summary
    }

    /// Like [`coordinate`](Self::coordinate), also returning individual
    /// results, skipped tasks and plan warnings.
    pub async fn coordinate_detailed(&self, tool_calls: &[ToolCall]) -> CoordinationRun {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        self.run(run_id, tool_calls).instrument(span).await
    }

    pub async fn statistics(&self) -> OrchestratorStatistics {
        self.history.lock().await.stats.clone()
    }

    pub async fn performance_report(&self, last_n: usize) -> Option<PerformanceReport> {
        self.history.lock().await.analyzer.report(last_n)
    }

    pub async fn agent_report(&self, role: AgentRole) -> Option<AgentReport> {
        self.history.lock().await.agents.report(role)
    }

    async fn run(&self, run_id: String, tool_calls: &[ToolCall]) -> CoordinationRun {
        let started = Instant::now();
        obs::emit_run_started(&run_id, tool_calls.len());

        let mut plan = match self.task_manager.plan(tool_calls) {
            Ok(plan) => plan,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "plan construction failed");
                return CoordinationRun {
                    summary: ExecutionSummary::aborted(tool_calls.len(), e.to_string(), started.elapsed()),
                    run_id,
                    results: Vec::new(),
                    skipped: Vec::new(),
                    plan_warnings: Vec::new(),
                };
            }
        };

        obs::emit_plan_built(
            &run_id,
            plan.levels().len(),
            plan.total_tasks,
            plan.estimated_time,
        );
        let plan_warnings = self.task_manager.validate_plan(&plan);
        for warning in &plan_warnings {
            obs::emit_plan_warning(&run_id, warning);
        }

        let mut results = self.execute_plan(&run_id, &mut plan).await;
        self.validate_results(&mut plan, &mut results);

        let skipped = mark_skipped(&mut plan);

        let elapsed = started.elapsed();
        let summary = ExecutionSummary::from_results(&results, elapsed);
        {
            let mut history = self.history.lock().await;
            history.stats.record(&summary, elapsed);
            history.analyzer.record(summary.clone());
            for r in &results {
                history.agents.record(r);
            }
        }

        obs::emit_run_finished(
            &run_id,
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            summary.successful_tasks(),
            summary.failed_tasks(),
        );

        CoordinationRun {
            run_id,
            summary,
            results,
            skipped,
            plan_warnings,
        }
    }

    async fn execute_plan(&self, run_id: &str, plan: &mut ExecutionPlan) -> Vec<AgentResult> {
        let mut completed: HashSet<TaskId> = HashSet::new();
        let mut results: Vec<AgentResult> = Vec::with_capacity(plan.total_tasks);

        for level in plan.level_numbers() {
            let ready = plan.ready_tasks(level, &completed);
            let level_size = plan.levels().get(&level).map(Vec::len).unwrap_or(0);
            obs::emit_level_started(run_id, level, ready.len(), level_size - ready.len());
            if ready.is_empty() {
                continue;
            }

            let by_id: HashMap<&TaskId, &AgentResult> =
                results.iter().map(|r| (&r.task_id, r)).collect();
            let prepared: Vec<PreparedTask> = ready
                .into_iter()
                .map(|task| PreparedTask::new(task, &by_id))
                .collect();

            for result in self.execute_level(plan, level, prepared).await {
                if result.is_success() {
                    completed.insert(result.task_id.clone());
                }
                results.push(result);
            }
        }
        results
    }

    /// Run one level with at most `max_parallel_tasks` tasks in flight. A task
    /// is marked running when it is spawned and settled as soon as it
    /// finishes, so the plan never shows more running tasks than the limit.
    #[instrument(skip(self, plan, prepared), fields(tasks = prepared.len()))]
    async fn execute_level(
        &self,
        plan: &mut ExecutionPlan,
        level: u32,
        prepared: Vec<PreparedTask>,
    ) -> Vec<AgentResult> {
        let limit = self.config.execution.max_parallel_tasks.max(1);
        let backoff = self.config.execution.retry_backoff();

        let mut slots: Vec<Option<AgentResult>> = Vec::with_capacity(prepared.len());
        slots.resize_with(prepared.len(), || None);
        let mut in_flight = FuturesUnordered::new();

        for (index, p) in prepared.into_iter().enumerate() {
            while in_flight.len() >= limit {
                if let Some((i, result)) = in_flight.next().await {
                    settle(plan, &mut slots, i, result);
                }
            }

            let task = p.task.clone();
            let invoker = self.registry.get(&task.tool_name);
            plan.set_status(&task.id, TaskStatus::Running);
            let handle = tokio::spawn(run_task(p, invoker, backoff).in_current_span());
            in_flight.push(async move { (index, joined_result(task, handle.await)) });
        }

        while let Some((i, result)) = in_flight.next().await {
            settle(plan, &mut slots, i, result);
        }
        slots.into_iter().flatten().collect()
    }

    /// Post-execution checks. A rejection fails the result but never retries
    /// the tool; a validator fault or panic keeps the result as it was.
    fn validate_results(&self, plan: &mut ExecutionPlan, results: &mut [AgentResult]) {
        for result in results.iter_mut().filter(|r| r.is_success()) {
            let validator = self.validators.validator_for(result.role);
            let verdict =
                std::panic::catch_unwind(AssertUnwindSafe(|| validator.validate(&*result)));
            match verdict {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    obs::emit_validation_rejected(result.task_id.as_str(), &result.tool_name);
                    let err = CoordinationError::ValidationFailure {
                        tool_name: result.tool_name.clone(),
                    };
                    result.reject(err.to_string());
                    plan.set_status(&result.task_id, TaskStatus::Failed);
                }
                Ok(Err(fault)) => {
                    warn!(task_id = %result.task_id, error = %fault, "validator fault; keeping result");
                }
                Err(_) => {
                    warn!(task_id = %result.task_id, "validator panicked; keeping result");
                }
            }
        }
    }
}

/// A ready task with its dependency-enriched arguments.
struct PreparedTask {
    task: AgentTask,
    args: Map<String, Value>,
    dependencies_used: Vec<String>,
}

impl PreparedTask {
    /// Copy the task's arguments and add the payloads of its successful
    /// dependencies.
    fn new(task: AgentTask, completed: &HashMap<&TaskId, &AgentResult>) -> Self {
        let mut args = task.args.clone();
        let mut dependency_results = Map::new();
        let mut dependencies_used = Vec::new();

        for dep in &task.dependencies {
            let Some(result) = completed.get(dep).filter(|r| r.is_success()) else {
                continue;
            };
            let value = result
                .payload
                .as_ref()
                .map(ToolPayload::to_value)
                .unwrap_or(Value::Null);
            args.insert(dependency_result_key(&result.tool_name), value.clone());
            dependency_results.insert(dep.to_string(), value);
            dependencies_used.push(dep.to_string());
        }
        if !dependency_results.is_empty() {
            args.insert(
                DEPENDENCY_RESULTS_KEY.to_string(),
                Value::Object(dependency_results),
            );
        }

        Self {
            task,
            args,
            dependencies_used,
        }
    }
}

/// Invoke one task with timeout and retries. Always yields a result.
async fn run_task(
    prepared: PreparedTask,
    invoker: Option<Arc<dyn ToolInvoker>>,
    backoff: Duration,
) -> AgentResult {
    let PreparedTask {
        task,
        args,
        dependencies_used,
    } = prepared;
    let started = Instant::now();
    let enriched = args.len().saturating_sub(task.args.len());
    let annotate = |r: AgentResult| {
        r.with_metadata("enriched_args_count", Value::from(enriched))
            .with_metadata("dependencies_used", Value::from(dependencies_used.clone()))
    };

    let Some(invoker) = invoker else {
        let err = CoordinationError::ToolNotFound {
            tool_name: task.tool_name.clone(),
        };
        obs::emit_task_failed(task.id.as_str(), &task.tool_name, 0, &err);
        return annotate(AgentResult::failed(&task, err.to_string(), started.elapsed(), 0));
    };

    let mut retries: u32 = 0;
    loop {
        let err = match tokio::time::timeout(task.timeout, invoker.invoke(args.clone())).await {
            Ok(Ok(value)) => {
                let payload = ToolPayload::classify(task.role, value);
                return annotate(AgentResult::succeeded(
                    &task,
                    payload,
                    started.elapsed(),
                    retries,
                ));
            }
            Ok(Err(e)) => CoordinationError::ExecutionException {
                tool_name: task.tool_name.clone(),
                message: format!("{e:#}"),
            },
            Err(_) => CoordinationError::ExecutionTimeout {
                tool_name: task.tool_name.clone(),
                timeout_secs: task.timeout.as_secs(),
            },
        };

        if retries >= task.max_retries {
            obs::emit_task_failed(task.id.as_str(), &task.tool_name, retries, &err);
            return annotate(AgentResult::failed(
                &task,
                err.to_string(),
                started.elapsed(),
                retries,
            ));
        }
        retries += 1;
        obs::emit_task_retrying(task.id.as_str(), &task.tool_name, retries, &err);
        tokio::time::sleep(backoff).await;
    }
}

fn settle(
    plan: &mut ExecutionPlan,
    slots: &mut [Option<AgentResult>],
    index: usize,
    result: AgentResult,
) {
    plan.set_status(&result.task_id, result.status());
    slots[index] = Some(result);
}

/// A spawned task that panicked or was cancelled still yields a failed result.
fn joined_result(task: AgentTask, joined: Result<AgentResult, JoinError>) -> AgentResult {
    match joined {
        Ok(result) => result,
        Err(e) => {
            let err = CoordinationError::ExecutionException {
                tool_name: task.tool_name.clone(),
                message: format!("task aborted: {e}"),
            };
            obs::emit_task_failed(task.id.as_str(), &task.tool_name, 0, &err);
            AgentResult::failed(&task, err.to_string(), Duration::ZERO, 0)
        }
    }
}

/// Mark every still-pending task as skipped and return them.
fn mark_skipped(plan: &mut ExecutionPlan) -> Vec<AgentTask> {
    let pending: Vec<AgentTask> = plan
        .tasks()
        .filter(|t| t.status == TaskStatus::Pending)
        .cloned()
        .collect();
    for task in &pending {
        obs::emit_task_skipped(task.id.as_str(), &task.tool_name);
        plan.set_status(&task.id, TaskStatus::Skipped);
    }
    pending
        .into_iter()
        .map(|mut t| {
            t.status = TaskStatus::Skipped;
            t
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::config::ExecutionTunables;
    use serde_json::json;

    fn sleeping_registry(names: &[String]) -> ToolRegistry {
        let mut registry = ToolRegistry::default();
        for name in names {
            registry
                .register_async(name.clone(), |_| async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, anyhow::Error>(json!({"ok": true}))
                })
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_running_tasks_never_exceed_the_limit() {
        let names: Vec<String> = (0..5).map(|i| format!("fetch_{i}")).collect();
        let config = CoordinatorConfig::default().with_execution(ExecutionTunables {
            max_parallel_tasks: 2,
            ..ExecutionTunables::default()
        });
        let orch = Orchestrator::new(Arc::new(config), sleeping_registry(&names));
        let calls: Vec<ToolCall> = names
            .iter()
            .map(|n| ToolCall::new(n.as_str(), json!({})))
            .collect();

        let mut plan = orch.task_manager().plan(&calls).unwrap();
        let results = orch.execute_plan("run-limit", &mut plan).await;

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(AgentResult::is_success));
        assert_eq!(plan.peak_running(), 2);
        assert_eq!(plan.running_count(), 0);
    }

    #[tokio::test]
    async fn test_results_keep_plan_order_within_a_level() {
        let names: Vec<String> = (0..4).map(|i| format!("fetch_{i}")).collect();
        let orch = Orchestrator::new(
            Arc::new(CoordinatorConfig::default()),
            sleeping_registry(&names),
        );
        let calls: Vec<ToolCall> = names
            .iter()
            .map(|n| ToolCall::new(n.as_str(), json!({})))
            .collect();

        let mut plan = orch.task_manager().plan(&calls).unwrap();
        let expected: Vec<TaskId> = plan.tasks().map(|t| t.id.clone()).collect();
        let results = orch.execute_plan("run-order", &mut plan).await;

        let got: Vec<TaskId> = results.iter().map(|r| r.task_id.clone()).collect();
        assert_eq!(got, expected);
    }
}
