//! Turning a flat batch of tool calls into a leveled execution plan.
//!
//! Tasks are grouped into levels by priority. A dependent that would share a
//! level with (or precede) one of its dependencies is promoted to the level
//! right after it, so every in-batch dependency runs in an earlier level.
//! Tasks caught in a dependency cycle are left where their priority put them;
//! they can never become ready and are reported by [`TaskManager::validate_plan`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::config::CoordinatorConfig;
use super::error::{CoordinationError, CoordinationResult, PlanWarning};
use super::task::{AgentRole, AgentTask, TaskId, TaskStatus, ToolCall};

/// Speed-up applied to estimates of multi-task batches.
const PARALLEL_SPEEDUP: f64 = 0.7;

/// Rough wall-clock cost of one task, in seconds.
fn role_time_estimate(role: AgentRole) -> f64 {
    match role {
        AgentRole::DataRetriever => 2.0,
        AgentRole::Calculator => 1.0,
        AgentRole::FinancialAnalyst => 3.0,
        AgentRole::RiskAssessor => 4.0,
        AgentRole::Validator => 1.5,
        AgentRole::ComplianceChecker => 2.5,
        AgentRole::Coordinator => 2.0,
    }
}

/// A dependent moved to a later level than its priority asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Promotion {
    pub task_id: TaskId,
    pub tool_name: String,
    pub from_level: u32,
    pub to_level: u32,
}

/// Tasks grouped into levels that execute in ascending order.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    levels: BTreeMap<u32, Vec<AgentTask>>,
    pub total_tasks: usize,
    /// Estimated wall-clock duration in seconds.
    pub estimated_time: f64,
    pub created_at: DateTime<Utc>,
    promotions: Vec<Promotion>,
    /// Most tasks ever in `Running` at once.
    #[serde(skip)]
    peak_running: usize,
}

impl ExecutionPlan {
    pub fn levels(&self) -> &BTreeMap<u32, Vec<AgentTask>> {
        &self.levels
    }

    pub fn level_numbers(&self) -> Vec<u32> {
        self.levels.keys().copied().collect()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &AgentTask> {
        self.levels.values().flatten()
    }

    pub fn task(&self, id: &TaskId) -> Option<&AgentTask> {
        self.tasks().find(|t| &t.id == id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.task(id).is_some()
    }

    pub fn promotions(&self) -> &[Promotion] {
        &self.promotions
    }

    pub fn is_empty(&self) -> bool {
        self.total_tasks == 0
    }

    /// Pending tasks of `level` whose in-plan dependencies have all completed.
    /// Dependency ids that are not part of this plan are ignored.
    pub fn ready_tasks(&self, level: u32, completed: &HashSet<TaskId>) -> Vec<AgentTask> {
        let Some(tasks) = self.levels.get(&level) else {
            return Vec::new();
        };
        tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.dependencies
                    .iter()
                    .all(|d| completed.contains(d) || !self.contains(d))
            })
            .cloned()
            .collect()
    }

    pub fn set_status(&mut self, id: &TaskId, status: TaskStatus) {
        if let Some(task) = self.levels.values_mut().flatten().find(|t| &t.id == id) {
            task.status = status;
        }
        if status == TaskStatus::Running {
            self.peak_running = self.peak_running.max(self.running_count());
        }
    }

    pub fn running_count(&self) -> usize {
        self.tasks()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    pub fn peak_running(&self) -> usize {
        self.peak_running
    }
}

/// Builds tasks and plans from tool calls using the routing tables.
#[derive(Debug, Clone)]
pub struct TaskManager {
    config: Arc<CoordinatorConfig>,
}

impl TaskManager {
    pub fn new(config: Arc<CoordinatorConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// One task per call, routed and prioritised via the config.
    pub fn build_tasks(&self, tool_calls: &[ToolCall]) -> CoordinationResult<Vec<AgentTask>> {
        let exec = &self.config.execution;
        tool_calls
            .iter()
            .enumerate()
            .map(|(index, call)| {
                if call.name.trim().is_empty() {
                    return Err(CoordinationError::InvalidToolCall {
                        index,
                        reason: "tool name is empty".into(),
                    });
                }
                let role = self.config.role_for(&call.name);
                Ok(AgentTask {
                    id: TaskId::generate(role, &call.name),
                    role,
                    tool_name: call.name.clone(),
                    args: call.args.clone(),
                    priority: self.config.priority_for(role),
                    dependencies: BTreeSet::new(),
                    status: TaskStatus::Pending,
                    max_retries: exec.max_retries,
                    timeout: exec.default_timeout(),
                    created_at: Utc::now(),
                    call_id: call.id.clone(),
                })
            })
            .collect()
    }

    /// Link each task to every in-batch instance of its prerequisite tools.
    /// Prerequisites missing from the batch are skipped.
    pub fn resolve_dependencies(&self, tasks: &mut [AgentTask]) {
        let mut by_tool: HashMap<String, Vec<TaskId>> = HashMap::new();
        for task in tasks.iter() {
            by_tool
                .entry(task.tool_name.clone())
                .or_default()
                .push(task.id.clone());
        }

        for task in tasks.iter_mut() {
            for prerequisite in self.config.prerequisites_for(&task.tool_name) {
                let Some(ids) = by_tool.get(prerequisite) else {
                    continue;
                };
                for id in ids {
                    if id != &task.id {
                        task.dependencies.insert(id.clone());
                    }
                }
            }
        }
    }

    /// Group tasks into priority levels and promote dependents past their
    /// dependencies.
    pub fn build_plan(&self, tasks: Vec<AgentTask>) -> ExecutionPlan {
        let estimated_time = self.estimate_time(&tasks);
        let total_tasks = tasks.len();

        let mut level_of: HashMap<TaskId, u32> = tasks
            .iter()
            .map(|t| (t.id.clone(), t.priority.level()))
            .collect();

        let mut promotions = Vec::new();
        for idx in topological_order(&tasks) {
            let task = &tasks[idx];
            let own = level_of[&task.id];
            let required = task
                .dependencies
                .iter()
                .filter_map(|d| level_of.get(d))
                .map(|l| l + 1)
                .max()
                .unwrap_or(own);
            if required > own {
                debug!(
                    task_id = %task.id,
                    tool = %task.tool_name,
                    from_level = own,
                    to_level = required,
                    "promoting dependent task"
                );
                level_of.insert(task.id.clone(), required);
                promotions.push(Promotion {
                    task_id: task.id.clone(),
                    tool_name: task.tool_name.clone(),
                    from_level: own,
                    to_level: required,
                });
            }
        }

        let mut levels: BTreeMap<u32, Vec<AgentTask>> = BTreeMap::new();
        for task in tasks {
            let level = level_of[&task.id];
            levels.entry(level).or_default().push(task);
        }

        ExecutionPlan {
            levels,
            total_tasks,
            estimated_time,
            created_at: Utc::now(),
            promotions,
            peak_running: 0,
        }
    }

    /// Estimated seconds for a batch; multi-task batches assume some overlap.
    pub fn estimate_time(&self, tasks: &[AgentTask]) -> f64 {
        let total: f64 = tasks.iter().map(|t| role_time_estimate(t.role)).sum();
        if tasks.len() > 1 {
            total * PARALLEL_SPEEDUP
        } else {
            total
        }
    }

    /// Static checks on a plan. Findings are advisory.
    pub fn validate_plan(&self, plan: &ExecutionPlan) -> Vec<PlanWarning> {
        let mut warnings: Vec<PlanWarning> = find_cycles(plan)
            .into_iter()
            .map(|ids| PlanWarning::CircularDependency {
                task_ids: ids.iter().map(|id| id.to_string()).collect(),
            })
            .collect();

        let orphans: Vec<String> = plan
            .tasks()
            .filter(|t| {
                !self.config.prerequisites_for(&t.tool_name).is_empty()
                    && t.dependencies.is_empty()
            })
            .map(|t| t.tool_name.clone())
            .collect();
        if !orphans.is_empty() {
            warnings.push(PlanWarning::OrphanedTasks { tool_names: orphans });
        }

        let threshold = self.config.execution.overload_threshold;
        if plan.total_tasks > threshold {
            warnings.push(PlanWarning::Overloaded {
                total_tasks: plan.total_tasks,
                threshold,
            });
        }

        warnings.extend(plan.promotions().iter().map(|p| PlanWarning::TaskPromoted {
            task_id: p.task_id.to_string(),
            tool_name: p.tool_name.clone(),
            from_level: p.from_level,
            to_level: p.to_level,
        }));

        warnings
    }

    /// Build, link and level a batch in one step.
    pub fn plan(&self, tool_calls: &[ToolCall]) -> CoordinationResult<ExecutionPlan> {
        let mut tasks = self.build_tasks(tool_calls)?;
        self.resolve_dependencies(&mut tasks);
        Ok(self.build_plan(tasks))
    }
}

/// Kahn's algorithm over in-batch edges. Indices of tasks on or behind a
/// cycle are omitted.
fn topological_order(tasks: &[AgentTask]) -> Vec<usize> {
    let index: HashMap<&TaskId, usize> = tasks.iter().enumerate().map(|(i, t)| (&t.id, i)).collect();
    let mut in_degree = vec![0usize; tasks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];

    for (i, task) in tasks.iter().enumerate() {
        for dep in &task.dependencies {
            if let Some(&j) = index.get(dep) {
                in_degree[i] += 1;
                dependents[j].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..tasks.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(tasks.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                queue.push_back(d);
            }
        }
    }
    order
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Iterative three-colour DFS. Each back edge yields one cycle, reported as
/// the path from the revisited task back to itself. Cycles over the same set
/// of tasks are reported once.
fn find_cycles(plan: &ExecutionPlan) -> Vec<Vec<TaskId>> {
    let edges: BTreeMap<&TaskId, Vec<&TaskId>> = plan
        .tasks()
        .map(|t| {
            let deps: Vec<&TaskId> =
                t.dependencies.iter().filter(|d| plan.contains(d)).collect();
            (&t.id, deps)
        })
        .collect();

    let mut colour: HashMap<&TaskId, Colour> = edges.keys().map(|id| (*id, Colour::White)).collect();
    let mut seen: HashSet<BTreeSet<&TaskId>> = HashSet::new();
    let mut cycles = Vec::new();

    for &start in edges.keys() {
        if colour[start] != Colour::White {
            continue;
        }
        colour.insert(start, Colour::Grey);
        let mut stack: Vec<(&TaskId, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let next = edges.get(node).and_then(|deps| deps.get(frame.1)).copied();
            frame.1 += 1;

            let Some(next) = next else {
                colour.insert(node, Colour::Black);
                stack.pop();
                continue;
            };

            match colour.get(next).copied().unwrap_or(Colour::Black) {
                Colour::White => {
                    colour.insert(next, Colour::Grey);
                    stack.push((next, 0));
                }
                Colour::Grey => {
                    if let Some(pos) = stack.iter().position(|(id, _)| *id == next) {
                        let members: BTreeSet<&TaskId> =
                            stack[pos..].iter().map(|(id, _)| *id).collect();
                        if seen.insert(members) {
                            let mut cycle: Vec<TaskId> =
                                stack[pos..].iter().map(|(id, _)| (*id).clone()).collect();
                            cycle.push(next.clone());
                            cycles.push(cycle);
                        }
                    }
                }
                Colour::Black => {}
            }
        }
    }

    cycles
}
