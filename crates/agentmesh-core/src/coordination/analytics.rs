//! Run history analysis and per-role performance records.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::summary::ExecutionSummary;
use super::task::{AgentResult, AgentRole};

pub const MAX_RUN_HISTORY: usize = 100;
pub const MAX_RECORDS_PER_ROLE: usize = 50;
const COMMON_ERROR_LIMIT: usize = 5;
const MIN_RUNS_FOR_TREND: usize = 3;

/// Direction of recent runs, comparing the older half with the newer half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTrend {
    /// Faster and more successful.
    Improving,
    /// Slower and less successful.
    Degrading,
    SuccessImproving,
    TimeImproving,
    Stable,
    InsufficientData,
}

/// Aggregates over the most recent runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub executions_analyzed: usize,
    pub average_success_rate: f64,
    pub average_execution_time: f64,
    pub average_tasks_per_execution: f64,
    /// Role name and task count, most used first.
    pub most_used_agents: Vec<(String, usize)>,
    /// Error prefixes (text before the first `:`), most frequent first.
    pub common_errors: Vec<String>,
    pub trend: PerformanceTrend,
}

/// Bounded history of run summaries.
#[derive(Debug, Clone, Default)]
pub struct PerformanceAnalyzer {
    history: VecDeque<ExecutionSummary>,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

impl PerformanceAnalyzer {
    pub fn record(&mut self, summary: ExecutionSummary) {
        self.history.push_back(summary);
        while self.history.len() > MAX_RUN_HISTORY {
            self.history.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Report over the last `last_n` runs; `None` when nothing was recorded.
    pub fn report(&self, last_n: usize) -> Option<PerformanceReport> {
        if self.history.is_empty() || last_n == 0 {
            return None;
        }
        let skip = self.history.len().saturating_sub(last_n);
        let recent: Vec<&ExecutionSummary> = self.history.iter().skip(skip).collect();

        Some(PerformanceReport {
            executions_analyzed: recent.len(),
            average_success_rate: mean(recent.iter().map(|s| s.success_rate())),
            average_execution_time: mean(recent.iter().map(|s| s.total_execution_time())),
            average_tasks_per_execution: mean(recent.iter().map(|s| s.total_tasks() as f64)),
            most_used_agents: most_used_agents(&recent),
            common_errors: common_errors(&recent),
            trend: trend(&recent),
        })
    }
}

fn most_used_agents(runs: &[&ExecutionSummary]) -> Vec<(String, usize)> {
    let mut usage: BTreeMap<&str, usize> = BTreeMap::new();
    for run in runs {
        for (role, count) in run.agents_used() {
            *usage.entry(role.as_str()).or_default() += count;
        }
    }
    let mut usage: Vec<(String, usize)> =
        usage.into_iter().map(|(r, c)| (r.to_string(), c)).collect();
    usage.sort_by(|a, b| b.1.cmp(&a.1));
    usage
}

fn common_errors(runs: &[&ExecutionSummary]) -> Vec<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for error in runs.iter().flat_map(|r| r.errors()) {
        let prefix = error.split(':').next().unwrap_or(error);
        match counts.iter_mut().find(|(p, _)| *p == prefix) {
            Some((_, n)) => *n += 1,
            None => counts.push((prefix, 1)),
        }
    }
    // Stable sort keeps first-seen order among equal counts.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(COMMON_ERROR_LIMIT)
        .map(|(p, _)| p.to_string())
        .collect()
}

fn trend(runs: &[&ExecutionSummary]) -> PerformanceTrend {
    if runs.len() < MIN_RUNS_FOR_TREND {
        return PerformanceTrend::InsufficientData;
    }
    let (first, second) = runs.split_at(runs.len() / 2);
    let time = |half: &[&ExecutionSummary]| mean(half.iter().map(|s| s.total_execution_time()));
    let success = |half: &[&ExecutionSummary]| mean(half.iter().map(|s| s.success_rate()));

    let (t1, t2) = (time(first), time(second));
    let (s1, s2) = (success(first), success(second));

    if t2 < t1 && s2 > s1 {
        PerformanceTrend::Improving
    } else if t2 > t1 && s2 < s1 {
        PerformanceTrend::Degrading
    } else if s2 > s1 {
        PerformanceTrend::SuccessImproving
    } else if t2 < t1 {
        PerformanceTrend::TimeImproving
    } else {
        PerformanceTrend::Stable
    }
}

/// One task outcome, as remembered for its role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentPerformanceRecord {
    pub tool_name: String,
    pub success: bool,
    /// Seconds.
    pub execution_time: f64,
    pub retry_count: u32,
    pub completed_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Per-role totals over the retained records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReport {
    pub role: AgentRole,
    pub total_executions: usize,
    pub successful_executions: usize,
    pub average_execution_time: f64,
    pub average_retries: f64,
}

/// Bounded per-role record of task outcomes.
#[derive(Debug, Clone, Default)]
pub struct AgentMetrics {
    records: HashMap<AgentRole, VecDeque<AgentPerformanceRecord>>,
}

impl AgentMetrics {
    pub fn record(&mut self, result: &AgentResult) {
        let records = self.records.entry(result.role).or_default();
        records.push_back(AgentPerformanceRecord {
            tool_name: result.tool_name.clone(),
            success: result.is_success(),
            execution_time: result.execution_time.as_secs_f64(),
            retry_count: result.retry_count,
            completed_at: result.completed_at,
            error: result.error_message().map(str::to_string),
        });
        while records.len() > MAX_RECORDS_PER_ROLE {
            records.pop_front();
        }
    }

    pub fn records(&self, role: AgentRole) -> impl Iterator<Item = &AgentPerformanceRecord> {
        self.records.get(&role).into_iter().flatten()
    }

    /// `None` for roles that never ran.
    pub fn report(&self, role: AgentRole) -> Option<AgentReport> {
        let records = self.records.get(&role)?;
        Some(AgentReport {
            role,
            total_executions: records.len(),
            successful_executions: records.iter().filter(|r| r.success).count(),
            average_execution_time: mean(records.iter().map(|r| r.execution_time)),
            average_retries: mean(records.iter().map(|r| f64::from(r.retry_count))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn aborted(error: &str, secs: u64) -> ExecutionSummary {
        ExecutionSummary::aborted(1, error, Duration::from_secs(secs))
    }

    fn clean(secs: u64) -> ExecutionSummary {
        ExecutionSummary::from_results(&[], Duration::from_secs(secs))
    }

    #[test]
    fn test_empty_history_has_no_report() {
        assert!(PerformanceAnalyzer::default().report(10).is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut a = PerformanceAnalyzer::default();
        for _ in 0..(MAX_RUN_HISTORY + 7) {
            a.record(clean(1));
        }
        assert_eq!(a.len(), MAX_RUN_HISTORY);
    }

    #[test]
    fn test_common_errors_group_by_prefix() {
        let mut a = PerformanceAnalyzer::default();
        a.record(aborted("tool 'x' failed: boom", 1));
        a.record(aborted("tool 'x' failed: bang", 1));
        a.record(aborted("tool 'y' timed out after 30s", 1));

        let report = a.report(10).unwrap();
        assert_eq!(
            report.common_errors,
            vec!["tool 'x' failed", "tool 'y' timed out after 30s"]
        );
        assert_eq!(report.executions_analyzed, 3);
    }

    #[test]
    fn test_trend_detection() {
        let mut a = PerformanceAnalyzer::default();
        a.record(clean(1));
        a.record(clean(1));
        assert_eq!(a.report(10).unwrap().trend, PerformanceTrend::InsufficientData);

        let mut slower = PerformanceAnalyzer::default();
        slower.record(clean(1));
        slower.record(aborted("e", 5));
        slower.record(aborted("e", 5));
        // Slower with an unchanged (zero) success rate is not a degradation.
        assert_eq!(slower.report(10).unwrap().trend, PerformanceTrend::Stable);

        let mut improving = PerformanceAnalyzer::default();
        improving.record(aborted("e", 5));
        improving.record(aborted("e", 5));
        improving.record(aborted("e", 1));
        improving.record(aborted("e", 1));
        assert_eq!(
            improving.report(10).unwrap().trend,
            PerformanceTrend::TimeImproving
        );
    }
}
