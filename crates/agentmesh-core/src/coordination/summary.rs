//! Per-run summaries and rolling orchestrator statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::task::AgentResult;

/// Timing and retry figures across one run's results. Times are seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub average_task_time: f64,
    pub fastest_task: f64,
    pub slowest_task: f64,
    /// Retries consumed per task.
    pub retry_rate: f64,
}

impl PerformanceMetrics {
    pub fn from_results(results: &[AgentResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let n = results.len() as f64;
        let times: Vec<f64> = results.iter().map(|r| r.execution_time.as_secs_f64()).collect();
        let retries: u64 = results.iter().map(|r| u64::from(r.retry_count)).sum();
        Self {
            average_task_time: times.iter().sum::<f64>() / n,
            fastest_task: times.iter().copied().fold(f64::INFINITY, f64::min),
            slowest_task: times.iter().copied().fold(0.0, f64::max),
            retry_rate: retries as f64 / n,
        }
    }
}

/// Aggregate report of one `coordinate` call. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    total_tasks: usize,
    successful_tasks: usize,
    failed_tasks: usize,
    success_rate: f64,
    /// Wall-clock seconds for the whole run.
    total_execution_time: f64,
    agents_used: BTreeMap<String, usize>,
    errors: Vec<String>,
    performance_metrics: PerformanceMetrics,
}

fn rate(successful: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        successful as f64 / total as f64 * 100.0
    }
}

impl ExecutionSummary {
    pub fn from_results(results: &[AgentResult], elapsed: Duration) -> Self {
        let successful = results.iter().filter(|r| r.is_success()).count();
        let mut agents_used: BTreeMap<String, usize> = BTreeMap::new();
        for r in results {
            *agents_used.entry(r.role.to_string()).or_default() += 1;
        }
        let errors = results
            .iter()
            .filter(|r| !r.is_success())
            .filter_map(|r| r.error_message().map(str::to_string))
            .collect();

        Self {
            total_tasks: results.len(),
            successful_tasks: successful,
            failed_tasks: results.len() - successful,
            success_rate: rate(successful, results.len()),
            total_execution_time: elapsed.as_secs_f64(),
            agents_used,
            errors,
            performance_metrics: PerformanceMetrics::from_results(results),
        }
    }

    /// Every requested call counted as failed, with a single error.
    pub fn aborted(total_calls: usize, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            total_tasks: total_calls,
            successful_tasks: 0,
            failed_tasks: total_calls,
            success_rate: 0.0,
            total_execution_time: elapsed.as_secs_f64(),
            agents_used: BTreeMap::new(),
            errors: vec![error.into()],
            performance_metrics: PerformanceMetrics::default(),
        }
    }

    pub fn total_tasks(&self) -> usize {
        self.total_tasks
    }

    pub fn successful_tasks(&self) -> usize {
        self.successful_tasks
    }

    pub fn failed_tasks(&self) -> usize {
        self.failed_tasks
    }

    /// Percentage in `[0, 100]`; zero for an empty run.
    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    pub fn total_execution_time(&self) -> f64 {
        self.total_execution_time
    }

    pub fn agents_used(&self) -> &BTreeMap<String, usize> {
        &self.agents_used
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn performance_metrics(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }
}

/// Rolling statistics across every run of one orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStatistics {
    pub total_executions: u64,
    /// Runs in which no task failed.
    pub successful_executions: u64,
    pub total_tasks_executed: u64,
    /// Moving mean of run durations, in seconds.
    pub average_execution_time: f64,
    pub success_rate: f64,
    pub average_tasks_per_execution: f64,
}

impl OrchestratorStatistics {
    pub(crate) fn record(&mut self, summary: &ExecutionSummary, elapsed: Duration) {
        self.total_executions += 1;
        if summary.failed_tasks() == 0 {
            self.successful_executions += 1;
        }
        self.total_tasks_executed += summary.total_tasks() as u64;

        let n = self.total_executions as f64;
        self.average_execution_time =
            (self.average_execution_time * (n - 1.0) + elapsed.as_secs_f64()) / n;
        self.success_rate = self.successful_executions as f64 / n * 100.0;
        self.average_tasks_per_execution = self.total_tasks_executed as f64 / n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_run_has_zero_rate() {
        let s = ExecutionSummary::from_results(&[], Duration::ZERO);
        assert_eq!(s.total_tasks(), 0);
        assert_eq!(s.success_rate(), 0.0);
        assert!(s.errors().is_empty());
        assert_eq!(s.performance_metrics(), &PerformanceMetrics::default());
    }

    #[test]
    fn test_aborted_summary_counts_every_call_as_failed() {
        let s = ExecutionSummary::aborted(4, "invalid tool call", Duration::from_millis(3));
        assert_eq!(s.failed_tasks(), 4);
        assert_eq!(s.successful_tasks(), 0);
        assert_eq!(s.errors(), ["invalid tool call"]);
    }

    #[test]
    fn test_statistics_moving_average() {
        let mut stats = OrchestratorStatistics::default();
        let ok = ExecutionSummary::from_results(&[], Duration::ZERO);
        let bad = ExecutionSummary::aborted(2, "x", Duration::ZERO);

        stats.record(&ok, Duration::from_secs(2));
        stats.record(&bad, Duration::from_secs(4));

        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.total_tasks_executed, 2);
        assert!((stats.average_execution_time - 3.0).abs() < 1e-9);
        assert!((stats.success_rate - 50.0).abs() < 1e-9);
        assert!((stats.average_tasks_per_execution - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_serialized_shape() {
        let s = ExecutionSummary::from_results(&[], Duration::ZERO);
        let v = serde_json::to_value(&s).unwrap();
        for key in [
            "total_tasks",
            "successful_tasks",
            "failed_tasks",
            "success_rate",
            "total_execution_time",
            "agents_used",
            "errors",
            "performance_metrics",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert!(v["performance_metrics"].get("retry_rate").is_some());
    }
}
