//! Handing a run back to the conversation: per-call tool messages and a
//! plain-text execution report.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::summary::ExecutionSummary;
use super::task::ToolCall;

/// Errors listed in the text report.
const REPORTED_ERRORS: usize = 3;

/// Answer to one tool call of the original model turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub tool_call_id: String,
    /// JSON-encoded body.
    pub content: String,
}

/// One message per requested call, each carrying the run summary.
/// Calls without an id are answered as `"unknown"`.
pub fn tool_messages(
    summary: &ExecutionSummary,
    tool_calls: &[ToolCall],
) -> serde_json::Result<Vec<ToolMessage>> {
    tool_calls
        .iter()
        .map(|call| {
            let body = json!({
                "tool_name": call.name,
                "status": "processed",
                "execution_summary": summary,
            });
            Ok(ToolMessage {
                tool_call_id: call.id.clone().unwrap_or_else(|| "unknown".to_string()),
                content: serde_json::to_string(&body)?,
            })
        })
        .collect()
}

/// Fixed-format report of a run, suitable for feeding back to a model.
pub fn execution_report(summary: &ExecutionSummary) -> String {
    let mut out = String::new();
    out.push_str("MULTI-AGENT EXECUTION COMPLETE:\n");
    out.push_str(&format!(
        "- Total tasks: {}\n- Succeeded: {}\n- Failed: {}\n- Success rate: {:.1}%\n- Total time: {:.2}s\n",
        summary.total_tasks(),
        summary.successful_tasks(),
        summary.failed_tasks(),
        summary.success_rate(),
        summary.total_execution_time(),
    ));

    if !summary.agents_used().is_empty() {
        out.push_str("\nAGENTS USED:\n");
        for (role, count) in summary.agents_used() {
            out.push_str(&format!("- {role}: {count} task(s)\n"));
        }
    }

    if summary.total_tasks() > 0 {
        let m = summary.performance_metrics();
        out.push_str("\nPERFORMANCE:\n");
        out.push_str(&format!(
            "- Average task time: {:.2}s\n- Fastest task: {:.2}s\n- Slowest task: {:.2}s\n",
            m.average_task_time, m.fastest_task, m.slowest_task
        ));
        if m.retry_rate > 0.0 {
            out.push_str(&format!("- Retry rate: {:.1}\n", m.retry_rate));
        }
    }

    if !summary.errors().is_empty() {
        out.push_str("\nERRORS:\n");
        for error in summary.errors().iter().take(REPORTED_ERRORS) {
            out.push_str(&format!("- {error}\n"));
        }
        let hidden = summary.errors().len().saturating_sub(REPORTED_ERRORS);
        if hidden > 0 {
            out.push_str(&format!("- ... and {hidden} more\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tool_messages_fall_back_to_unknown_id() {
        let summary = ExecutionSummary::from_results(&[], Duration::ZERO);
        let calls = vec![
            ToolCall::new("get_market_data", json!({})).with_id("call_1"),
            ToolCall::new("calculate_var", json!({})),
        ];
        let msgs = tool_messages(&summary, &calls).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].tool_call_id, "call_1");
        assert_eq!(msgs[1].tool_call_id, "unknown");

        let body: serde_json::Value = serde_json::from_str(&msgs[1].content).unwrap();
        assert_eq!(body["tool_name"], "calculate_var");
        assert_eq!(body["status"], "processed");
        assert_eq!(body["execution_summary"]["total_tasks"], 0);
    }

    #[test]
    fn test_report_truncates_errors() {
        let summary = ExecutionSummary::aborted(5, "plan failed", Duration::from_millis(1500));
        let text = execution_report(&summary);
        assert!(text.contains("- Total tasks: 5"));
        assert!(text.contains("- Success rate: 0.0%"));
        assert!(text.contains("- Total time: 1.50s"));
        assert!(text.contains("ERRORS:\n- plan failed\n"));
        assert!(!text.contains("AGENTS USED"));
    }
}
