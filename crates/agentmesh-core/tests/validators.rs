//! Role validator behaviour on realistic tool payloads.

use std::collections::BTreeSet;
use std::time::Duration;

use agentmesh_core::{
    AgentResult, AgentRole, AgentTask, CoordinatorConfig, GenericValidator, ResultValidator,
    TaskId, TaskPriority, TaskStatus, ToolPayload, ValidatorFactory,
};
use chrono::Utc;
use serde_json::{json, Map, Value};

fn result(role: AgentRole, tool: &str, payload: Value) -> AgentResult {
    let task = AgentTask {
        id: TaskId::generate(role, tool),
        role,
        tool_name: tool.to_string(),
        args: Map::new(),
        priority: TaskPriority::Medium,
        dependencies: BTreeSet::new(),
        status: TaskStatus::Running,
        max_retries: 3,
        timeout: Duration::from_secs(30),
        created_at: Utc::now(),
        call_id: None,
    };
    AgentResult::succeeded(
        &task,
        ToolPayload::classify(role, payload),
        Duration::from_millis(10),
        0,
    )
}

fn verdict(role: AgentRole, tool: &str, payload: Value) -> bool {
    let factory = ValidatorFactory::from_config(&CoordinatorConfig::default());
    factory
        .validator_for(role)
        .validate(&result(role, tool, payload))
        .expect("built-in validators never fault")
}

#[test]
fn test_generic_validator_requires_non_null_payload() {
    assert!(verdict(AgentRole::DataRetriever, "get_market_data", json!([1, 2])));
    assert!(!verdict(AgentRole::ComplianceChecker, "compliance_check", json!(null)));
}

#[test]
fn test_generic_validator_rejects_failed_results() {
    let mut r = result(AgentRole::Validator, "data_quality_check", json!({"ok": true}));
    r.reject("upstream failure");
    assert!(!GenericValidator.validate(&r).unwrap());
}

#[test]
fn test_analyst_requires_configured_fields() {
    let complete = json!({"status": "ok", "data": {}, "analysis": "steady", "ratio": 0.4});
    assert!(verdict(AgentRole::FinancialAnalyst, "analyze_portfolio", complete));

    let missing = json!({"status": "ok", "data": {}});
    assert!(!verdict(AgentRole::FinancialAnalyst, "analyze_portfolio", missing));
}

#[test]
fn test_analyst_rejects_non_finite_numbers() {
    for bad in [json!("NaN"), json!("Infinity"), json!("-inf"), json!("twelve")] {
        let payload = json!({"status": "ok", "data": {}, "analysis": "x", "percentage": bad});
        assert!(
            !verdict(AgentRole::FinancialAnalyst, "analyze_performance", payload),
            "percentage should be rejected"
        );
    }
}

#[test]
fn test_validated_roles_reject_empty_or_non_object_payloads() {
    assert!(!verdict(AgentRole::Calculator, "calculate_metrics", json!({})));
    assert!(!verdict(AgentRole::RiskAssessor, "calculate_var", json!(0.2)));
    assert!(!verdict(AgentRole::FinancialAnalyst, "generate_insights", json!("text")));
}

#[test]
fn test_calculator_bounds_by_tool_name() {
    let ok = |v: Value| json!({"status": "ok", "result": v});

    assert!(verdict(AgentRole::Calculator, "calculate_ratios", ok(json!(0.0))));
    assert!(!verdict(AgentRole::Calculator, "calculate_ratios", ok(json!(-0.01))));

    assert!(verdict(AgentRole::Calculator, "calculate_returns", ok(json!(-1.0))));
    assert!(verdict(AgentRole::Calculator, "calculate_returns", ok(json!(10.0))));
    assert!(!verdict(AgentRole::Calculator, "calculate_returns", ok(json!(10.5))));
    assert!(!verdict(AgentRole::Calculator, "calculate_returns", ok(json!(-1.2))));

    // No name-specific bound, only the magnitude cap.
    assert!(verdict(AgentRole::Calculator, "calculate_metrics", ok(json!(-5e14))));
    assert!(!verdict(AgentRole::Calculator, "calculate_metrics", ok(json!(2e15))));
    assert!(!verdict(AgentRole::Calculator, "calculate_metrics", ok(json!("NaN"))));
}

#[test]
fn test_calculator_checks_declared_numeric_fields() {
    let payload = json!({"status": "ok", "result": 3.0, "total": "lots"});
    assert!(!verdict(AgentRole::Calculator, "calculate_valuation", payload));

    let payload = json!({"status": "ok", "result": 3.0, "total": "42.5"});
    assert!(verdict(AgentRole::Calculator, "calculate_valuation", payload));
}

#[test]
fn test_risk_levels_and_metric_ranges() {
    let base = |level: Value, var: Value, vol: Value| {
        json!({
            "status": "ok",
            "risk_level": level,
            "metrics": {},
            "var": var,
            "volatility": vol
        })
    };

    assert!(verdict(
        AgentRole::RiskAssessor,
        "risk_assessment",
        base(json!("VERY_HIGH"), json!(1.0), json!(2.0))
    ));
    assert!(!verdict(
        AgentRole::RiskAssessor,
        "risk_assessment",
        base(json!("extreme"), json!(0.1), json!(0.2))
    ));
    assert!(!verdict(
        AgentRole::RiskAssessor,
        "risk_assessment",
        base(json!(3), json!(0.1), json!(0.2))
    ));
    assert!(!verdict(
        AgentRole::RiskAssessor,
        "calculate_var",
        base(json!("low"), json!(1.5), json!(0.2))
    ));
    assert!(!verdict(
        AgentRole::RiskAssessor,
        "stress_testing",
        base(json!("low"), json!(0.1), json!(-0.1))
    ));
}

#[test]
fn test_unmapped_roles_fall_back_to_generic() {
    // Compliance output is not inspected beyond being present.
    assert!(verdict(
        AgentRole::ComplianceChecker,
        "compliance_check",
        json!({"anything": "goes"})
    ));
}
