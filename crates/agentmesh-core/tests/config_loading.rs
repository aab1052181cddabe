//! Loading coordinator configuration from disk.

use std::io::Write;

use agentmesh_core::{AgentRole, CoordinationError, CoordinatorConfig, TaskManager, TaskPriority};
use std::sync::Arc;

fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

#[test]
fn test_toml_file_replaces_tables_and_tunables() {
    let file = write_temp(
        ".toml",
        r#"
        [execution]
        max_parallel_tasks = 3
        default_timeout_secs = 5
        overload_threshold = 1

        [routing.tool_roles]
        fetch_data = "data_retriever"
        compute_metric = "calculator"

        [routing.role_priorities]
        data_retriever = "high"
        calculator = "low"

        [routing.prerequisites]
        compute_metric = ["fetch_data"]
        "#,
    );

    let config = CoordinatorConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.execution.max_parallel_tasks, 3);
    assert_eq!(config.execution.default_timeout_secs, 5);
    assert_eq!(config.priority_for(AgentRole::Calculator), TaskPriority::Low);
    // Unlisted roles fall back to medium once the table is replaced.
    assert_eq!(config.priority_for(AgentRole::Validator), TaskPriority::Medium);

    let manager = TaskManager::new(Arc::new(config));
    let plan = manager
        .plan(&[
            agentmesh_core::ToolCall::new("compute_metric", serde_json::json!({})),
            agentmesh_core::ToolCall::new("fetch_data", serde_json::json!({})),
        ])
        .unwrap();
    assert_eq!(plan.level_numbers(), vec![1, 3]);
    assert_eq!(plan.levels()[&1][0].timeout.as_secs(), 5);
    assert_eq!(manager.validate_plan(&plan).len(), 1);
}

#[test]
fn test_json_file_is_accepted() {
    let file = write_temp(
        ".json",
        r#"{"execution": {"max_retries": 0, "retry_backoff_ms": 5}}"#,
    );
    let config = CoordinatorConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.execution.max_retries, 0);
    assert_eq!(config.execution.retry_backoff().as_millis(), 5);
    assert_eq!(config.role_for("calculate_var"), AgentRole::RiskAssessor);
}

#[test]
fn test_unknown_extension_and_bad_syntax_are_errors() {
    let yaml = write_temp(".yaml", "execution: {}");
    assert!(matches!(
        CoordinatorConfig::load_from_file(yaml.path()),
        Err(CoordinationError::Config(_))
    ));

    let broken = write_temp(".toml", "[execution\nmax_retries = ");
    assert!(matches!(
        CoordinatorConfig::load_from_file(broken.path()),
        Err(CoordinationError::Toml(_))
    ));

    let missing = std::path::Path::new("/definitely/not/here.toml");
    assert!(matches!(
        CoordinatorConfig::load_from_file(missing),
        Err(CoordinationError::Io(_))
    ));
}
