//! Post-execution result validators, one per role.
//!
//! Validators only ever flip a successful result to failed; they never cause
//! a retry. A validator that cannot reach a verdict returns a
//! [`ValidatorFault`] and the orchestrator keeps the result unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use super::config::{CoordinatorConfig, ValidationRules};
use super::error::ValidatorFault;
use super::payload::{as_finite_number, ToolPayload};
use super::task::{AgentResult, AgentRole};

/// Largest magnitude a calculated figure may plausibly have.
pub const MAX_FINANCIAL_MAGNITUDE: f64 = 1e15;
/// Bounds for return-like results (−100% to +1000%).
pub const RETURN_BOUNDS: (f64, f64) = (-1.0, 10.0);
pub const VAR_BOUNDS: (f64, f64) = (0.0, 1.0);
pub const VOLATILITY_BOUNDS: (f64, f64) = (0.0, 2.0);
pub const RISK_LEVELS: [&str; 4] = ["low", "medium", "high", "very_high"];

/// Checks a completed result for shape and plausibility.
pub trait ResultValidator: Send + Sync {
    fn validate(&self, result: &AgentResult) -> Result<bool, ValidatorFault>;
}

/// Accepts any successful result with a non-null payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericValidator;

impl ResultValidator for GenericValidator {
    fn validate(&self, result: &AgentResult) -> Result<bool, ValidatorFault> {
        Ok(result.is_success() && result.payload.as_ref().is_some_and(|p| !p.is_null()))
    }
}

/// Successful result carrying a non-empty object, or `None`.
fn object_payload(result: &AgentResult) -> Option<&Map<String, Value>> {
    if !result.is_success() {
        return None;
    }
    result
        .payload
        .as_ref()
        .and_then(ToolPayload::as_object)
        .filter(|m| !m.is_empty())
}

fn in_range(value: f64, (lo, hi): (f64, f64)) -> bool {
    (lo..=hi).contains(&value)
}

/// Required fields present and declared numeric fields, when present, finite.
fn check_rules(result: &AgentResult, fields: &Map<String, Value>, rules: &ValidationRules) -> bool {
    if let Some(missing) = rules.required_fields.iter().find(|f| !fields.contains_key(*f)) {
        warn!(
            tool = %result.tool_name,
            role = %result.role,
            field = %missing,
            "required field missing from result"
        );
        return false;
    }
    for name in &rules.numeric_fields {
        if let Some(value) = fields.get(name) {
            if as_finite_number(value).is_none() {
                warn!(
                    tool = %result.tool_name,
                    role = %result.role,
                    field = %name,
                    value = %value,
                    "numeric field is not a finite number"
                );
                return false;
            }
        }
    }
    true
}

/// Validates financial analysis output.
#[derive(Debug, Clone)]
pub struct FinancialAnalystValidator {
    rules: ValidationRules,
}

impl FinancialAnalystValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }
}

impl ResultValidator for FinancialAnalystValidator {
    fn validate(&self, result: &AgentResult) -> Result<bool, ValidatorFault> {
        let Some(fields) = object_payload(result) else {
            return Ok(false);
        };
        Ok(check_rules(result, fields, &self.rules))
    }
}

/// Validates calculated figures, with extra bounds for ratio and return tools.
#[derive(Debug, Clone)]
pub struct CalculatorValidator {
    rules: ValidationRules,
}

impl CalculatorValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }
}

impl ResultValidator for CalculatorValidator {
    fn validate(&self, result: &AgentResult) -> Result<bool, ValidatorFault> {
        let Some(fields) = object_payload(result) else {
            return Ok(false);
        };
        if !check_rules(result, fields, &self.rules) {
            return Ok(false);
        }

        let primary = match &result.payload {
            Some(ToolPayload::Calculation(calc)) => calc.primary_value(),
            _ => fields.get("result").or_else(|| fields.get("value")),
        };
        let Some(primary) = primary else {
            return Ok(true);
        };
        let Some(value) = as_finite_number(primary) else {
            return Ok(false);
        };
        if value.abs() > MAX_FINANCIAL_MAGNITUDE {
            return Ok(false);
        }

        let tool = result.tool_name.to_lowercase();
        if tool.contains("ratio") && value < 0.0 {
            return Ok(false);
        }
        if tool.contains("return") && !in_range(value, RETURN_BOUNDS) {
            return Ok(false);
        }
        Ok(true)
    }
}

/// Validates risk levels and the usual risk metrics.
#[derive(Debug, Clone)]
pub struct RiskAssessorValidator {
    rules: ValidationRules,
}

impl RiskAssessorValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }
}

impl ResultValidator for RiskAssessorValidator {
    fn validate(&self, result: &AgentResult) -> Result<bool, ValidatorFault> {
        let Some(fields) = object_payload(result) else {
            return Ok(false);
        };
        if !check_rules(result, fields, &self.rules) {
            return Ok(false);
        }

        let (risk_level, var, volatility) = match &result.payload {
            Some(ToolPayload::Risk(risk)) => (risk.risk_level(), risk.var(), risk.volatility()),
            _ => (
                fields.get("risk_level"),
                fields.get("var"),
                fields.get("volatility"),
            ),
        };

        if let Some(level) = risk_level {
            let known = level
                .as_str()
                .map(|s| RISK_LEVELS.contains(&s.to_lowercase().as_str()))
                .unwrap_or(false);
            if !known {
                return Ok(false);
            }
        }

        for (metric, bounds) in [(var, VAR_BOUNDS), (volatility, VOLATILITY_BOUNDS)] {
            if let Some(raw) = metric {
                match as_finite_number(raw) {
                    Some(v) if in_range(v, bounds) => {}
                    _ => return Ok(false),
                }
            }
        }
        Ok(true)
    }
}

/// Maps roles to validators. Roles without a dedicated validator get
/// [`GenericValidator`].
#[derive(Clone)]
pub struct ValidatorFactory {
    validators: HashMap<AgentRole, Arc<dyn ResultValidator>>,
    fallback: Arc<dyn ResultValidator>,
}

impl ValidatorFactory {
    /// Built-in validators wired with the config's per-role rules.
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        let mut validators: HashMap<AgentRole, Arc<dyn ResultValidator>> = HashMap::new();
        validators.insert(
            AgentRole::FinancialAnalyst,
            Arc::new(FinancialAnalystValidator::new(
                config.validation_rules_for(AgentRole::FinancialAnalyst),
            )),
        );
        validators.insert(
            AgentRole::Calculator,
            Arc::new(CalculatorValidator::new(
                config.validation_rules_for(AgentRole::Calculator),
            )),
        );
        validators.insert(
            AgentRole::RiskAssessor,
            Arc::new(RiskAssessorValidator::new(
                config.validation_rules_for(AgentRole::RiskAssessor),
            )),
        );
        Self {
            validators,
            fallback: Arc::new(GenericValidator),
        }
    }

    /// Replace the validator for one role.
    pub fn with_validator(mut self, role: AgentRole, validator: Arc<dyn ResultValidator>) -> Self {
        self.validators.insert(role, validator);
        self
    }

    pub fn validator_for(&self, role: AgentRole) -> Arc<dyn ResultValidator> {
        self.validators
            .get(&role)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl std::fmt::Debug for ValidatorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut roles: Vec<_> = self.validators.keys().collect();
        roles.sort();
        f.debug_struct("ValidatorFactory")
            .field("roles", &roles)
            .finish()
    }
}
