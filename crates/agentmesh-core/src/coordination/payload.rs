//! Typed views over the JSON a tool hands back.
//!
//! Tools return arbitrary JSON. Roles whose results are validated get a typed
//! view over the object so validators ask for fields by meaning; everything
//! else is carried as [`ToolPayload::Opaque`].

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::task::AgentRole;

/// Read a JSON value as a number. Numeric strings are accepted; anything else
/// (bools, arrays, objects, null) is not a number.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Like [`as_number`], but rejects NaN and infinities.
pub fn as_finite_number(value: &Value) -> Option<f64> {
    as_number(value).filter(|v| v.is_finite())
}

/// Output of a calculator tool.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationPayload {
    fields: Map<String, Value>,
}

impl CalculationPayload {
    /// The headline figure: `result`, falling back to `value`.
    pub fn primary_value(&self) -> Option<&Value> {
        self.fields.get("result").or_else(|| self.fields.get("value"))
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Output of a risk-assessment tool.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPayload {
    fields: Map<String, Value>,
}

impl RiskPayload {
    pub fn risk_level(&self) -> Option<&Value> {
        self.fields.get("risk_level")
    }

    /// Value at risk, as a fraction of the portfolio.
    pub fn var(&self) -> Option<&Value> {
        self.fields.get("var")
    }

    pub fn volatility(&self) -> Option<&Value> {
        self.fields.get("volatility")
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Output of a financial-analysis tool.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPayload {
    fields: Map<String, Value>,
}

impl AnalysisPayload {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// What a tool returned, classified by the role that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    Calculation(CalculationPayload),
    Risk(RiskPayload),
    Analysis(AnalysisPayload),
    Opaque(Value),
}

impl ToolPayload {
    /// Classify raw tool output. Only JSON objects produced by a validated
    /// role get a typed view.
    pub fn classify(role: AgentRole, value: Value) -> Self {
        match (role, value) {
            (AgentRole::Calculator, Value::Object(fields)) => {
                Self::Calculation(CalculationPayload { fields })
            }
            (AgentRole::RiskAssessor, Value::Object(fields)) => Self::Risk(RiskPayload { fields }),
            (AgentRole::FinancialAnalyst, Value::Object(fields)) => {
                Self::Analysis(AnalysisPayload { fields })
            }
            (_, other) => Self::Opaque(other),
        }
    }

    /// The object behind the payload, if it is one.
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Calculation(p) => Some(&p.fields),
            Self::Risk(p) => Some(&p.fields),
            Self::Analysis(p) => Some(&p.fields),
            Self::Opaque(Value::Object(map)) => Some(map),
            Self::Opaque(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Opaque(Value::Null))
    }

    /// Raw JSON form, as handed to dependent tasks.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Opaque(v) => v.clone(),
            _ => self
                .as_object()
                .map(|m| Value::Object(m.clone()))
                .unwrap_or(Value::Null),
        }
    }
}

impl Serialize for ToolPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Calculation(p) => p.fields.serialize(serializer),
            Self::Risk(p) => p.fields.serialize(serializer),
            Self::Analysis(p) => p.fields.serialize(serializer),
            Self::Opaque(v) => v.serialize(serializer),
        }
    }
}
