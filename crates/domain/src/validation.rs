use std::collections::BTreeMap;
use std::str::FromStr;

use ruleflow_core::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::Operation;

/// Severity classification of one validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocking finding.
    Error,
    /// Advisory finding.
    Warning,
}

impl Severity {
    /// Returns a stable storage value for the severity.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

impl FromStr for Severity {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            _ => Err(EngineError::Validation(format!(
                "unknown severity '{value}'"
            ))),
        }
    }
}

/// One blocking validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field the finding applies to; empty for record-level findings.
    pub field: String,
    /// Human-readable description.
    pub message: String,
    /// Stable machine-readable code chosen by the rule author.
    pub code: String,
    /// Severity classification.
    pub severity: Severity,
}

impl ValidationError {
    /// Creates a validation error.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
            severity,
        }
    }

    /// Returns the error retagged with another field name.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }
}

/// One advisory validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Field the finding applies to; empty for record-level findings.
    pub field: String,
    /// Human-readable description.
    pub message: String,
    /// Optional stable machine-readable code.
    pub code: Option<String>,
    /// Optional remediation hint for the caller.
    pub suggested_action: Option<String>,
}

impl ValidationWarning {
    /// Creates a validation warning without code or suggested action.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: None,
            suggested_action: None,
        }
    }

    /// Adds a machine-readable code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Adds a remediation hint.
    #[must_use]
    pub fn with_suggested_action(mut self, suggested_action: impl Into<String>) -> Self {
        self.suggested_action = Some(suggested_action.into());
        self
    }

    /// Returns the warning retagged with another field name.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }
}

/// Aggregated outcome of one validation pass.
///
/// Validity is computed, never stored: a result is valid exactly when it
/// holds no errors. Warnings never affect validity. Error and warning order
/// is append order and is preserved by [`ValidationResult::merge`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Creates an empty, valid result.
    #[must_use]
    pub fn valid() -> Self {
        Self::default()
    }

    /// Creates a result holding one error.
    #[must_use]
    pub fn invalid(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    /// Returns whether the result holds no errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns accumulated errors in append order.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Returns accumulated warnings in append order.
    #[must_use]
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// Appends one error.
    pub fn push_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Appends one warning.
    pub fn push_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Appends another result's findings, preserving both append orders.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Returns the result with every finding retagged to one field name.
    #[must_use]
    pub fn tagged_with_field(self, field: &str) -> Self {
        Self {
            errors: self
                .errors
                .into_iter()
                .map(|error| error.with_field(field))
                .collect(),
            warnings: self
                .warnings
                .into_iter()
                .map(|warning| warning.with_field(field))
                .collect(),
        }
    }
}

/// Aggregated counts over one validation result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Whether the summarized result held no errors.
    pub is_valid: bool,
    /// Findings in the error list carrying error severity.
    pub error_count: usize,
    /// Warning-severity errors plus entries in the warning list.
    pub warning_count: usize,
    /// Finding counts keyed by machine-readable code, sorted by code.
    pub counts_by_code: BTreeMap<String, usize>,
}

/// Caller-supplied context threaded through validator invocations.
///
/// Opaque to the engine; validators interpret what they need.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// Operation under validation when known.
    pub operation: Option<Operation>,
    /// Acting user identifier when known.
    pub user: Option<String>,
    /// Free-form caller metadata passed through to validators.
    pub metadata: Map<String, Value>,
}

impl ValidationContext {
    /// Creates a context scoped to one operation.
    #[must_use]
    pub fn for_operation(operation: Operation) -> Self {
        Self {
            operation: Some(operation),
            user: None,
            metadata: Map::new(),
        }
    }

    /// Adds the acting user identifier.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}
