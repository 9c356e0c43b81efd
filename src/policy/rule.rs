use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::resolver::PolicyArgs;
use crate::policy::schema::ParamKind;
use crate::policy::violation::RuleError;

/// Operators supported for field checks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Field must be present and non-null
    Required,
    /// Field must be missing or null
    Absent,
    /// Field equals value
    Eq,
    /// Field not equals value
    Neq,
    /// Field less than value
    Lt,
    /// Field less than or equal to value
    Lte,
    /// Field greater than value
    Gt,
    /// Field greater than or equal to value
    Gte,
    /// Field contains value (string or array)
    Contains,
    /// Field does not contain value (string or array)
    NotContains,
    /// Field matches regex pattern
    Matches,
    /// Field is one of the listed values
    OneOf,
    /// Field is none of the listed values
    NotOneOf,
}

impl Operator {
    fn needs_value(&self) -> bool {
        !matches!(self, Operator::Required | Operator::Absent)
    }

    /// Check if a parameter of `kind` can supply this operator's value
    pub fn accepts(&self, kind: ParamKind) -> bool {
        match self {
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                matches!(kind, ParamKind::Integer | ParamKind::Number)
            }
            Operator::Matches => kind == ParamKind::String,
            Operator::OneOf | Operator::NotOneOf => {
                matches!(kind, ParamKind::Array | ParamKind::StringArray)
            }
            Operator::Required | Operator::Absent => false,
            Operator::Eq | Operator::Neq | Operator::Contains | Operator::NotContains => true,
        }
    }
}

/// Expected value of a check: a literal, or a reference to a policy parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CheckValue {
    Param { param: String },
    Literal(Value),
}

/// A single field predicate over resource properties.
///
/// `field` is a dotted path; a `[]` suffix on a segment iterates the array at
/// that point, so a check may fail once per element. The message may embed
/// `{field}`, replaced with the concrete path that failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCheck {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Option<CheckValue>,
    pub message: String,
    /// Compiled literal pattern of a `matches` check
    #[serde(skip)]
    pattern: Option<Regex>,
}

impl FieldCheck {
    pub fn new(
        field: impl Into<String>,
        operator: Operator,
        value: Option<CheckValue>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            message: message.into(),
            pattern: None,
        }
    }

    /// Validate the definition and compile a literal pattern once.
    pub fn compile(mut self) -> Result<Self, String> {
        self.validate()?;
        if let (Operator::Matches, Some(CheckValue::Literal(Value::String(pattern)))) =
            (self.operator, &self.value)
        {
            self.pattern = Some(Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))?);
        }
        Ok(self)
    }

    /// Validate the check definition itself
    pub fn validate(&self) -> Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("field must not be empty".to_string());
        }
        if self.operator.needs_value() && self.value.is_none() {
            return Err(format!("operator {:?} requires a value", self.operator));
        }
        match (&self.operator, &self.value) {
            (Operator::Matches, Some(CheckValue::Literal(Value::String(pattern)))) => {
                Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))?;
            }
            (Operator::Matches, Some(CheckValue::Literal(_))) => {
                return Err("matches requires a string pattern".to_string());
            }
            (Operator::OneOf | Operator::NotOneOf, Some(CheckValue::Literal(v))) if !v.is_array() => {
                return Err(format!("{:?} requires a list of values", self.operator));
            }
            _ => {}
        }
        Ok(())
    }

    /// Parameter names this check refers to
    pub fn param(&self) -> Option<&str> {
        match &self.value {
            Some(CheckValue::Param { param }) => Some(param),
            _ => None,
        }
    }

    /// Check resource properties, returning one message per failing field
    pub fn check(&self, properties: &Value, args: &PolicyArgs) -> Result<Vec<String>, RuleError> {
        let expected = match &self.value {
            None => None,
            Some(CheckValue::Literal(v)) => Some(v.clone()),
            Some(CheckValue::Param { param }) => Some(
                args.param(param)
                    .cloned()
                    .ok_or_else(|| RuleError::new(format!("parameter '{param}' is not set")))?,
            ),
        };

        // parameter patterns are compiled once per call, not per element
        let compiled;
        let pattern = match (&self.pattern, self.operator, expected.as_ref()) {
            (Some(re), _, _) => Some(re),
            (None, Operator::Matches, Some(Value::String(source))) => {
                compiled = Regex::new(source)
                    .map_err(|e| RuleError::new(format!("invalid pattern '{source}': {e}")))?;
                Some(&compiled)
            }
            _ => None,
        };

        let mut failures = Vec::new();
        for (path, field_value) in extract_fields(&self.field, properties) {
            if !self.holds(field_value, expected.as_ref(), pattern) {
                failures.push(self.message.replace("{field}", &path));
            }
        }
        Ok(failures)
    }

    fn holds(
        &self,
        field_value: Option<&Value>,
        expected: Option<&Value>,
        pattern: Option<&Regex>,
    ) -> bool {
        let present = !matches!(field_value, None | Some(Value::Null));
        match self.operator {
            Operator::Required => present,
            Operator::Absent => !present,
            Operator::Eq => field_value == expected,
            Operator::Neq => field_value != expected,
            Operator::Lt => compare_numbers(field_value, expected, |fv, rv| fv < rv),
            Operator::Lte => compare_numbers(field_value, expected, |fv, rv| fv <= rv),
            Operator::Gt => compare_numbers(field_value, expected, |fv, rv| fv > rv),
            Operator::Gte => compare_numbers(field_value, expected, |fv, rv| fv >= rv),
            Operator::Contains => check_contains(field_value, expected),
            Operator::NotContains => !present || !check_contains(field_value, expected),
            Operator::Matches => check_matches(field_value, pattern),
            Operator::OneOf => check_one_of(field_value, expected),
            Operator::NotOneOf => !present || !check_one_of(field_value, expected),
        }
    }
}

/// Resolve a path with optional `[]` segments into (concrete path, value) pairs
fn extract_fields<'a>(path: &str, root: &'a Value) -> Vec<(String, Option<&'a Value>)> {
    let mut current: Vec<(String, Option<&'a Value>)> = vec![(String::new(), Some(root))];

    for segment in path.split('.') {
        let (key, iterate) = match segment.strip_suffix("[]") {
            Some(key) => (key, true),
            None => (segment, false),
        };
        let mut next = Vec::new();
        for (prefix, value) in current {
            let joined = if prefix.is_empty() {
                key.to_string()
            } else {
                format!("{prefix}.{key}")
            };
            let child = value.and_then(|v| v.get(key));
            if iterate {
                if let Some(Value::Array(items)) = child {
                    for (i, item) in items.iter().enumerate() {
                        next.push((format!("{joined}[{i}]"), Some(item)));
                    }
                }
            } else {
                next.push((joined, child));
            }
        }
        current = next;
    }
    current
}

/// Compare numeric values using the provided comparator
fn compare_numbers<F>(field_value: Option<&Value>, expected: Option<&Value>, comparator: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (field_value, expected) {
        (Some(Value::Number(fv)), Some(Value::Number(rv))) => match (fv.as_f64(), rv.as_f64()) {
            (Some(fv_f64), Some(rv_f64)) => comparator(fv_f64, rv_f64),
            _ => false,
        },
        _ => false,
    }
}

/// Check if field contains the expected value
fn check_contains(field_value: Option<&Value>, expected: Option<&Value>) -> bool {
    match (field_value, expected) {
        // String contains substring
        (Some(Value::String(field_str)), Some(Value::String(search_str))) => {
            field_str.contains(search_str.as_str())
        }
        // Array contains value
        (Some(Value::Array(arr)), Some(search_val)) => arr.contains(search_val),
        _ => false,
    }
}

/// Check if field matches the regex pattern
fn check_matches(field_value: Option<&Value>, pattern: Option<&Regex>) -> bool {
    match (field_value, pattern) {
        (Some(Value::String(field_str)), Some(re)) => re.is_match(field_str),
        _ => false,
    }
}

fn check_one_of(field_value: Option<&Value>, expected: Option<&Value>) -> bool {
    match (field_value, expected) {
        (Some(value), Some(Value::Array(allowed))) => allowed.contains(value),
        _ => false,
    }
}
