// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Filter conditions: one (column, operator, value) predicate.

use crate::column::{ColumnRegistry, ColumnType};
use crate::error::ConditionError;
use crate::operator::{Arity, Operator};
use serde::{Deserialize, Serialize};

/// Value of a filter condition. Its shape is constrained by the operator's
/// arity and the column type (see [`expected_shape`]).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    #[default]
    Null,
    String(String),
    Number(f64),
    List(Vec<String>),
}

/// Value shape a (column type, operator) pair expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    None,
    Scalar,
    List,
}

/// Category columns are multi-select dropdowns, so even `=`/`!=` carry a
/// list of option values there.
pub fn expected_shape(column_type: Option<ColumnType>, operator: Operator) -> ValueShape {
    match operator.arity() {
        Arity::NoValue => ValueShape::None,
        Arity::Multi => ValueShape::List,
        Arity::Single if column_type == Some(ColumnType::Category) => ValueShape::List,
        Arity::Single => ValueShape::Scalar,
    }
}

/// Shortest representation that parses back to the same `f64`.
pub fn format_number(n: f64) -> String {
    format!("{}", n)
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

impl FilterValue {
    pub fn string(value: impl Into<String>) -> Self {
        FilterValue::String(value.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }

    /// Present per the validity rule: non-blank strings, finite numbers,
    /// non-empty lists.
    pub fn is_present(&self) -> bool {
        match self {
            FilterValue::Null => false,
            FilterValue::String(s) => !s.trim().is_empty(),
            FilterValue::Number(n) => n.is_finite(),
            FilterValue::List(items) => !items.is_empty(),
        }
    }

    /// Value as a list of strings, whatever its shape.
    pub fn as_strings(&self) -> Vec<String> {
        match self {
            FilterValue::Null => Vec::new(),
            FilterValue::String(s) => vec![s.clone()],
            FilterValue::Number(n) => vec![format_number(*n)],
            FilterValue::List(items) => items.clone(),
        }
    }

    /// First scalar value, if any.
    pub fn as_scalar(&self) -> Option<String> {
        self.as_strings().into_iter().next()
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FilterValue::Number(n) if n.is_finite() => Some(*n),
            FilterValue::String(s) => parse_number(s),
            FilterValue::List(items) if items.len() == 1 => parse_number(&items[0]),
            _ => None,
        }
    }

    /// Coerce into `shape`. Numeric columns turn parseable strings into
    /// numbers; boolean columns lowercase `true`/`false`.
    pub fn normalize(self, shape: ValueShape, column_type: Option<ColumnType>) -> Self {
        match shape {
            ValueShape::None => FilterValue::Null,
            ValueShape::List => match self {
                FilterValue::Null => FilterValue::Null,
                FilterValue::List(items) => FilterValue::List(items),
                FilterValue::String(s) if s.is_empty() => FilterValue::List(Vec::new()),
                other => FilterValue::List(other.as_strings()),
            },
            ValueShape::Scalar => {
                let scalar = match self {
                    FilterValue::List(mut items) => {
                        if items.is_empty() {
                            return FilterValue::Null;
                        }
                        FilterValue::String(items.swap_remove(0))
                    }
                    other => other,
                };
                match (column_type, scalar) {
                    (Some(t), FilterValue::String(s)) if t.is_numeric() => match parse_number(&s) {
                        Some(n) => FilterValue::Number(n),
                        None => FilterValue::String(s),
                    },
                    (Some(t), FilterValue::Number(n)) if !t.is_numeric() => {
                        FilterValue::String(format_number(n))
                    }
                    (Some(ColumnType::Boolean), FilterValue::String(s)) => {
                        let lowered = s.trim().to_ascii_lowercase();
                        if lowered == "true" || lowered == "false" {
                            FilterValue::String(lowered)
                        } else {
                            FilterValue::String(s)
                        }
                    }
                    (_, other) => other,
                }
            }
        }
    }
}

/// Fresh local identifier for a builder row. Not persisted anywhere.
pub fn new_filter_id() -> String {
    format!("filter-{}", uuid::Uuid::new_v4())
}

/// One row of the filter builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    #[serde(default = "new_filter_id")]
    pub id: String,
    #[serde(default)]
    pub column: String,
    #[serde(default)]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub value: FilterValue,
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, operator: Operator, value: FilterValue) -> Self {
        Self {
            id: new_filter_id(),
            column: column.into(),
            operator: Some(operator),
            value,
        }
    }

    /// An empty row with the default `=` operator.
    pub fn empty() -> Self {
        Self {
            id: new_filter_id(),
            column: String::new(),
            operator: Some(Operator::Equals),
            value: FilterValue::Null,
        }
    }

    /// Normalise the value shape against the registry.
    pub fn normalized(mut self, registry: &ColumnRegistry) -> Self {
        if let Some(op) = self.operator {
            let column_type = registry.column_type(&self.column);
            let value = std::mem::take(&mut self.value);
            self.value = value.normalize(expected_shape(column_type, op), column_type);
        }
        self
    }

    /// True when both describe the same predicate, ignoring ids.
    pub fn same_predicate(&self, other: &FilterCondition) -> bool {
        self.column == other.column && self.operator == other.operator && self.value == other.value
    }
}

/// Structural validity: column and operator set, and a value whenever the
/// operator needs one.
pub fn is_valid(condition: &FilterCondition) -> bool {
    if condition.column.trim().is_empty() {
        return false;
    }
    match condition.operator {
        None => false,
        Some(op) => !op.requires_value() || condition.value.is_present(),
    }
}

/// Full check against column metadata, returning the first failure for
/// inline display.
pub fn validate(
    condition: &FilterCondition,
    registry: &ColumnRegistry,
) -> Result<(), ConditionError> {
    let column = condition.column.trim();
    if column.is_empty() {
        return Err(ConditionError::ColumnRequired);
    }
    let operator = condition.operator.ok_or(ConditionError::OperatorRequired)?;
    let def = registry
        .definition(column)
        .ok_or_else(|| ConditionError::UnknownColumn(column.to_string()))?;
    if !def.allows(operator) {
        return Err(ConditionError::OperatorNotAllowed {
            column: column.to_string(),
            operator,
        });
    }
    if !operator.requires_value() {
        return Ok(());
    }
    if !condition.value.is_present() {
        return Err(ConditionError::ValueRequired);
    }

    let values = condition.value.as_strings();
    match def.column_type {
        t if t.is_numeric() => {
            if let FilterValue::Number(_) = condition.value {
                return Ok(());
            }
            if let Some(bad) = values.iter().find(|v| parse_number(v).is_none()) {
                return Err(ConditionError::InvalidNumber {
                    column: column.to_string(),
                    value: bad.clone(),
                });
            }
        }
        ColumnType::Datetime => {
            if let Some(bad) = values
                .iter()
                .find(|v| chrono::DateTime::parse_from_rfc3339(v.trim()).is_err())
            {
                return Err(ConditionError::InvalidDatetime {
                    column: column.to_string(),
                    value: bad.clone(),
                });
            }
        }
        ColumnType::Boolean => {
            if let Some(bad) = values
                .iter()
                .find(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "false"))
            {
                return Err(ConditionError::InvalidBoolean {
                    column: column.to_string(),
                    value: bad.clone(),
                });
            }
        }
        ColumnType::Category => {
            if let Some(bad) = values.iter().find(|v| def.option_label(v).is_none()) {
                return Err(ConditionError::UnknownOption {
                    column: column.to_string(),
                    value: bad.clone(),
                });
            }
        }
        _ => {}
    }

    if operator == Operator::Regex {
        for pattern in &values {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ConditionError::InvalidRegex {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(column: &str, operator: Option<Operator>, value: FilterValue) -> FilterCondition {
        FilterCondition {
            id: new_filter_id(),
            column: column.to_string(),
            operator,
            value,
        }
    }

    #[test]
    fn test_is_valid_requires_column_and_operator() {
        let v = FilterValue::string("x");
        assert!(!is_valid(&cond("", Some(Operator::Equals), v.clone())));
        assert!(!is_valid(&cond("   ", Some(Operator::Equals), v.clone())));
        assert!(!is_valid(&cond("name", None, v.clone())));
        assert!(is_valid(&cond("name", Some(Operator::Equals), v)));
    }

    #[test]
    fn test_is_valid_value_rules() {
        let eq = Some(Operator::Equals);
        assert!(!is_valid(&cond("name", eq, FilterValue::Null)));
        assert!(!is_valid(&cond("name", eq, FilterValue::string("  \t"))));
        assert!(!is_valid(&cond("tags", Some(Operator::In), FilterValue::List(vec![]))));
        assert!(is_valid(&cond("tags", Some(Operator::In), FilterValue::list(["a"]))));
        assert!(is_valid(&cond("total_cost", eq, FilterValue::Number(0.0))));
        assert!(!is_valid(&cond("total_cost", eq, FilterValue::Number(f64::NAN))));
    }

    #[test]
    fn test_no_value_operators_are_valid_without_value() {
        for op in [
            Operator::Exists,
            Operator::NotExists,
            Operator::IsEmpty,
            Operator::IsNotEmpty,
        ] {
            assert!(is_valid(&cond("attributes.x", Some(op), FilterValue::Null)));
        }
    }

    #[test]
    fn test_expected_shape() {
        assert_eq!(
            expected_shape(Some(ColumnType::Category), Operator::Equals),
            ValueShape::List
        );
        assert_eq!(
            expected_shape(Some(ColumnType::String), Operator::Equals),
            ValueShape::Scalar
        );
        assert_eq!(expected_shape(None, Operator::In), ValueShape::List);
        assert_eq!(
            expected_shape(Some(ColumnType::Json), Operator::Exists),
            ValueShape::None
        );
    }

    #[test]
    fn test_normalize_numeric_and_lists() {
        let n = FilterValue::string("0.01").normalize(ValueShape::Scalar, Some(ColumnType::Cost));
        assert_eq!(n, FilterValue::Number(0.01));

        let s = FilterValue::string("abc").normalize(ValueShape::Scalar, Some(ColumnType::Cost));
        assert_eq!(s, FilterValue::string("abc"));

        let l = FilterValue::string("1").normalize(ValueShape::List, Some(ColumnType::Category));
        assert_eq!(l, FilterValue::list(["1"]));

        let first = FilterValue::list(["a", "b"]).normalize(ValueShape::Scalar, None);
        assert_eq!(first, FilterValue::string("a"));

        let gone = FilterValue::string("x").normalize(ValueShape::None, None);
        assert_eq!(gone, FilterValue::Null);

        let b = FilterValue::string("TRUE").normalize(ValueShape::Scalar, Some(ColumnType::Boolean));
        assert_eq!(b, FilterValue::string("true"));

        let text = FilterValue::Number(5.0).normalize(ValueShape::Scalar, Some(ColumnType::String));
        assert_eq!(text, FilterValue::string("5"));
    }

    #[test]
    fn test_validate_against_registry() {
        let traces = ColumnRegistry::traces();

        assert_eq!(
            validate(&cond("bogus", Some(Operator::Equals), FilterValue::string("x")), traces),
            Err(ConditionError::UnknownColumn("bogus".into()))
        );
        assert_eq!(
            validate(&cond("trace_id", Some(Operator::In), FilterValue::list(["a"])), traces),
            Err(ConditionError::OperatorNotAllowed {
                column: "trace_id".into(),
                operator: Operator::In
            })
        );
        assert!(matches!(
            validate(&cond("duration", Some(Operator::GreaterThan), FilterValue::string("fast")), traces),
            Err(ConditionError::InvalidNumber { .. })
        ));
        assert!(matches!(
            validate(&cond("start_time", Some(Operator::GreaterThan), FilterValue::string("yesterday")), traces),
            Err(ConditionError::InvalidDatetime { .. })
        ));
        assert!(matches!(
            validate(&cond("status_code", Some(Operator::Equals), FilterValue::list(["7"])), traces),
            Err(ConditionError::UnknownOption { .. })
        ));
        assert!(matches!(
            validate(&cond("name", Some(Operator::Regex), FilterValue::string("(")), traces),
            Err(ConditionError::InvalidRegex { .. })
        ));
        assert_eq!(
            validate(&cond("start_time", Some(Operator::GreaterOrEqual), FilterValue::string("2025-01-01T00:00:00Z")), traces),
            Ok(())
        );
        assert_eq!(
            validate(&cond("attributes.gen_ai.system", Some(Operator::Exists), FilterValue::Null), traces),
            Ok(())
        );
    }

    #[test]
    fn test_value_serde_shapes() {
        let list: FilterValue = serde_json::from_str(r#"["1","2"]"#).unwrap();
        assert_eq!(list, FilterValue::list(["1", "2"]));
        let num: FilterValue = serde_json::from_str("3").unwrap();
        assert_eq!(num, FilterValue::Number(3.0));
        let null: FilterValue = serde_json::from_str("null").unwrap();
        assert_eq!(null, FilterValue::Null);
        assert_eq!(serde_json::to_string(&FilterValue::string("a")).unwrap(), "\"a\"");
    }
}
