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

//! Column registry
//!
//! Static metadata for every filterable column of a browsing surface. The
//! registry is the single source of truth for which operators a column
//! offers: an operator only appears here if the backend can honour it for
//! that column, so the API projection never needs its own exception list.
//!
//! Attribute maps (`attributes`, `resource_attributes`) are open-ended key
//! spaces. They are registered once as a *dynamic* base column and referenced
//! as `base.key`, resolved into [`ColumnRef::Dynamic`].

use crate::error::FilterError;
use crate::operator::Operator;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Semantic type of a column. Drives the permitted operator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Number,
    /// Milliseconds
    Duration,
    /// USD
    Cost,
    /// RFC 3339 timestamp
    Datetime,
    Category,
    Boolean,
    Json,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Number | ColumnType::Duration | ColumnType::Cost)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Duration => "duration",
            ColumnType::Cost => "cost",
            ColumnType::Datetime => "datetime",
            ColumnType::Category => "category",
            ColumnType::Boolean => "boolean",
            ColumnType::Json => "json",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use Operator::*;

const STRING_OPERATORS: &[Operator] = &[
    Equals, NotEquals, Contains, NotContains, StartsWith, EndsWith, Regex, In, NotIn, IsEmpty,
    IsNotEmpty, Search,
];
const NUMERIC_OPERATORS: &[Operator] = &[
    Equals, NotEquals, GreaterThan, LessThan, GreaterOrEqual, LessOrEqual,
];
const DATETIME_OPERATORS: &[Operator] = &[GreaterThan, LessThan, GreaterOrEqual, LessOrEqual];
const CATEGORY_OPERATORS: &[Operator] = &[Equals, NotEquals, In, NotIn];
const BOOLEAN_OPERATORS: &[Operator] = &[Equals];
const JSON_OPERATORS: &[Operator] = &[
    Equals, NotEquals, Contains, NotContains, Exists, NotExists, Search,
];

/// Exact operator set permitted for a column type.
pub fn operators_for_type(column_type: ColumnType) -> &'static [Operator] {
    match column_type {
        ColumnType::String => STRING_OPERATORS,
        ColumnType::Number | ColumnType::Duration | ColumnType::Cost => NUMERIC_OPERATORS,
        ColumnType::Datetime => DATETIME_OPERATORS,
        ColumnType::Category => CATEGORY_OPERATORS,
        ColumnType::Boolean => BOOLEAN_OPERATORS,
        ColumnType::Json => JSON_OPERATORS,
    }
}

/// Enumerated value of a category column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Backend field name
    pub id: String,
    pub label: String,
    pub column_type: ColumnType,
    pub operators: Vec<Operator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ColumnOption>,
    /// Sub-keys are discovered at runtime (`id.key`)
    #[serde(default)]
    pub dynamic: bool,
}

impl ColumnDef {
    /// New column offering every operator of its type.
    pub fn new(id: &str, label: &str, column_type: ColumnType) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            column_type,
            operators: operators_for_type(column_type).to_vec(),
            options: Vec::new(),
            dynamic: false,
        }
    }

    /// Restrict to the given operators (order is the dropdown order).
    pub fn only(mut self, operators: &[Operator]) -> Self {
        self.operators = operators.to_vec();
        self
    }

    pub fn options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options
            .iter()
            .map(|(value, label)| ColumnOption {
                value: value.to_string(),
                label: label.to_string(),
            })
            .collect();
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn allows(&self, operator: Operator) -> bool {
        self.operators.contains(&operator)
    }

    /// Label for a category option value, if it is one.
    pub fn option_label(&self, value: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label.as_str())
    }
}

/// A discovered key under a dynamic base column, e.g. `attributes.gen_ai.system`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DynamicColumn {
    pub base_id: String,
    pub key: String,
}

impl fmt::Display for DynamicColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.base_id, self.key)
    }
}

/// A column reference resolved against a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnRef {
    Static(String),
    Dynamic(DynamicColumn),
}

impl ColumnRef {
    /// Registry id of the defining column.
    pub fn base_id(&self) -> &str {
        match self {
            ColumnRef::Static(id) => id,
            ColumnRef::Dynamic(d) => &d.base_id,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Static(id) => f.write_str(id),
            ColumnRef::Dynamic(d) => d.fmt(f),
        }
    }
}

/// Ordered column metadata for one table.
#[derive(Debug, Clone)]
pub struct ColumnRegistry {
    columns: Vec<ColumnDef>,
}

impl ColumnRegistry {
    /// Build a registry, checking every column against its type's operator set.
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self, FilterError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.id.as_str()) {
                return Err(FilterError::DuplicateColumn(column.id.clone()));
            }
            let permitted = operators_for_type(column.column_type);
            if let Some(op) = column.operators.iter().find(|op| !permitted.contains(op)) {
                return Err(FilterError::InvalidColumn {
                    column: column.id.clone(),
                    operator: *op,
                });
            }
            if column.column_type == ColumnType::Category && column.options.is_empty() {
                return Err(FilterError::MissingOptions(column.id.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn traces() -> &'static ColumnRegistry {
        &TRACE_COLUMNS
    }

    pub fn spans() -> &'static ColumnRegistry {
        &SPAN_COLUMNS
    }

    pub fn rules() -> &'static ColumnRegistry {
        &RULE_COLUMNS
    }

    pub fn get(&self, id: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn dynamic_bases(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.dynamic)
    }

    /// Resolve a raw column string. Exact ids win over dynamic prefixes.
    pub fn resolve(&self, raw: &str) -> Option<ColumnRef> {
        if self.get(raw).is_some() {
            return Some(ColumnRef::Static(raw.to_string()));
        }
        self.dynamic_bases().find_map(|base| {
            raw.strip_prefix(base.id.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .filter(|key| !key.is_empty())
                .map(|key| {
                    ColumnRef::Dynamic(DynamicColumn {
                        base_id: base.id.clone(),
                        key: key.to_string(),
                    })
                })
        })
    }

    /// Definition governing a raw column (the base column for dynamic keys).
    pub fn definition(&self, raw: &str) -> Option<&ColumnDef> {
        self.resolve(raw).and_then(|r| self.get(r.base_id()))
    }

    pub fn column_type(&self, raw: &str) -> Option<ColumnType> {
        self.definition(raw).map(|c| c.column_type)
    }

    /// Operators offered for a raw column; empty when the column is unknown.
    pub fn operators(&self, raw: &str) -> &[Operator] {
        self.definition(raw)
            .map(|c| c.operators.as_slice())
            .unwrap_or(&[])
    }

    pub fn allows(&self, raw: &str, operator: Operator) -> bool {
        self.operators(raw).contains(&operator)
    }
}

const STATUS_OPTIONS: &[(&str, &str)] = &[("0", "Unset"), ("1", "OK"), ("2", "Error")];
const TEXT_BODY_OPERATORS: &[Operator] = &[Contains, NotContains, Search, IsEmpty, IsNotEmpty];

static TRACE_COLUMNS: Lazy<ColumnRegistry> = Lazy::new(|| {
    ColumnRegistry::new(vec![
        ColumnDef::new("trace_id", "Trace ID", ColumnType::String).only(&[Equals]),
        ColumnDef::new("name", "Name", ColumnType::String).only(&[
            Equals, NotEquals, Contains, NotContains, StartsWith, EndsWith, Regex, IsEmpty,
            IsNotEmpty, Search,
        ]),
        ColumnDef::new("status_code", "Status", ColumnType::Category).options(STATUS_OPTIONS),
        ColumnDef::new("service_name", "Service", ColumnType::String).only(&[Equals, In]),
        ColumnDef::new("model_name", "Model", ColumnType::String).only(&[Equals, In]),
        ColumnDef::new("environment", "Environment", ColumnType::String).only(&[Equals, In]),
        ColumnDef::new("session_id", "Session ID", ColumnType::String).only(&[Equals]),
        ColumnDef::new("user_id", "User ID", ColumnType::String).only(&[Equals]),
        ColumnDef::new("total_cost", "Cost", ColumnType::Cost),
        ColumnDef::new("duration", "Duration", ColumnType::Duration),
        ColumnDef::new("total_tokens", "Tokens", ColumnType::Number),
        ColumnDef::new("start_time", "Start Time", ColumnType::Datetime),
        ColumnDef::new("tags", "Tags", ColumnType::String).only(&[In]),
        ColumnDef::new("bookmarked", "Bookmarked", ColumnType::Boolean),
        ColumnDef::new("has_error", "Has Error", ColumnType::Boolean),
        ColumnDef::new("input", "Input", ColumnType::String).only(TEXT_BODY_OPERATORS),
        ColumnDef::new("output", "Output", ColumnType::String).only(TEXT_BODY_OPERATORS),
        ColumnDef::new("attributes", "Attributes", ColumnType::Json).dynamic(),
        ColumnDef::new("resource_attributes", "Resource Attributes", ColumnType::Json).dynamic(),
    ])
    .expect("built-in trace columns are valid")
});

static SPAN_COLUMNS: Lazy<ColumnRegistry> = Lazy::new(|| {
    ColumnRegistry::new(vec![
        ColumnDef::new("span_id", "Span ID", ColumnType::String).only(&[Equals]),
        ColumnDef::new("trace_id", "Trace ID", ColumnType::String).only(&[Equals]),
        ColumnDef::new("span_name", "Span Name", ColumnType::String).only(&[
            Equals, NotEquals, Contains, NotContains, StartsWith, EndsWith, Regex, Search,
        ]),
        ColumnDef::new("span_kind", "Kind", ColumnType::Category).options(&[
            ("1", "Internal"),
            ("2", "Server"),
            ("3", "Client"),
            ("4", "Producer"),
            ("5", "Consumer"),
        ]),
        ColumnDef::new("span_type", "Type", ColumnType::Category)
            .only(&[Equals, In])
            .options(&[
                ("span", "Span"),
                ("generation", "Generation"),
                ("event", "Event"),
                ("tool", "Tool"),
                ("agent", "Agent"),
                ("chain", "Chain"),
                ("retrieval", "Retrieval"),
                ("embedding", "Embedding"),
            ]),
        ColumnDef::new("status_code", "Status", ColumnType::Category).options(STATUS_OPTIONS),
        ColumnDef::new("level", "Level", ColumnType::Category)
            .only(&[Equals, In])
            .options(&[
                ("DEBUG", "Debug"),
                ("DEFAULT", "Default"),
                ("WARNING", "Warning"),
                ("ERROR", "Error"),
            ]),
        ColumnDef::new("model_name", "Model", ColumnType::String).only(&[Equals, In]),
        ColumnDef::new("provider_name", "Provider", ColumnType::String).only(&[Equals, In]),
        ColumnDef::new("duration", "Duration", ColumnType::Duration),
        ColumnDef::new("total_cost", "Cost", ColumnType::Cost),
        ColumnDef::new("total_tokens", "Tokens", ColumnType::Number),
        ColumnDef::new("start_time", "Start Time", ColumnType::Datetime),
        ColumnDef::new("input", "Input", ColumnType::String).only(TEXT_BODY_OPERATORS),
        ColumnDef::new("output", "Output", ColumnType::String).only(TEXT_BODY_OPERATORS),
        ColumnDef::new("attributes", "Attributes", ColumnType::Json).dynamic(),
        ColumnDef::new("resource_attributes", "Resource Attributes", ColumnType::Json).dynamic(),
    ])
    .expect("built-in span columns are valid")
});

static RULE_COLUMNS: Lazy<ColumnRegistry> = Lazy::new(|| {
    ColumnRegistry::new(vec![
        ColumnDef::new("name", "Name", ColumnType::String).only(&[Equals, Contains]),
        ColumnDef::new("status", "Status", ColumnType::Category)
            .only(&[Equals, In])
            .options(&[
                ("active", "Active"),
                ("inactive", "Inactive"),
                ("paused", "Paused"),
            ]),
        ColumnDef::new("scorer_type", "Scorer", ColumnType::Category)
            .only(&[Equals, In])
            .options(&[
                ("llm", "LLM"),
                ("builtin", "Built-in"),
                ("regex", "Regex"),
            ]),
        ColumnDef::new("target_scope", "Target", ColumnType::Category)
            .only(&[Equals])
            .options(&[("span", "Span"), ("trace", "Trace")]),
        ColumnDef::new("created_at", "Created", ColumnType::Datetime),
    ])
    .expect("built-in rule columns are valid")
});
