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

//! Projection of table state onto backend query parameters.
//!
//! The backend exposes dedicated parameters for the common filters
//! (`status`, `min_cost`, `start_time`, ...). Conditions without one are
//! sent through the generic `filter` parameter as a JSON array. The mapping
//! is lossy: strict bounds become inclusive and repeated bounds collapse to
//! the tightest. Repeated inclusion lists on one parameter are intersected,
//! exclusion lists are merged.

use crate::column::{ColumnDef, ColumnRef};
use crate::condition::{format_number, is_valid, FilterCondition, FilterValue};
use crate::error::ProjectionError;
use crate::operator::Operator;
use crate::table_state::{TableKind, TableSpec, TableState};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use url::form_urlencoded;

/// A single query parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ApiValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl fmt::Display for ApiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiValue::Str(s) => f.write_str(s),
            ApiValue::Num(n) => f.write_str(&format_number(*n)),
            ApiValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for ApiValue {
    fn from(value: &str) -> Self {
        ApiValue::Str(value.to_string())
    }
}

impl From<String> for ApiValue {
    fn from(value: String) -> Self {
        ApiValue::Str(value)
    }
}

impl From<f64> for ApiValue {
    fn from(value: f64) -> Self {
        ApiValue::Num(value)
    }
}

impl From<u32> for ApiValue {
    fn from(value: u32) -> Self {
        ApiValue::Num(f64::from(value))
    }
}

impl From<bool> for ApiValue {
    fn from(value: bool) -> Self {
        ApiValue::Bool(value)
    }
}

/// Ordered query parameters for a list request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ApiParams(BTreeMap<String, ApiValue>);

impl ApiParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ApiValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ApiValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ApiValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ApiValue)> {
        self.0.iter()
    }

    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }

    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.0 {
            serializer.append_pair(key, &value.to_string());
        }
        serializer.finish()
    }

    /// Stable cache key component.
    pub fn cache_key(&self) -> String {
        self.to_query_string()
    }

    fn tighten_min(&mut self, key: &str, value: f64) {
        match self.0.get(key) {
            Some(ApiValue::Num(existing)) if *existing >= value => {}
            _ => self.insert(key, value),
        }
    }

    fn tighten_max(&mut self, key: &str, value: f64) {
        match self.0.get(key) {
            Some(ApiValue::Num(existing)) if *existing <= value => {}
            _ => self.insert(key, value),
        }
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key) {
            Some(ApiValue::Str(existing)) if !existing.is_empty() => {
                Some(existing.split(',').map(str::to_string).collect())
            }
            _ => None,
        }
    }

    /// Union with an existing list. Used for exclusions.
    fn append_list(&mut self, key: &str, values: &[String]) {
        let mut items = self.list(key).unwrap_or_default();
        for value in values {
            if !items.contains(value) {
                items.push(value.clone());
            }
        }
        self.insert(key, items.join(","));
    }

    /// Intersect with an existing list. Returns false when nothing is left.
    fn intersect_list(&mut self, key: &str, values: &[String]) -> bool {
        let mut items: Vec<String> = Vec::new();
        for value in values {
            if !items.contains(value) {
                items.push(value.clone());
            }
        }
        if let Some(existing) = self.list(key) {
            items.retain(|item| existing.contains(item));
        }
        if items.is_empty() {
            return false;
        }
        self.insert(key, items.join(","));
        true
    }
}

/// Where a (column, operator) pair lands in the request.
#[derive(Debug, Clone, Copy)]
enum Route {
    /// Status codes translated to labels, split into include / exclude.
    Status,
    Range { min: &'static str, max: &'static str },
    TimeRange { start: &'static str, end: &'static str },
    Exact(&'static str),
    List(&'static str),
    Bool(&'static str),
    /// Rule name contains: reuses the free-text `search` parameter.
    NameSearch,
    Generic,
}

fn trace_route(column: &str) -> Route {
    match column {
        "status_code" => Route::Status,
        "total_cost" => Route::Range { min: "min_cost", max: "max_cost" },
        "duration" => Route::Range { min: "min_duration", max: "max_duration" },
        "total_tokens" => Route::Range { min: "min_tokens", max: "max_tokens" },
        "trace_id" => Route::Exact("trace_id"),
        "session_id" => Route::Exact("session_id"),
        "user_id" => Route::Exact("user_id"),
        "model_name" => Route::List("model_name"),
        "service_name" => Route::List("service_name"),
        "environment" => Route::List("environment"),
        "tags" => Route::List("tags"),
        "bookmarked" => Route::Bool("bookmarked"),
        "has_error" => Route::Bool("has_error"),
        "start_time" => Route::TimeRange { start: "start_time", end: "end_time" },
        _ => Route::Generic,
    }
}

fn span_route(column: &str) -> Route {
    match column {
        "status_code" => Route::Status,
        "total_cost" => Route::Range { min: "min_cost", max: "max_cost" },
        "duration" => Route::Range { min: "min_duration", max: "max_duration" },
        "total_tokens" => Route::Range { min: "min_tokens", max: "max_tokens" },
        "trace_id" => Route::Exact("trace_id"),
        "span_id" => Route::Exact("span_id"),
        "span_kind" => Route::List("span_kind"),
        "span_type" => Route::List("type"),
        "model_name" => Route::List("model"),
        "provider_name" => Route::List("provider"),
        "level" => Route::List("level"),
        "start_time" => Route::TimeRange { start: "start_time", end: "end_time" },
        _ => Route::Generic,
    }
}

fn rule_route(column: &str) -> Route {
    match column {
        "status" => Route::List("status"),
        "scorer_type" => Route::List("scorer_type"),
        "target_scope" => Route::List("target_scope"),
        "name" => Route::NameSearch,
        "created_at" => Route::TimeRange { start: "created_after", end: "created_before" },
        _ => Route::Generic,
    }
}

fn route_for(kind: TableKind, column: &ColumnRef) -> Route {
    let ColumnRef::Static(id) = column else {
        return Route::Generic;
    };
    match kind {
        TableKind::Traces => trace_route(id),
        TableKind::Spans => span_route(id),
        TableKind::Rules => rule_route(id),
    }
}

fn status_label(code: &str) -> Option<&'static str> {
    match code.trim() {
        "0" => Some("unset"),
        "1" => Some("ok"),
        "2" => Some("error"),
        _ => None,
    }
}

fn invalid(column: &str, reason: impl Into<String>) -> ProjectionError {
    ProjectionError::InvalidValue {
        column: column.to_string(),
        reason: reason.into(),
    }
}

fn conflict(column: &str) -> ProjectionError {
    ProjectionError::ConflictingFilters(column.to_string())
}

fn parse_time(column: &str, value: &FilterValue) -> Result<(DateTime<FixedOffset>, String), ProjectionError> {
    let raw = value
        .as_scalar()
        .ok_or_else(|| invalid(column, "missing timestamp"))?;
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|e| invalid(column, format!("'{}' is not an RFC 3339 timestamp: {}", raw, e)))?;
    Ok((parsed, raw.trim().to_string()))
}

/// Accumulates routed conditions for one request.
struct Projector {
    kind: TableKind,
    /// Set once free text or a rule name filter has claimed `search`.
    search_taken: bool,
    params: ApiParams,
    generic: Vec<serde_json::Value>,
    /// Tightest start / end bounds seen so far, keyed by parameter name.
    times: BTreeMap<&'static str, DateTime<FixedOffset>>,
}

impl Projector {
    fn new(kind: TableKind, has_search: bool) -> Self {
        Self {
            kind,
            search_taken: has_search,
            params: ApiParams::new(),
            generic: Vec::new(),
            times: BTreeMap::new(),
        }
    }

    fn push_generic(&mut self, condition: &FilterCondition, operator: Operator) {
        self.generic.push(serde_json::json!({
            "column": condition.column.trim(),
            "operator": operator.symbol(),
            "value": condition.value,
        }));
    }

    fn push_time(&mut self, key: &'static str, later: bool, value: (DateTime<FixedOffset>, String)) {
        let (time, raw) = value;
        let tighter = match self.times.get(key) {
            Some(existing) if later => time > *existing,
            Some(existing) => time < *existing,
            None => true,
        };
        if tighter {
            self.times.insert(key, time);
            self.params.insert(key, raw);
        }
    }

    fn push(&mut self, condition: &FilterCondition, operator: Operator, column: &ColumnRef) -> Result<(), ProjectionError> {
        let name = condition.column.trim();
        match route_for(self.kind, column) {
            Route::Status => {
                let key = match operator {
                    Operator::Equals | Operator::In => "status",
                    Operator::NotEquals | Operator::NotIn => "status_not",
                    _ => {
                        self.push_generic(condition, operator);
                        return Ok(());
                    }
                };
                let labels = condition
                    .value
                    .as_strings()
                    .iter()
                    .map(|code| {
                        status_label(code)
                            .map(str::to_string)
                            .ok_or_else(|| invalid(name, format!("unknown status code '{}'", code)))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if key == "status_not" {
                    self.params.append_list(key, &labels);
                } else if !self.params.intersect_list(key, &labels) {
                    return Err(conflict(name));
                }
            }
            Route::Range { min, max } => {
                if operator == Operator::NotEquals {
                    self.push_generic(condition, operator);
                    return Ok(());
                }
                let n = condition
                    .value
                    .as_number()
                    .ok_or_else(|| invalid(name, "expected a number"))?;
                match operator {
                    Operator::GreaterThan | Operator::GreaterOrEqual => self.params.tighten_min(min, n),
                    Operator::LessThan | Operator::LessOrEqual => self.params.tighten_max(max, n),
                    Operator::Equals => {
                        self.params.tighten_min(min, n);
                        self.params.tighten_max(max, n);
                    }
                    _ => self.push_generic(condition, operator),
                }
            }
            Route::TimeRange { start, end } => match operator {
                Operator::GreaterThan | Operator::GreaterOrEqual => {
                    let value = parse_time(name, &condition.value)?;
                    self.push_time(start, true, value);
                }
                Operator::LessThan | Operator::LessOrEqual => {
                    let value = parse_time(name, &condition.value)?;
                    self.push_time(end, false, value);
                }
                _ => self.push_generic(condition, operator),
            },
            Route::Exact(key) => match (operator, condition.value.as_scalar()) {
                (Operator::Equals, Some(value)) => self.params.insert(key, value),
                _ => self.push_generic(condition, operator),
            },
            Route::List(key) => match operator {
                Operator::Equals | Operator::In => {
                    if !self.params.intersect_list(key, &condition.value.as_strings()) {
                        return Err(conflict(name));
                    }
                }
                _ => self.push_generic(condition, operator),
            },
            Route::Bool(key) => match (operator, condition.value.as_scalar()) {
                (Operator::Equals, Some(value)) => match value.trim().to_ascii_lowercase().as_str() {
                    "true" => self.params.insert(key, true),
                    "false" => self.params.insert(key, false),
                    other => return Err(invalid(name, format!("'{}' is not a boolean", other))),
                },
                _ => self.push_generic(condition, operator),
            },
            Route::NameSearch => match (operator, condition.value.as_scalar()) {
                (Operator::Contains, Some(value)) if !self.search_taken => {
                    self.search_taken = true;
                    self.params.insert("search", value)
                }
                _ => self.push_generic(condition, operator),
            },
            Route::Generic => self.push_generic(condition, operator),
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ApiParams, ProjectionError> {
        if !self.generic.is_empty() {
            let encoded = serde_json::to_string(&self.generic)
                .map_err(|e| invalid("filter", e.to_string()))?;
            self.params.insert("filter", encoded);
        }
        Ok(self.params)
    }
}

fn definition<'a>(spec: &'a TableSpec, column: &str) -> Result<(&'a ColumnDef, ColumnRef), ProjectionError> {
    let reference = spec
        .registry
        .resolve(column)
        .ok_or_else(|| ProjectionError::UnknownColumn(column.to_string()))?;
    let def = spec
        .registry
        .get(reference.base_id())
        .ok_or_else(|| ProjectionError::UnknownColumn(column.to_string()))?;
    Ok((def, reference))
}

/// Map `state` onto the list endpoint parameters of `spec`'s table.
///
/// Incomplete conditions and values the backend cannot take (a non-numeric
/// cost, an unknown status code) are skipped. An operator the registry does
/// not offer for its column, or inclusion lists that can never match
/// together, fail the whole projection.
pub fn to_api_params(state: &TableState, spec: &TableSpec) -> Result<ApiParams, ProjectionError> {
    let search = state.search().trim();
    let mut projector = Projector::new(spec.kind, !search.is_empty());

    for condition in state.filters() {
        if !is_valid(condition) {
            tracing::debug!(id = %condition.id, "Skipping incomplete filter");
            continue;
        }
        let Some(operator) = condition.operator else {
            continue;
        };
        let column = condition.column.trim();
        let (def, reference) = definition(spec, column)?;
        if !def.allows(operator) {
            return Err(ProjectionError::UnsupportedOperator {
                column: column.to_string(),
                operator,
            });
        }
        let normalized = condition.clone().normalized(spec.registry);
        match projector.push(&normalized, operator, &reference) {
            Err(ProjectionError::InvalidValue { column, reason }) => {
                tracing::debug!(column = %column, reason = %reason, "Skipping filter with invalid value");
            }
            result => result?,
        }
    }

    let mut params = projector.finish()?;
    params.insert("page", state.page());
    params.insert("limit", state.page_size());
    params.insert("sort_by", state.sort().column.clone());
    params.insert("sort_dir", state.sort().direction.as_str());
    if !search.is_empty() {
        params.insert("search", search.to_string());
        let scope = state
            .search_scope()
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        params.insert("search_type", scope);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_state::SearchScope;

    fn project(kind: TableKind, filters: Vec<FilterCondition>) -> ApiParams {
        let spec = kind.spec();
        let mut state = TableState::new(spec);
        state.set_filters(filters);
        to_api_params(&state, spec).unwrap()
    }

    #[test]
    fn test_common_params() {
        let spec = TableKind::Traces.spec();
        let mut state = TableState::new(spec);
        state.set_search("checkout");
        state.set_search_scope(vec![SearchScope::Id, SearchScope::Content]);
        state.set_page(2);

        let params = to_api_params(&state, spec).unwrap();
        assert_eq!(params.get("page"), Some(&ApiValue::Num(2.0)));
        assert_eq!(params.get("limit"), Some(&ApiValue::Num(50.0)));
        assert_eq!(params.get("sort_by"), Some(&ApiValue::from("start_time")));
        assert_eq!(params.get("sort_dir"), Some(&ApiValue::from("desc")));
        assert_eq!(params.get("search"), Some(&ApiValue::from("checkout")));
        assert_eq!(params.get("search_type"), Some(&ApiValue::from("id,content")));
    }

    #[test]
    fn test_status_equality_maps_to_label() {
        let params = project(
            TableKind::Traces,
            vec![FilterCondition::new("status_code", Operator::Equals, FilterValue::list(["1"]))],
        );
        assert_eq!(params.get("status"), Some(&ApiValue::from("ok")));
        assert!(!params.contains_key("status_not"));
    }

    #[test]
    fn test_status_exclusion() {
        let params = project(
            TableKind::Traces,
            vec![FilterCondition::new("status_code", Operator::NotIn, FilterValue::list(["0", "2"]))],
        );
        assert_eq!(params.get("status_not"), Some(&ApiValue::from("unset,error")));
        assert!(!params.contains_key("status"));
    }

    #[test]
    fn test_cost_lower_bound_only() {
        let params = project(
            TableKind::Traces,
            vec![FilterCondition::new("total_cost", Operator::GreaterThan, FilterValue::Number(0.01))],
        );
        assert_eq!(params.get("min_cost"), Some(&ApiValue::Num(0.01)));
        assert!(!params.contains_key("max_cost"));
    }

    #[test]
    fn test_ranges_keep_tightest_bound() {
        let params = project(
            TableKind::Traces,
            vec![
                FilterCondition::new("duration", Operator::GreaterOrEqual, FilterValue::Number(100.0)),
                FilterCondition::new("duration", Operator::GreaterThan, FilterValue::Number(250.0)),
                FilterCondition::new("duration", Operator::LessThan, FilterValue::Number(900.0)),
                FilterCondition::new("duration", Operator::LessOrEqual, FilterValue::Number(5000.0)),
                FilterCondition::new("total_tokens", Operator::Equals, FilterValue::string("42")),
            ],
        );
        assert_eq!(params.get("min_duration"), Some(&ApiValue::Num(250.0)));
        assert_eq!(params.get("max_duration"), Some(&ApiValue::Num(900.0)));
        assert_eq!(params.get("min_tokens"), Some(&ApiValue::Num(42.0)));
        assert_eq!(params.get("max_tokens"), Some(&ApiValue::Num(42.0)));
    }

    #[test]
    fn test_time_window() {
        let params = project(
            TableKind::Traces,
            vec![
                FilterCondition::new("start_time", Operator::GreaterOrEqual, FilterValue::string("2025-01-01T00:00:00Z")),
                FilterCondition::new("start_time", Operator::GreaterThan, FilterValue::string("2025-02-01T00:00:00Z")),
                FilterCondition::new("start_time", Operator::LessThan, FilterValue::string("2025-03-01T00:00:00+02:00")),
            ],
        );
        assert_eq!(params.get("start_time"), Some(&ApiValue::from("2025-02-01T00:00:00Z")));
        assert_eq!(params.get("end_time"), Some(&ApiValue::from("2025-03-01T00:00:00+02:00")));
    }

    #[test]
    fn test_dedicated_trace_params() {
        let params = project(
            TableKind::Traces,
            vec![
                FilterCondition::new("model_name", Operator::In, FilterValue::list(["gpt-4o", "claude-3"])),
                FilterCondition::new("session_id", Operator::Equals, FilterValue::string("sess-1")),
                FilterCondition::new("bookmarked", Operator::Equals, FilterValue::string("true")),
                FilterCondition::new("tags", Operator::In, FilterValue::list(["prod"])),
            ],
        );
        assert_eq!(params.get("model_name"), Some(&ApiValue::from("gpt-4o,claude-3")));
        assert_eq!(params.get("session_id"), Some(&ApiValue::from("sess-1")));
        assert_eq!(params.get("bookmarked"), Some(&ApiValue::Bool(true)));
        assert_eq!(params.get("tags"), Some(&ApiValue::from("prod")));
        assert!(!params.contains_key("filter"));
    }

    #[test]
    fn test_generic_filter_param() {
        let params = project(
            TableKind::Traces,
            vec![
                FilterCondition::new("name", Operator::StartsWith, FilterValue::string("chat")),
                FilterCondition::new("attributes.gen_ai.system", Operator::Exists, FilterValue::Null),
                FilterCondition::new("total_cost", Operator::NotEquals, FilterValue::Number(0.0)),
            ],
        );
        let Some(ApiValue::Str(raw)) = params.get("filter") else {
            panic!("expected filter param");
        };
        let parsed: serde_json::Value = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([
                {"column": "name", "operator": "STARTS WITH", "value": "chat"},
                {"column": "attributes.gen_ai.system", "operator": "EXISTS", "value": null},
                {"column": "total_cost", "operator": "!=", "value": 0.0}
            ])
        );
    }

    #[test]
    fn test_unsupported_operator_is_rejected() {
        let spec = TableKind::Traces.spec();
        let mut state = TableState::new(spec);
        state.set_filters(vec![FilterCondition::new(
            "trace_id",
            Operator::Contains,
            FilterValue::string("abc"),
        )]);
        assert_eq!(
            to_api_params(&state, spec),
            Err(ProjectionError::UnsupportedOperator {
                column: "trace_id".into(),
                operator: Operator::Contains
            })
        );
    }

    #[test]
    fn test_incomplete_filters_are_skipped() {
        let params = project(TableKind::Traces, vec![FilterCondition::empty()]);
        assert!(!params.contains_key("filter"));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_span_params() {
        let params = project(
            TableKind::Spans,
            vec![
                FilterCondition::new("span_type", Operator::Equals, FilterValue::list(["generation"])),
                FilterCondition::new("provider_name", Operator::Equals, FilterValue::string("openai")),
                FilterCondition::new("span_kind", Operator::In, FilterValue::list(["2", "3"])),
            ],
        );
        assert_eq!(params.get("type"), Some(&ApiValue::from("generation")));
        assert_eq!(params.get("provider"), Some(&ApiValue::from("openai")));
        assert_eq!(params.get("span_kind"), Some(&ApiValue::from("2,3")));
    }

    #[test]
    fn test_rule_name_contains_uses_search_when_free() {
        let spec = TableKind::Rules.spec();
        let mut state = TableState::new(spec);
        state.set_filters(vec![
            FilterCondition::new("name", Operator::Contains, FilterValue::string("toxicity")),
            FilterCondition::new("status", Operator::Equals, FilterValue::list(["active"])),
        ]);
        let params = to_api_params(&state, spec).unwrap();
        assert_eq!(params.get("search"), Some(&ApiValue::from("toxicity")));
        assert_eq!(params.get("status"), Some(&ApiValue::from("active")));
        assert_eq!(params.get("limit"), Some(&ApiValue::Num(20.0)));

        state.set_search("helpfulness");
        let params = to_api_params(&state, spec).unwrap();
        assert_eq!(params.get("search"), Some(&ApiValue::from("helpfulness")));
        assert!(params.contains_key("filter"));
    }

    #[test]
    fn test_repeated_inclusion_lists_intersect() {
        let params = project(
            TableKind::Traces,
            vec![
                FilterCondition::new("model_name", Operator::In, FilterValue::list(["a", "b", "c"])),
                FilterCondition::new("model_name", Operator::In, FilterValue::list(["c", "b"])),
                FilterCondition::new("status_code", Operator::In, FilterValue::list(["1", "2"])),
                FilterCondition::new("status_code", Operator::Equals, FilterValue::list(["2"])),
                FilterCondition::new("status_code", Operator::NotEquals, FilterValue::list(["0"])),
                FilterCondition::new("status_code", Operator::NotIn, FilterValue::list(["1"])),
            ],
        );
        assert_eq!(params.get("model_name"), Some(&ApiValue::from("b,c")));
        assert_eq!(params.get("status"), Some(&ApiValue::from("error")));
        assert_eq!(params.get("status_not"), Some(&ApiValue::from("unset,ok")));
    }

    #[test]
    fn test_disjoint_inclusion_lists_are_rejected() {
        let spec = TableKind::Traces.spec();
        let mut state = TableState::new(spec);
        state.set_filters(vec![
            FilterCondition::new("model_name", Operator::In, FilterValue::list(["a", "b"])),
            FilterCondition::new("model_name", Operator::Equals, FilterValue::string("c")),
        ]);
        assert_eq!(
            to_api_params(&state, spec),
            Err(ProjectionError::ConflictingFilters("model_name".into()))
        );
    }

    #[test]
    fn test_second_rule_name_search_goes_to_filter() {
        let params = project(
            TableKind::Rules,
            vec![
                FilterCondition::new("name", Operator::Contains, FilterValue::string("tox")),
                FilterCondition::new("name", Operator::Contains, FilterValue::string("help")),
            ],
        );
        assert_eq!(params.get("search"), Some(&ApiValue::from("tox")));
        let Some(ApiValue::Str(raw)) = params.get("filter") else {
            panic!("expected filter param");
        };
        let parsed: serde_json::Value = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([{"column": "name", "operator": "CONTAINS", "value": "help"}])
        );
    }

    #[test]
    fn test_invalid_values_are_skipped() {
        let params = project(
            TableKind::Traces,
            vec![
                FilterCondition::new("total_cost", Operator::GreaterThan, FilterValue::string("abc")),
                FilterCondition::new("status_code", Operator::Equals, FilterValue::list(["7"])),
                FilterCondition::new("bookmarked", Operator::Equals, FilterValue::string("maybe")),
                FilterCondition::new("duration", Operator::LessThan, FilterValue::Number(900.0)),
            ],
        );
        assert!(!params.contains_key("min_cost"));
        assert!(!params.contains_key("status"));
        assert!(!params.contains_key("bookmarked"));
        assert_eq!(params.get("max_duration"), Some(&ApiValue::Num(900.0)));
    }

    #[test]
    fn test_query_string_rendering() {
        let params = ApiParams::new().with("limit", 50u32).with("status", "ok,error");
        assert_eq!(params.to_query_string(), "limit=50&status=ok%2Cerror");
    }
}
