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

//! Traces, spans and scores as returned by the list and detail endpoints.

use crate::column::{ColumnRef, ColumnRegistry, DynamicColumn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Pagination metadata of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Ceiling of `total / limit`; 0 when `limit` is 0.
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

/// `{ "data": [...], "pagination": {...} }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        self.pagination.total_pages()
    }
}

/// Single-resource envelope: `{ "data": T }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// OpenTelemetry status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub status_code: StatusCode,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub model_names: Vec<String>,
    #[serde(default)]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub span_count: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Trace {
    pub fn has_error(&self) -> bool {
        self.status_code == StatusCode::Error
    }
}

/// Body of `PUT /v1/traces/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub span_id: String,
    pub trace_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    pub span_name: String,
    /// 1 internal, 2 server, 3 client, 4 producer, 5 consumer
    #[serde(default)]
    pub span_kind: Option<u8>,
    #[serde(default)]
    pub span_type: Option<String>,
    #[serde(default)]
    pub status_code: StatusCode,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub resource_attributes: HashMap<String, serde_json::Value>,
}

impl Span {
    pub fn is_root(&self) -> bool {
        self.parent_span_id.as_deref().map_or(true, str::is_empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreDataType {
    Numeric,
    Categorical,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Api,
    Eval,
    Annotation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub id: String,
    pub trace_id: String,
    #[serde(default)]
    pub span_id: Option<String>,
    pub name: String,
    pub data_type: ScoreDataType,
    pub source: ScoreSource,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub string_value: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Set for scores produced by an evaluation rule
    #[serde(default)]
    pub rule_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Score {
    /// Human readable value for table cells.
    pub fn display_value(&self) -> String {
        match (self.data_type, self.value, &self.string_value) {
            (_, _, Some(s)) => s.clone(),
            (ScoreDataType::Boolean, Some(v), None) => (v != 0.0).to_string(),
            (_, Some(v), None) => format!("{:.3}", v),
            _ => "-".to_string(),
        }
    }
}

/// Values offered in filter dropdowns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub status_codes: Vec<String>,
}

impl FilterOptions {
    /// Options for a column id, if this payload carries any.
    pub fn for_column(&self, column: &str) -> Option<&[String]> {
        let values = match column {
            "model_name" => &self.models,
            "service_name" => &self.services,
            "environment" => &self.environments,
            "tags" => &self.tags,
            "provider_name" => &self.providers,
            "status_code" => &self.status_codes,
            _ => return None,
        };
        Some(values.as_slice())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeSource {
    Span,
    Resource,
}

impl AttributeSource {
    /// Dynamic base column this source maps to.
    pub fn base_column(&self) -> &'static str {
        match self {
            AttributeSource::Span => "attributes",
            AttributeSource::Resource => "resource_attributes",
        }
    }
}

/// An attribute key discovered from ingested data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeKey {
    pub key: String,
    pub source: AttributeSource,
    #[serde(default)]
    pub value_type: Option<String>,
}

/// Discovered attribute keys, used to offer and resolve dynamic columns.
///
/// The registry accepts any `base.key`; the catalog only accepts keys the
/// backend has actually seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeCatalog {
    keys: BTreeMap<AttributeSource, Vec<AttributeKey>>,
}

impl AttributeCatalog {
    pub fn new(keys: Vec<AttributeKey>) -> Self {
        let mut catalog = Self::default();
        for key in keys {
            let bucket = catalog.keys.entry(key.source).or_default();
            if !bucket.iter().any(|k| k.key == key.key) {
                bucket.push(key);
            }
        }
        for bucket in catalog.keys.values_mut() {
            bucket.sort_by(|a, b| a.key.cmp(&b.key));
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.keys.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self, source: AttributeSource) -> &[AttributeKey] {
        self.keys.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every discovered key as a dynamic column, span attributes first.
    pub fn columns(&self) -> Vec<DynamicColumn> {
        self.keys
            .values()
            .flatten()
            .map(|k| DynamicColumn {
                base_id: k.source.base_column().to_string(),
                key: k.key.clone(),
            })
            .collect()
    }

    /// Resolve `base.key` against the registry and the discovered keys.
    pub fn resolve(&self, registry: &ColumnRegistry, raw: &str) -> Option<DynamicColumn> {
        let ColumnRef::Dynamic(column) = registry.resolve(raw)? else {
            return None;
        };
        let source = match column.base_id.as_str() {
            "attributes" => AttributeSource::Span,
            "resource_attributes" => AttributeSource::Resource,
            _ => return None,
        };
        self.keys(source)
            .iter()
            .any(|k| k.key == column.key)
            .then_some(column)
    }
}
