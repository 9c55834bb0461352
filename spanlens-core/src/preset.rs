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

//! Filter presets: named, server-persisted bundles of filter state.

use crate::column::ColumnRegistry;
use crate::condition::{new_filter_id, FilterCondition, FilterValue};
use crate::error::ValidationErrors;
use crate::filter_state::{FilterState, SearchScope, DEFAULT_MAX_FILTERS};
use crate::operator::Operator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const MAX_PRESET_NAME_LENGTH: usize = 100;

/// Table a preset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetTable {
    Traces,
    Spans,
}

impl PresetTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresetTable::Traces => "traces",
            PresetTable::Spans => "spans",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "traces" => Some(PresetTable::Traces),
            "spans" => Some(PresetTable::Spans),
            _ => None,
        }
    }

    pub fn registry(&self) -> &'static ColumnRegistry {
        match self {
            PresetTable::Traces => ColumnRegistry::traces(),
            PresetTable::Spans => ColumnRegistry::spans(),
        }
    }
}

impl fmt::Display for PresetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A condition as persisted: no local row id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetFilter {
    /// Older payloads carry the builder id; kept on load when present.
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    pub column: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: FilterValue,
}

impl PresetFilter {
    /// `None` for rows without an operator; those are never persisted.
    pub fn from_condition(condition: &FilterCondition) -> Option<Self> {
        Some(Self {
            id: None,
            column: condition.column.trim().to_string(),
            operator: condition.operator?,
            value: condition.value.clone(),
        })
    }

    pub fn to_condition(&self, registry: &ColumnRegistry) -> FilterCondition {
        FilterCondition {
            id: self.id.clone().unwrap_or_else(new_filter_id),
            column: self.column.clone(),
            operator: Some(self.operator),
            value: self.value.clone(),
        }
        .normalized(registry)
    }
}

/// Only the valid rows of `state`, stripped of ids.
pub fn capture_filters(state: &FilterState) -> Vec<PresetFilter> {
    state
        .valid_conditions()
        .into_iter()
        .filter_map(PresetFilter::from_condition)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPreset {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub table_name: PresetTable,
    #[serde(default)]
    pub filters: Vec<PresetFilter>,
    #[serde(default)]
    pub search_query: Option<String>,
    #[serde(default)]
    pub search_types: Vec<SearchScope>,
    #[serde(default)]
    pub column_order: Option<Vec<String>>,
    #[serde(default)]
    pub column_visibility: Option<BTreeMap<String, bool>>,
    /// Visible to every project member, not just the creator
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FilterPreset {
    /// Rebuild builder state from this preset.
    pub fn to_state(&self, max_filters: usize) -> FilterState {
        FilterState::from_preset(self, self.table_name.registry(), max_filters)
    }

    /// Case-insensitive match on name or description.
    pub fn matches(&self, query: &str) -> bool {
        let query_lower = query.to_lowercase();
        self.name.to_lowercase().contains(&query_lower)
            || self
                .description
                .as_ref()
                .map(|d| d.to_lowercase().contains(&query_lower))
                .unwrap_or(false)
    }
}

impl FilterState {
    /// Inverse of [`CreatePresetRequest::capture`]. Ids are regenerated for
    /// rows that arrive without one.
    pub fn from_preset(preset: &FilterPreset, registry: &ColumnRegistry, max_filters: usize) -> Self {
        let conditions = preset
            .filters
            .iter()
            .map(|f| f.to_condition(registry))
            .collect();
        let mut state = FilterState::from_conditions(conditions, max_filters);
        state.set_search(
            preset.search_query.clone().unwrap_or_default(),
            preset.search_types.clone(),
        );
        state
    }
}

fn validate_name(name: &str, errors: &mut ValidationErrors) {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        errors.push("name", "Name is required");
    } else if trimmed.chars().count() > MAX_PRESET_NAME_LENGTH {
        errors.push(
            "name",
            format!("Name must be at most {} characters", MAX_PRESET_NAME_LENGTH),
        );
    }
}

/// Body of `POST /v1/projects/{pid}/filter-presets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePresetRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub table_name: PresetTable,
    pub filters: Vec<PresetFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    pub search_types: Vec<SearchScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_visibility: Option<BTreeMap<String, bool>>,
    pub is_public: bool,
}

impl CreatePresetRequest {
    /// Snapshot the current builder state under `name`. The search text is
    /// kept verbatim; a blank one is not saved.
    pub fn capture(name: impl Into<String>, table_name: PresetTable, state: &FilterState) -> Self {
        let search = state.search_query();
        Self {
            name: name.into(),
            description: None,
            table_name,
            filters: capture_filters(state),
            search_query: (!search.trim().is_empty()).then(|| search.to_string()),
            search_types: state.search_scope().to_vec(),
            column_order: None,
            column_visibility: None,
            is_public: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_columns(
        mut self,
        order: Vec<String>,
        visibility: BTreeMap<String, bool>,
    ) -> Self {
        self.column_order = Some(order);
        self.column_visibility = Some(visibility);
        self
    }

    pub fn public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        validate_name(&self.name, &mut errors);
        errors.into_result()
    }
}

/// Body of `PATCH /v1/projects/{pid}/filter-presets/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePresetRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<PresetFilter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_types: Option<Vec<SearchScope>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_visibility: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

impl UpdatePresetRequest {
    /// Replace filters and search with the current builder state.
    pub fn with_state(mut self, state: &FilterState) -> Self {
        self.filters = Some(capture_filters(state));
        self.search_query = Some(state.search_query().to_string());
        self.search_types = Some(state.search_scope().to_vec());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if let Some(name) = &self.name {
            validate_name(name, &mut errors);
        }
        errors.into_result()
    }
}

impl Default for FilterPreset {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            project_id: String::new(),
            name: String::new(),
            description: None,
            table_name: PresetTable::Traces,
            filters: Vec::new(),
            search_query: None,
            search_types: SearchScope::defaults(),
            column_order: None,
            column_visibility: None,
            is_public: false,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<CreatePresetRequest> for FilterPreset {
    /// Local echo of a create request, before the server assigns an id.
    fn from(request: CreatePresetRequest) -> Self {
        Self {
            name: request.name,
            description: request.description,
            table_name: request.table_name,
            filters: request.filters,
            search_query: request.search_query,
            search_types: request.search_types,
            column_order: request.column_order,
            column_visibility: request.column_visibility,
            is_public: request.is_public,
            ..Default::default()
        }
    }
}

/// Load a preset with the default builder limit.
pub fn load_preset(preset: &FilterPreset) -> FilterState {
    preset.to_state(DEFAULT_MAX_FILTERS)
}
