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

//! Filter builder state
//!
//! An ordered list of [`FilterCondition`]s plus the free-text search box.
//! All edits are synchronous and user-driven; nothing here talks to the
//! network.

use crate::column::ColumnRegistry;
use crate::condition::{self, FilterCondition, FilterValue};
use crate::error::{ConditionError, FilterError};
use crate::operator::Operator;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default cap on the number of builder rows.
pub const DEFAULT_MAX_FILTERS: usize = 20;

/// Which fields the free-text search looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Trace / span identifiers
    Id,
    /// Input and output payloads
    Content,
    All,
}

impl SearchScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::Id => "id",
            SearchScope::Content => "content",
            SearchScope::All => "all",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "id" => Some(SearchScope::Id),
            "content" => Some(SearchScope::Content),
            "all" => Some(SearchScope::All),
            _ => None,
        }
    }

    pub fn defaults() -> Vec<SearchScope> {
        vec![SearchScope::Id]
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial update for one row. `operator: Some(None)` clears the operator.
#[derive(Debug, Clone, Default)]
pub struct FilterPatch {
    pub column: Option<String>,
    pub operator: Option<Option<Operator>>,
    pub value: Option<FilterValue>,
}

impl FilterPatch {
    pub fn column(column: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            ..Default::default()
        }
    }

    pub fn operator(operator: Operator) -> Self {
        Self {
            operator: Some(Some(operator)),
            ..Default::default()
        }
    }

    pub fn value(value: FilterValue) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    conditions: Vec<FilterCondition>,
    search_query: String,
    search_scope: Vec<SearchScope>,
    max_filters: usize,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterState {
    pub fn new() -> Self {
        Self::with_max_filters(DEFAULT_MAX_FILTERS)
    }

    pub fn with_max_filters(max_filters: usize) -> Self {
        Self {
            conditions: Vec::new(),
            search_query: String::new(),
            search_scope: SearchScope::defaults(),
            max_filters,
        }
    }

    /// Build from already-decoded conditions, keeping at most `max_filters`.
    pub fn from_conditions(conditions: Vec<FilterCondition>, max_filters: usize) -> Self {
        let mut state = Self::with_max_filters(max_filters);
        if conditions.len() > max_filters {
            tracing::warn!(
                count = conditions.len(),
                max_filters,
                "Truncating filters to the builder limit"
            );
        }
        state.conditions = conditions.into_iter().take(max_filters).collect();
        state
    }

    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn max_filters(&self) -> usize {
        self.max_filters
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn search_scope(&self) -> &[SearchScope] {
        &self.search_scope
    }

    pub fn get(&self, id: &str) -> Option<&FilterCondition> {
        self.conditions.iter().find(|c| c.id == id)
    }

    /// Whether the add action should be enabled.
    pub fn can_add(&self) -> bool {
        self.conditions.len() < self.max_filters
    }

    /// Append a row (defaults: empty column, `=`, no value).
    ///
    /// At the limit this returns [`FilterError::TooManyFilters`] and the list
    /// is left untouched.
    pub fn add(
        &mut self,
        column: Option<&str>,
        operator: Option<Operator>,
        value: Option<FilterValue>,
    ) -> Result<&FilterCondition, FilterError> {
        let mut condition = FilterCondition::empty();
        if let Some(column) = column {
            condition.column = column.to_string();
        }
        if let Some(operator) = operator {
            condition.operator = Some(operator);
        }
        if let Some(value) = value {
            condition.value = value;
        }
        self.push(condition)?;
        Ok(&self.conditions[self.conditions.len() - 1])
    }

    pub fn push(&mut self, condition: FilterCondition) -> Result<(), FilterError> {
        if !self.can_add() {
            return Err(FilterError::TooManyFilters {
                max: self.max_filters,
            });
        }
        self.conditions.push(condition);
        Ok(())
    }

    /// Merge `patch` into the row with `id`. Returns false if no such row.
    pub fn update(&mut self, id: &str, patch: FilterPatch) -> bool {
        let Some(condition) = self.conditions.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        if let Some(column) = patch.column {
            condition.column = column;
        }
        if let Some(operator) = patch.operator {
            condition.operator = operator;
        }
        if let Some(value) = patch.value {
            condition.value = value;
        }
        true
    }

    /// Like [`update`](Self::update), then reconcile the row with column
    /// metadata: an operator the new column does not offer is cleared and
    /// the value is reshaped for the operator.
    pub fn update_with(&mut self, registry: &ColumnRegistry, id: &str, patch: FilterPatch) -> bool {
        if !self.update(id, patch) {
            return false;
        }
        if let Some(condition) = self.conditions.iter_mut().find(|c| c.id == id) {
            if let Some(op) = condition.operator {
                if registry.definition(&condition.column).is_some()
                    && !registry.allows(&condition.column, op)
                {
                    condition.operator = None;
                }
            }
            *condition = condition.clone().normalized(registry);
        }
        true
    }

    /// Remove the row with `id`. Returns false if no such row.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| c.id != id);
        self.conditions.len() != before
    }

    /// Drop every row and reset the search box.
    pub fn clear(&mut self) {
        self.conditions.clear();
        self.search_query.clear();
        self.search_scope = SearchScope::defaults();
    }

    pub fn set_search(&mut self, query: impl Into<String>, scope: Vec<SearchScope>) {
        self.search_query = query.into();
        self.search_scope = if scope.is_empty() {
            SearchScope::defaults()
        } else {
            scope
        };
    }

    pub fn is_valid(condition: &FilterCondition) -> bool {
        condition::is_valid(condition)
    }

    /// Rows failing the structural validity check.
    pub fn invalid(&self) -> Vec<&FilterCondition> {
        self.conditions
            .iter()
            .filter(|c| !condition::is_valid(c))
            .collect()
    }

    pub fn valid_conditions(&self) -> Vec<&FilterCondition> {
        self.conditions
            .iter()
            .filter(|c| condition::is_valid(c))
            .collect()
    }

    /// Inline errors for every row failing the full registry check.
    pub fn errors(&self, registry: &ColumnRegistry) -> Vec<(String, ConditionError)> {
        self.conditions
            .iter()
            .filter_map(|c| {
                condition::validate(c, registry)
                    .err()
                    .map(|e| (c.id.clone(), e))
            })
            .collect()
    }

    /// The list to apply, normalised. Blocked while any row is invalid.
    pub fn apply(&self, registry: &ColumnRegistry) -> Result<Vec<FilterCondition>, FilterError> {
        let errors = self.errors(registry);
        if !errors.is_empty() {
            return Err(FilterError::InvalidFilters(errors));
        }
        Ok(self
            .conditions
            .iter()
            .map(|c| c.clone().normalized(registry))
            .collect())
    }
}
