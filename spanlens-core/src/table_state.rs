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

//! Table URL state
//!
//! Page, sort, search and filters of one browsing surface, and the mapping
//! to and from its URL query string. Both directions are total: anything
//! the parser does not understand falls back to the table default, and
//! values equal to their default are left out of the URL.

use crate::column::ColumnRegistry;
use crate::condition::FilterCondition;
use crate::filter_state::{FilterState, SearchScope};
use crate::url_codec::{decode_filters, encode_filters};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::form_urlencoded;

/// Page sizes offered by every table.
pub const PAGE_SIZES: &[u32] = &[10, 20, 50, 100];

pub const PARAM_PAGE: &str = "page";
pub const PARAM_PAGE_SIZE: &str = "pageSize";
pub const PARAM_SORT_BY: &str = "sortBy";
pub const PARAM_SORT_ORDER: &str = "sortOrder";
pub const PARAM_SEARCH: &str = "search";
pub const PARAM_SEARCH_TYPE: &str = "searchType";
pub const PARAM_FILTERS: &str = "filters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Rules,
    Traces,
    Spans,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Rules => "rules",
            TableKind::Traces => "traces",
            TableKind::Spans => "spans",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rules" => Some(TableKind::Rules),
            "traces" => Some(TableKind::Traces),
            "spans" => Some(TableKind::Spans),
            _ => None,
        }
    }

    pub fn spec(&self) -> &'static TableSpec {
        match self {
            TableKind::Rules => &RULES_TABLE,
            TableKind::Traces => &TRACES_TABLE,
            TableKind::Spans => &SPANS_TABLE,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Desc)
    }
}

/// Static description of a browsing surface.
#[derive(Debug)]
pub struct TableSpec {
    pub kind: TableKind,
    pub registry: &'static ColumnRegistry,
    pub default_sort: Sort,
    pub default_page_size: u32,
    pub sortable: &'static [&'static str],
}

impl TableSpec {
    pub fn is_sortable(&self, column: &str) -> bool {
        self.sortable.contains(&column)
    }
}

static TRACES_TABLE: Lazy<TableSpec> = Lazy::new(|| TableSpec {
    kind: TableKind::Traces,
    registry: ColumnRegistry::traces(),
    default_sort: Sort::desc("start_time"),
    default_page_size: 50,
    sortable: &["start_time", "duration", "total_cost", "total_tokens", "name"],
});

static SPANS_TABLE: Lazy<TableSpec> = Lazy::new(|| TableSpec {
    kind: TableKind::Spans,
    registry: ColumnRegistry::spans(),
    default_sort: Sort::desc("start_time"),
    default_page_size: 50,
    sortable: &["start_time", "duration", "total_cost", "total_tokens", "span_name"],
});

static RULES_TABLE: Lazy<TableSpec> = Lazy::new(|| TableSpec {
    kind: TableKind::Rules,
    registry: ColumnRegistry::rules(),
    default_sort: Sort::desc("created_at"),
    default_page_size: 20,
    sortable: &["created_at", "updated_at", "name"],
});

#[derive(Debug, Clone, PartialEq)]
pub struct TableState {
    page: u32,
    page_size: u32,
    sort: Sort,
    search: String,
    search_scope: Vec<SearchScope>,
    filters: Vec<FilterCondition>,
}

impl TableState {
    pub fn new(spec: &TableSpec) -> Self {
        Self {
            page: 1,
            page_size: spec.default_page_size,
            sort: spec.default_sort.clone(),
            search: String::new(),
            search_scope: SearchScope::defaults(),
            filters: Vec::new(),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn search_scope(&self) -> &[SearchScope] {
        &self.search_scope
    }

    pub fn filters(&self) -> &[FilterCondition] {
        &self.filters
    }

    /// The only mutator that keeps the current position.
    pub fn set_page(&mut self, page: u32) {
        self.page = page.max(1);
    }

    /// Sizes outside [`PAGE_SIZES`] are ignored.
    pub fn set_page_size(&mut self, page_size: u32) -> bool {
        self.page = 1;
        if !PAGE_SIZES.contains(&page_size) {
            tracing::debug!(page_size, "Ignoring unsupported page size");
            return false;
        }
        self.page_size = page_size;
        true
    }

    pub fn set_sort(&mut self, sort: Sort) {
        self.page = 1;
        self.sort = sort;
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.page = 1;
        self.search = search.into();
    }

    pub fn set_search_scope(&mut self, scope: Vec<SearchScope>) {
        self.page = 1;
        self.search_scope = if scope.is_empty() {
            SearchScope::defaults()
        } else {
            scope
        };
    }

    pub fn set_filters(&mut self, filters: Vec<FilterCondition>) {
        self.page = 1;
        self.filters = filters;
    }

    /// Take filters and search from an applied builder.
    pub fn apply_filter_state(&mut self, state: &FilterState) {
        self.set_filters(state.conditions().to_vec());
        self.set_search(state.search_query());
        self.set_search_scope(state.search_scope().to_vec());
    }

    /// Builder pre-populated from this table's filters and search.
    pub fn filter_state(&self, max_filters: usize) -> FilterState {
        let mut state = FilterState::from_conditions(self.filters.clone(), max_filters);
        state.set_search(self.search.clone(), self.search_scope.clone());
        state
    }

    pub fn reset(&mut self, spec: &TableSpec) {
        *self = Self::new(spec);
    }

    pub fn to_query_string(&self, spec: &TableSpec) -> String {
        to_query_string(self, spec)
    }

    pub fn from_query_string(query: &str, spec: &TableSpec) -> Self {
        from_query_string(query, spec)
    }
}

fn join_scopes(scope: &[SearchScope]) -> String {
    scope
        .iter()
        .map(SearchScope::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Serialize `state`, omitting every parameter that equals its default.
pub fn to_query_string(state: &TableState, spec: &TableSpec) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());

    if state.page != 1 {
        serializer.append_pair(PARAM_PAGE, &state.page.to_string());
    }
    if state.page_size != spec.default_page_size {
        serializer.append_pair(PARAM_PAGE_SIZE, &state.page_size.to_string());
    }
    if state.sort != spec.default_sort {
        serializer.append_pair(PARAM_SORT_BY, &state.sort.column);
        serializer.append_pair(PARAM_SORT_ORDER, state.sort.direction.as_str());
    }
    if !state.search.is_empty() {
        serializer.append_pair(PARAM_SEARCH, &state.search);
    }
    if state.search_scope != SearchScope::defaults() {
        serializer.append_pair(PARAM_SEARCH_TYPE, &join_scopes(&state.search_scope));
    }
    let filters = encode_filters(&state.filters);
    if !filters.is_empty() {
        serializer.append_pair(PARAM_FILTERS, &filters);
    }

    serializer.finish()
}

/// Parse a query string (with or without a leading `?`). Never fails.
pub fn from_query_string(query: &str, spec: &TableSpec) -> TableState {
    let mut state = TableState::new(spec);
    let mut sort_by: Option<String> = None;
    let mut sort_order: Option<SortDirection> = None;

    let query = query.trim().trim_start_matches('?');
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            PARAM_PAGE => {
                if let Ok(page) = value.trim().parse::<u32>() {
                    if page >= 1 {
                        state.page = page;
                    }
                }
            }
            PARAM_PAGE_SIZE => {
                if let Ok(size) = value.trim().parse::<u32>() {
                    if PAGE_SIZES.contains(&size) {
                        state.page_size = size;
                    }
                }
            }
            PARAM_SORT_BY => {
                let column = value.trim();
                if spec.is_sortable(column) {
                    sort_by = Some(column.to_string());
                }
            }
            PARAM_SORT_ORDER => sort_order = SortDirection::parse(&value),
            PARAM_SEARCH => state.search = value.into_owned(),
            PARAM_SEARCH_TYPE => {
                let scope: Vec<SearchScope> =
                    value.split(',').filter_map(SearchScope::parse).collect();
                if !scope.is_empty() {
                    state.search_scope = scope;
                }
            }
            PARAM_FILTERS => state.filters = decode_filters(&value, spec.registry),
            other => tracing::trace!(param = other, "Ignoring unknown table parameter"),
        }
    }

    if let Some(column) = sort_by {
        state.sort = Sort::new(column, sort_order.unwrap_or(spec.default_sort.direction));
    } else if let Some(direction) = sort_order {
        state.sort.direction = direction;
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::FilterValue;
    use crate::operator::Operator;

    fn traces() -> &'static TableSpec {
        TableKind::Traces.spec()
    }

    #[test]
    fn test_defaults_produce_empty_query() {
        let state = TableState::new(traces());
        assert_eq!(state.to_query_string(traces()), "");
        assert_eq!(TableState::from_query_string("", traces()), state);
    }

    #[test]
    fn test_round_trip_non_default_state() {
        let spec = traces();
        let mut state = TableState::new(spec);
        state.set_sort(Sort::new("total_cost", SortDirection::Asc));
        state.set_page_size(100);
        state.set_search("refund policy");
        state.set_search_scope(vec![SearchScope::Id, SearchScope::Content]);
        state.set_filters(vec![FilterCondition::new(
            "total_cost",
            Operator::GreaterThan,
            FilterValue::Number(0.01),
        )]);
        state.set_page(3);

        let query = state.to_query_string(spec);
        let parsed = TableState::from_query_string(&query, spec);

        assert_eq!(parsed.page(), 3);
        assert_eq!(parsed.page_size(), 100);
        assert_eq!(parsed.sort(), &Sort::new("total_cost", SortDirection::Asc));
        assert_eq!(parsed.search(), "refund policy");
        assert_eq!(parsed.search_scope(), &[SearchScope::Id, SearchScope::Content]);
        assert_eq!(parsed.filters().len(), 1);
        assert!(parsed.filters()[0].same_predicate(&state.filters()[0]));
    }

    #[test]
    fn test_invalid_params_fall_back_to_defaults() {
        let parsed = TableState::from_query_string(
            "?page=zero&pageSize=33&sortBy=input&sortOrder=sideways&searchType=body&utm=x",
            traces(),
        );
        assert_eq!(parsed, TableState::new(traces()));

        let zero = TableState::from_query_string("page=0", traces());
        assert_eq!(zero.page(), 1);
    }

    #[test]
    fn test_sort_order_alone_applies_to_default_column() {
        let parsed = TableState::from_query_string("sortOrder=asc", traces());
        assert_eq!(parsed.sort(), &Sort::new("start_time", SortDirection::Asc));
    }

    #[test]
    fn test_mutators_reset_page() {
        let spec = traces();
        let mut state = TableState::new(spec);

        state.set_page(4);
        state.set_search("timeout");
        assert_eq!(state.page(), 1);

        state.set_page(4);
        state.set_sort(Sort::desc("duration"));
        assert_eq!(state.page(), 1);

        state.set_page(4);
        state.set_filters(Vec::new());
        assert_eq!(state.page(), 1);

        state.set_page(4);
        state.set_search_scope(vec![SearchScope::All]);
        assert_eq!(state.page(), 1);

        state.set_page(4);
        assert!(!state.set_page_size(7));
        assert_eq!(state.page(), 1);
        assert_eq!(state.page_size(), 50);
    }

    #[test]
    fn test_rules_table_defaults() {
        let spec = TableKind::Rules.spec();
        let state = TableState::new(spec);
        assert_eq!(state.page_size(), 20);
        assert_eq!(state.sort(), &Sort::desc("created_at"));

        let parsed = TableState::from_query_string("pageSize=50", spec);
        assert_eq!(parsed.to_query_string(spec), "pageSize=50");
    }

    #[test]
    fn test_filter_state_bridge() {
        let spec = traces();
        let mut builder = FilterState::new();
        builder
            .add(Some("name"), Some(Operator::Contains), Some(FilterValue::string("chat")))
            .unwrap();
        builder.set_search("abc", vec![SearchScope::All]);

        let mut state = TableState::new(spec);
        state.set_page(2);
        state.apply_filter_state(&builder);
        assert_eq!(state.page(), 1);
        assert_eq!(state.search(), "abc");

        let back = state.filter_state(20);
        assert_eq!(back.len(), 1);
        assert_eq!(back.search_scope(), &[SearchScope::All]);
    }
}
