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

//! Spanlens Core
//!
//! Filter model and table state for the spanlens observability dashboard:
//! column metadata, filter conditions and the builder that edits them, the
//! URL and preset encodings, projection of table state onto backend query
//! parameters, and the data types exchanged with the REST API.
//!
//! Nothing in this crate performs I/O.

pub mod api_params;
pub mod cache;
pub mod column;
pub mod condition;
pub mod error;
pub mod filter_state;
pub mod operator;
pub mod preset;
pub mod rule;
pub mod table_state;
pub mod trace;
pub mod url_codec;

pub use api_params::{to_api_params, ApiParams, ApiValue};
pub use cache::{CacheSnapshot, CacheStats, Clock, ManualClock, SystemClock, TtlCache};
pub use column::{
    operators_for_type, ColumnDef, ColumnOption, ColumnRef, ColumnRegistry, ColumnType,
    DynamicColumn,
};
pub use condition::{is_valid, validate, FilterCondition, FilterValue, ValueShape};
pub use error::{ConditionError, FieldError, FilterError, ProjectionError, ValidationErrors};
pub use filter_state::{FilterPatch, FilterState, SearchScope, DEFAULT_MAX_FILTERS};
pub use operator::{Arity, Operator};
pub use preset::{
    CreatePresetRequest, FilterPreset, PresetFilter, PresetTable, UpdatePresetRequest,
};
pub use rule::{
    CreateRuleRequest, EvaluationRule, ExecutionDetail, ExecutionStatus, PromptMessage,
    RuleAnalytics, RuleExecution, RuleStatus, ScorerConfig, TargetScope, TestRuleRequest,
    TestRuleResponse, TriggerRuleRequest, TriggerRuleResponse, UpdateRuleRequest,
    VariableMapping, VariableSource,
};
pub use table_state::{Sort, SortDirection, TableKind, TableSpec, TableState};
pub use trace::{
    AttributeCatalog, AttributeKey, Envelope, FilterOptions, Page, Pagination, Score, Span,
    Trace, TraceUpdate,
};
pub use url_codec::{decode_filters, encode_filters};
