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

//! Error types shared across the filter model.

use crate::operator::Operator;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single filter condition cannot be applied.
///
/// Surfaced inline next to the offending row; never sent to the backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("Select a column")]
    ColumnRequired,

    #[error("Select an operator")]
    OperatorRequired,

    #[error("Enter a value")]
    ValueRequired,

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Operator '{operator}' is not available for column '{column}'")]
    OperatorNotAllowed { column: String, operator: Operator },

    #[error("'{value}' is not a number (column '{column}')")]
    InvalidNumber { column: String, value: String },

    #[error("'{value}' is not an RFC 3339 timestamp (column '{column}')")]
    InvalidDatetime { column: String, value: String },

    #[error("'{value}' is not true or false (column '{column}')")]
    InvalidBoolean { column: String, value: String },

    #[error("'{value}' is not an option of column '{column}'")]
    UnknownOption { column: String, value: String },

    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Filter limit reached ({max} filters)")]
    TooManyFilters { max: usize },

    #[error("{} filter(s) are incomplete or invalid", .0.len())]
    InvalidFilters(Vec<(String, ConditionError)>),

    #[error("Column '{column}' offers operator '{operator}' which its type does not support")]
    InvalidColumn { column: String, operator: Operator },

    #[error("Duplicate column id '{0}'")]
    DuplicateColumn(String),

    #[error("Category column '{0}' has no options")]
    MissingOptions(String),
}

/// Failure mapping table state onto backend query parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Operator '{operator}' is not supported for column '{column}'")]
    UnsupportedOperator { column: String, operator: Operator },

    #[error("Invalid value for column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("Filters on column '{0}' can never match together")]
    ConflictingFilters(String),
}

/// A single form-field validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Collected form validation failures, checked before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq, Default)]
#[error("{}", summarize(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn field(&self, name: &str) -> Option<&FieldError> {
        self.0.iter().find(|e| e.field == name)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}
