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

//! Filter operators and their arity classes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// How many values an operator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// Predicate on the column alone (`EXISTS`, `IS EMPTY`, ...)
    NoValue,
    /// Exactly one value
    Single,
    /// An ordered list of values
    Multi,
}

/// Closed set of comparison operators understood by the dashboard.
///
/// Serialized by its symbol (`"="`, `"NOT IN"`, `"~"`), which is also the form
/// used inside URL filter segments and preset payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Regex,
    In,
    NotIn,
    Exists,
    NotExists,
    IsEmpty,
    IsNotEmpty,
    Search,
}

impl Operator {
    pub const ALL: [Operator; 18] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::GreaterOrEqual,
        Operator::LessOrEqual,
        Operator::Contains,
        Operator::NotContains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Regex,
        Operator::In,
        Operator::NotIn,
        Operator::Exists,
        Operator::NotExists,
        Operator::IsEmpty,
        Operator::IsNotEmpty,
        Operator::Search,
    ];

    /// Canonical symbol, as written in URLs and sent to the backend.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
            Operator::Contains => "CONTAINS",
            Operator::NotContains => "NOT CONTAINS",
            Operator::StartsWith => "STARTS WITH",
            Operator::EndsWith => "ENDS WITH",
            Operator::Regex => "REGEX",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Exists => "EXISTS",
            Operator::NotExists => "NOT EXISTS",
            Operator::IsEmpty => "IS EMPTY",
            Operator::IsNotEmpty => "IS NOT EMPTY",
            Operator::Search => "~",
        }
    }

    /// Human label shown in operator dropdowns.
    pub fn label(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "does not equal",
            Operator::GreaterThan => "greater than",
            Operator::LessThan => "less than",
            Operator::GreaterOrEqual => "greater than or equal",
            Operator::LessOrEqual => "less than or equal",
            Operator::Contains => "contains",
            Operator::NotContains => "does not contain",
            Operator::StartsWith => "starts with",
            Operator::EndsWith => "ends with",
            Operator::Regex => "matches regex",
            Operator::In => "is any of",
            Operator::NotIn => "is none of",
            Operator::Exists => "exists",
            Operator::NotExists => "does not exist",
            Operator::IsEmpty => "is empty",
            Operator::IsNotEmpty => "is not empty",
            Operator::Search => "full-text search",
        }
    }

    /// Parse a symbol. Word operators are matched case-insensitively and
    /// tolerate repeated inner whitespace (`not   in`).
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let trimmed = symbol.trim();
        if let Some(op) = Self::ALL.iter().find(|op| op.symbol() == trimmed) {
            return Some(*op);
        }
        let normalized = trimmed
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        Self::ALL
            .iter()
            .find(|op| op.symbol() == normalized)
            .copied()
    }

    pub fn arity(&self) -> Arity {
        match self {
            Operator::Exists | Operator::NotExists | Operator::IsEmpty | Operator::IsNotEmpty => {
                Arity::NoValue
            }
            Operator::In | Operator::NotIn => Arity::Multi,
            _ => Arity::Single,
        }
    }

    pub fn requires_value(&self) -> bool {
        self.arity() != Arity::NoValue
    }

    pub fn accepts_list(&self) -> bool {
        self.arity() == Arity::Multi
    }

    /// True for `>`, `<`, `>=`, `<=`.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Operator::GreaterThan
                | Operator::LessThan
                | Operator::GreaterOrEqual
                | Operator::LessOrEqual
        )
    }

    /// True for operators that negate their positive counterpart.
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            Operator::NotEquals
                | Operator::NotContains
                | Operator::NotIn
                | Operator::NotExists
                | Operator::IsNotEmpty
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Operator::from_symbol(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown filter operator '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_symbol(op.symbol()), Some(op), "{:?}", op);
        }
    }

    #[test]
    fn test_word_operators_are_case_insensitive() {
        assert_eq!(Operator::from_symbol("not in"), Some(Operator::NotIn));
        assert_eq!(Operator::from_symbol("Starts   With"), Some(Operator::StartsWith));
        assert_eq!(Operator::from_symbol(" contains "), Some(Operator::Contains));
    }

    #[test]
    fn test_unknown_symbol_is_rejected() {
        assert_eq!(Operator::from_symbol("LIKE"), None);
        assert_eq!(Operator::from_symbol(""), None);
        assert_eq!(Operator::from_symbol("=="), None);
    }

    #[test]
    fn test_arity_classes() {
        let no_value: Vec<_> = Operator::ALL
            .iter()
            .filter(|op| op.arity() == Arity::NoValue)
            .collect();
        assert_eq!(
            no_value,
            vec![
                &Operator::Exists,
                &Operator::NotExists,
                &Operator::IsEmpty,
                &Operator::IsNotEmpty
            ]
        );

        assert!(Operator::In.accepts_list());
        assert!(Operator::NotIn.accepts_list());
        assert!(!Operator::Equals.accepts_list());
        assert!(Operator::Search.requires_value());
        assert!(!Operator::Exists.requires_value());
    }

    #[test]
    fn test_serde_uses_symbol() {
        let json = serde_json::to_string(&Operator::NotContains).unwrap();
        assert_eq!(json, "\"NOT CONTAINS\"");
        let op: Operator = serde_json::from_str("\">=\"").unwrap();
        assert_eq!(op, Operator::GreaterOrEqual);
        assert!(serde_json::from_str::<Operator>("\"BETWEEN\"").is_err());
    }
}
