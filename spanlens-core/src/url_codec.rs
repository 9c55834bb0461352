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

//! URL filter codec
//!
//! Encodes a filter list into the single `filters` query parameter:
//!
//! ```text
//! column:operator:value[,column:operator:value...]
//! ```
//!
//! List values are joined with `|`. The column and every value element are
//! form-urlencoded, so delimiters inside user values never collide with the
//! structure. Decoding is lenient: a segment that cannot be understood is
//! dropped on its own and the rest of the view still loads.

use crate::column::ColumnRegistry;
use crate::condition::{
    expected_shape, format_number, is_valid, FilterCondition, FilterValue, ValueShape,
};
use crate::operator::Operator;
use url::form_urlencoded;

const SEGMENT_SEPARATOR: char = ',';
const PART_SEPARATOR: char = ':';
const LIST_SEPARATOR: char = '|';

fn encode_component(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn decode_component(raw: &str) -> String {
    // `parse` splits on '&' and '='; escape them so the whole input is one key.
    let escaped = raw.replace('&', "%26").replace('=', "%3D");
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

/// Encode one condition as `column:operator:value`.
pub fn encode_condition(condition: &FilterCondition) -> Option<String> {
    let operator = condition.operator?;
    let value = match &condition.value {
        FilterValue::Null => String::new(),
        FilterValue::String(s) => encode_component(s),
        FilterValue::Number(n) => encode_component(&format_number(*n)),
        FilterValue::List(items) => items
            .iter()
            .map(|item| encode_component(item))
            .collect::<Vec<_>>()
            .join(&LIST_SEPARATOR.to_string()),
    };
    Some(format!(
        "{}{}{}{}{}",
        encode_component(condition.column.trim()),
        PART_SEPARATOR,
        operator.symbol(),
        PART_SEPARATOR,
        value
    ))
}

/// Encode every valid condition, in order. Invalid rows are skipped.
pub fn encode_filters<'a, I>(conditions: I) -> String
where
    I: IntoIterator<Item = &'a FilterCondition>,
{
    conditions
        .into_iter()
        .filter(|c| is_valid(c))
        .filter_map(encode_condition)
        .collect::<Vec<_>>()
        .join(&SEGMENT_SEPARATOR.to_string())
}

/// Decode one segment. `None` when it is malformed, names an unknown
/// operator, or names a column the registry cannot resolve.
pub fn decode_condition(segment: &str, registry: &ColumnRegistry) -> Option<FilterCondition> {
    let mut parts = segment.splitn(3, PART_SEPARATOR);
    let (Some(raw_column), Some(raw_operator)) = (parts.next(), parts.next()) else {
        tracing::debug!(segment, "Dropping filter segment without operator");
        return None;
    };
    let raw_value = parts.next().unwrap_or("");

    let column = decode_component(raw_column).trim().to_string();
    if column.is_empty() {
        tracing::debug!(segment, "Dropping filter segment without column");
        return None;
    }
    let Some(operator) = Operator::from_symbol(&decode_component(raw_operator)) else {
        tracing::debug!(segment, "Dropping filter segment with unknown operator");
        return None;
    };
    if registry.resolve(&column).is_none() {
        tracing::debug!(segment, column = %column, "Dropping filter segment with unknown column");
        return None;
    }

    let column_type = registry.column_type(&column);
    let shape = expected_shape(column_type, operator);
    let value = match shape {
        ValueShape::None => FilterValue::Null,
        ValueShape::List => FilterValue::List(
            raw_value
                .split(LIST_SEPARATOR)
                .map(decode_component)
                .collect(),
        ),
        ValueShape::Scalar => {
            let decoded = decode_component(raw_value);
            if decoded.is_empty() {
                FilterValue::Null
            } else {
                FilterValue::String(decoded)
            }
        }
    };

    Some(FilterCondition::new(
        column,
        operator,
        value.normalize(shape, column_type),
    ))
}

/// Decode a `filters` parameter. Never fails; bad segments are dropped.
pub fn decode_filters(raw: &str, registry: &ColumnRegistry) -> Vec<FilterCondition> {
    raw.split(SEGMENT_SEPARATOR)
        .filter(|segment| !segment.trim().is_empty())
        .filter_map(|segment| decode_condition(segment, registry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traces() -> &'static ColumnRegistry {
        ColumnRegistry::traces()
    }

    #[test]
    fn test_encode_shapes() {
        let conditions = vec![
            FilterCondition::new("total_cost", Operator::GreaterThan, FilterValue::Number(0.01)),
            FilterCondition::new("status_code", Operator::In, FilterValue::list(["1", "2"])),
            FilterCondition::new("attributes.user.tier", Operator::Exists, FilterValue::Null),
        ];
        assert_eq!(
            encode_filters(&conditions),
            "total_cost:>:0.01,status_code:IN:1|2,attributes.user.tier:EXISTS:"
        );
    }

    #[test]
    fn test_encode_skips_invalid_rows() {
        let conditions = vec![
            FilterCondition::empty(),
            FilterCondition::new("name", Operator::Contains, FilterValue::string("chat")),
            FilterCondition::new("name", Operator::Equals, FilterValue::string("  ")),
        ];
        assert_eq!(encode_filters(&conditions), "name:CONTAINS:chat");
    }

    #[test]
    fn test_delimiters_inside_values_are_escaped() {
        let condition = FilterCondition::new(
            "name",
            Operator::Equals,
            FilterValue::string("a:b,c|d e&f=g%"),
        );
        let encoded = encode_filters([&condition]);
        assert_eq!(encoded.matches(',').count(), 0);
        assert_eq!(encoded.matches(':').count(), 2);

        let decoded = decode_filters(&encoded, traces());
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].same_predicate(&condition));
    }

    #[test]
    fn test_extra_colons_belong_to_value() {
        let decoded = decode_filters("start_time:>=:2025-01-01T00:00:00Z", traces());
        assert_eq!(decoded.len(), 1);
        assert_eq!(
            decoded[0].value,
            FilterValue::string("2025-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_malformed_segments_are_dropped() {
        let decoded = decode_filters(
            "name:CONTAINS:chat,garbage,bogus_col:=:1,total_cost:LIKE:3,:=:x,duration:<:1500",
            traces(),
        );
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].column, "name");
        assert_eq!(decoded[1].column, "duration");
        assert_eq!(decoded[1].value, FilterValue::Number(1500.0));
    }

    #[test]
    fn test_operator_may_arrive_encoded() {
        let decoded = decode_filters("tags:NOT+IN:a|b,tags:NOT%20IN:c", traces());
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].operator, Some(Operator::NotIn));
        assert_eq!(decoded[0].value, FilterValue::list(["a", "b"]));
    }

    #[test]
    fn test_category_equality_decodes_to_list() {
        let decoded = decode_filters("status_code:=:1", traces());
        assert_eq!(decoded[0].value, FilterValue::list(["1"]));
    }

    #[test]
    fn test_decode_regenerates_ids() {
        let a = decode_filters("name:=:x", traces());
        let b = decode_filters("name:=:x", traces());
        assert_ne!(a[0].id, b[0].id);
    }

    #[test]
    fn test_empty_input() {
        assert!(decode_filters("", traces()).is_empty());
        assert!(decode_filters(",,", traces()).is_empty());
        assert_eq!(encode_filters(&[]), "");
    }
}
