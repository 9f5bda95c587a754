//! Declarative row predicates.
//!
//! Provides the filter vocabulary shared by table queries and the
//! declarative aggregate definitions:
//! - QueryFilter: field + operator + value
//! - FilterOperator: comparison operators over JSON values
//! - FilterValue: literal or request-derived comparison value

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Record;
use crate::aggregate::RequestContext;

/// Filter condition on a single record field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryFilter {
    /// Field to filter on. Dots and `__` traverse nested objects.
    pub field: String,

    /// Comparison operator.
    pub operator: FilterOperator,

    /// Value to compare against.
    #[serde(default)]
    pub value: FilterValue,
}

impl QueryFilter {
    /// Create a filter with a literal value.
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Whether any part of the value must be resolved from a request.
    pub fn is_contextual(&self) -> bool {
        self.value.is_contextual()
    }

    /// Names of the query parameters this filter reads.
    pub fn query_params(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.value.collect_query_params(&mut names);
        names
    }

    /// Replace request-derived values with literals.
    ///
    /// Returns `None` when the request does not supply the value; callers
    /// drop the filter in that case.
    pub fn resolve(&self, request: &RequestContext) -> Option<Self> {
        let value = self.value.resolve(request)?;
        Some(Self {
            field: self.field.clone(),
            operator: self.operator.clone(),
            value,
        })
    }

    /// Test a record against this filter.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = lookup_path(record, &self.field);
        match self.operator {
            FilterOperator::IsNull => actual.is_none_or(Value::is_null),
            FilterOperator::IsNotNull => actual.is_some_and(|v| !v.is_null()),
            FilterOperator::Equals => actual.is_some_and(|v| self.value.equals(v)),
            FilterOperator::NotEquals => !actual.is_some_and(|v| self.value.equals(v)),
            FilterOperator::In => actual.is_some_and(|v| self.value.contains_item(v)),
            FilterOperator::NotIn => !actual.is_some_and(|v| self.value.contains_item(v)),
            FilterOperator::GreaterThan => self.compare(actual) == Some(Ordering::Greater),
            FilterOperator::LessThan => self.compare(actual) == Some(Ordering::Less),
            FilterOperator::GreaterOrEqual => {
                matches!(self.compare(actual), Some(Ordering::Greater | Ordering::Equal))
            }
            FilterOperator::LessOrEqual => {
                matches!(self.compare(actual), Some(Ordering::Less | Ordering::Equal))
            }
            FilterOperator::Contains
            | FilterOperator::IContains
            | FilterOperator::StartsWith
            | FilterOperator::EndsWith => self.matches_text(actual),
        }
    }

    fn compare(&self, actual: Option<&Value>) -> Option<Ordering> {
        let actual = actual.filter(|v| !v.is_null())?;
        let expected = self.value.to_json();
        // Mixed kinds never satisfy range comparisons.
        if value_rank(actual) != value_rank(&expected) {
            return None;
        }
        Some(compare_values(actual, &expected))
    }

    fn matches_text(&self, actual: Option<&Value>) -> bool {
        let Some(Value::String(haystack)) = actual else {
            return false;
        };
        let Some(needle) = self.value.as_text() else {
            return false;
        };
        match self.operator {
            FilterOperator::Contains => haystack.contains(needle.as_str()),
            FilterOperator::IContains => haystack
                .to_lowercase()
                .contains(needle.to_lowercase().as_str()),
            FilterOperator::StartsWith => haystack.starts_with(needle.as_str()),
            FilterOperator::EndsWith => haystack.ends_with(needle.as_str()),
            _ => false,
        }
    }
}

/// Comparison operators for filtering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Exact match.
    Equals,
    /// Not equal.
    NotEquals,
    /// Case-sensitive substring match.
    Contains,
    /// Case-insensitive substring match.
    #[serde(rename = "icontains")]
    IContains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Greater than.
    GreaterThan,
    /// Less than.
    LessThan,
    /// Greater than or equal.
    GreaterOrEqual,
    /// Less than or equal.
    LessOrEqual,
    /// Value in list.
    In,
    /// Value not in list.
    NotIn,
    /// Field is missing or null.
    IsNull,
    /// Field is present and not null.
    IsNotNull,
}

/// Filter value types.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    /// No value (null checks).
    #[default]
    Null,
    /// String value.
    String(String),
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// Boolean value.
    Boolean(bool),
    /// List of values (for In/NotIn).
    List(Vec<FilterValue>),
    /// Value taken from the request.
    Contextual(ContextualValue),
}

/// Request-derived filter values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextualValue {
    /// Named path argument from the URL.
    UrlArg(String),
    /// Query string parameter.
    QueryParam(String),
}

impl FilterValue {
    fn is_contextual(&self) -> bool {
        match self {
            Self::Contextual(_) => true,
            Self::List(items) => items.iter().any(Self::is_contextual),
            _ => false,
        }
    }

    fn collect_query_params<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Contextual(ContextualValue::QueryParam(name)) => names.push(name),
            Self::List(items) => items.iter().for_each(|item| item.collect_query_params(names)),
            _ => {}
        }
    }

    fn resolve(&self, request: &RequestContext) -> Option<Self> {
        match self {
            Self::Contextual(ContextualValue::UrlArg(name)) => request
                .path_param(name)
                .map(|v| Self::String(v.to_string())),
            Self::Contextual(ContextualValue::QueryParam(name)) => request
                .query_param(name)
                .map(|v| Self::String(v.to_string())),
            Self::List(items) => items
                .iter()
                .map(|item| item.resolve(request))
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            other => Some(other.clone()),
        }
    }

    /// JSON rendition of a literal value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null | Self::Contextual(_) => Value::Null,
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Boolean(b) => Value::Bool(*b),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }

    fn equals(&self, actual: &Value) -> bool {
        let expected = self.to_json();
        match (actual, &expected) {
            (Value::Number(_), Value::Number(_)) => {
                compare_values(actual, &expected) == Ordering::Equal
            }
            _ => *actual == expected,
        }
    }

    fn contains_item(&self, actual: &Value) -> bool {
        match self {
            Self::List(items) => items.iter().any(|item| item.equals(actual)),
            single => single.equals(actual),
        }
    }
}

/// Split a field path on `.` and `__`.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split("__")
        .flat_map(|part| part.split('.'))
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Resolve a nested field path inside a record.
pub fn lookup_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = split_path(path).into_iter();
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn value_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values.
///
/// Values of different kinds order as null < bool < number < string <
/// array < object. Numbers compare numerically, strings lexically, arrays
/// and objects entry by entry.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(a, b)| compare_values(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y.iter())
            .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare_values(va, vb)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => value_rank(a).cmp(&value_rank(b)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn filter_operator_serialization() {
        let op = FilterOperator::IContains;
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, "\"icontains\"");

        let op: FilterOperator = serde_json::from_str("\"starts_with\"").unwrap();
        assert_eq!(op, FilterOperator::StartsWith);
    }

    #[test]
    fn filter_value_contextual_deserializes() {
        let filter: QueryFilter = serde_json::from_value(json!({
            "field": "title",
            "operator": "equals",
            "value": {"url_arg": "play"}
        }))
        .unwrap();

        assert!(filter.is_contextual());
        assert_eq!(
            filter.value,
            FilterValue::Contextual(ContextualValue::UrlArg("play".to_string()))
        );
    }

    #[test]
    fn resolve_contextual_value_from_path() {
        let filter = QueryFilter::new(
            "title",
            FilterOperator::Equals,
            FilterValue::Contextual(ContextualValue::UrlArg("play".to_string())),
        );
        let request = RequestContext::new("http://testserver/").with_path_param("play", "Hamlet");

        let resolved = filter.resolve(&request).unwrap();
        assert_eq!(resolved.value, FilterValue::String("Hamlet".to_string()));

        let missing = RequestContext::new("http://testserver/");
        assert!(filter.resolve(&missing).is_none());
    }

    #[test]
    fn icontains_ignores_case() {
        let row = record(json!({"title": "Romeo And Juliet"}));
        let filter = QueryFilter::new(
            "title",
            FilterOperator::IContains,
            FilterValue::String("JULIET".to_string()),
        );
        assert!(filter.matches(&row));

        let strict = QueryFilter::new(
            "title",
            FilterOperator::Contains,
            FilterValue::String("JULIET".to_string()),
        );
        assert!(!strict.matches(&row));
    }

    #[test]
    fn numeric_comparisons() {
        let row = record(json!({"year": 1600}));
        let gt = QueryFilter::new("year", FilterOperator::GreaterThan, FilterValue::Integer(1597));
        let lt = QueryFilter::new("year", FilterOperator::LessThan, FilterValue::Integer(1597));
        let eq = QueryFilter::new("year", FilterOperator::Equals, FilterValue::Float(1600.0));
        assert!(gt.matches(&row));
        assert!(!lt.matches(&row));
        assert!(eq.matches(&row));
    }

    #[test]
    fn mixed_kinds_never_satisfy_ranges() {
        let row = record(json!({"year": "1600"}));
        let gt = QueryFilter::new("year", FilterOperator::GreaterThan, FilterValue::Integer(1));
        assert!(!gt.matches(&row));
    }

    #[test]
    fn in_and_null_operators() {
        let row = record(json!({"genre": "Comedy", "notes": null}));
        let within = QueryFilter::new(
            "genre",
            FilterOperator::In,
            FilterValue::List(vec![
                FilterValue::String("Comedy".to_string()),
                FilterValue::String("History".to_string()),
            ]),
        );
        assert!(within.matches(&row));
        assert!(QueryFilter::new("notes", FilterOperator::IsNull, FilterValue::Null).matches(&row));
        assert!(QueryFilter::new("missing", FilterOperator::IsNull, FilterValue::Null).matches(&row));
        assert!(
            QueryFilter::new("genre", FilterOperator::IsNotNull, FilterValue::Null).matches(&row)
        );
    }

    #[test]
    fn lookup_path_traverses_both_separators() {
        let row = record(json!({"author": {"name": "Play Shakespeare 1", "meta": {"born": 1564}}}));
        assert_eq!(
            lookup_path(&row, "author__name"),
            Some(&json!("Play Shakespeare 1"))
        );
        assert_eq!(lookup_path(&row, "author.meta.born"), Some(&json!(1564)));
        assert_eq!(lookup_path(&row, "author__meta.born"), Some(&json!(1564)));
        assert!(lookup_path(&row, "author.missing").is_none());
        assert!(lookup_path(&row, "").is_none());
    }

    #[test]
    fn compare_values_orders_kinds() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(10), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(compare_values(&json!("Poem"), &json!("Play")), Ordering::Greater);
        assert_eq!(
            compare_values(&json!({"name": "b"}), &json!({"name": "a", "x": 1})),
            Ordering::Greater
        );
    }
}
