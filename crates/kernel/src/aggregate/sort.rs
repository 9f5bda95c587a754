//! Multi-key sorting of flat results.
//!
//! Sort keys come from the request parameter when present, else from the
//! view settings. Each token may carry a leading `-` for descending order
//! and may be renamed through the view's remap table before its path is
//! split on `__` and `.`.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::error::AggregateError;
use super::types::{RequestContext, ViewSettings};
use crate::store::{Record, compare_values, split_path};

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Field name after remapping.
    pub field: String,
    /// Path segments into the record.
    pub path: Vec<String>,
    pub descending: bool,
}

impl SortKey {
    /// Parse one token such as `-author__name`.
    pub fn parse(token: &str, remap: &HashMap<String, String>) -> Option<Self> {
        let token = token.trim();
        let (descending, name) = match token.strip_prefix('-') {
            Some(rest) => (true, rest.trim()),
            None => (false, token),
        };
        if name.is_empty() {
            return None;
        }
        let field = remap.get(name).map_or(name, String::as_str).to_string();
        let path: Vec<String> = split_path(&field).into_iter().map(String::from).collect();
        if path.is_empty() {
            return None;
        }
        Some(Self {
            field,
            path,
            descending,
        })
    }

    /// The value this key sorts on.
    ///
    /// A missing path segment or a list-valued result is a validation error.
    pub fn extract<'a>(&self, record: &'a Record) -> Result<&'a Value, AggregateError> {
        let mut segments = self.path.iter();
        let mut current = segments
            .next()
            .and_then(|first| record.get(first))
            .ok_or_else(|| self.invalid())?;
        for segment in segments {
            current = current
                .as_object()
                .and_then(|object| object.get(segment))
                .ok_or_else(|| self.invalid())?;
        }
        if current.is_array() {
            return Err(AggregateError::validation(format!(
                "Invalid sorting field: {} resolves to a list and cannot be sorted on",
                self.field
            )));
        }
        Ok(current)
    }

    fn invalid(&self) -> AggregateError {
        AggregateError::validation(format!("Invalid sorting field: {}", self.field))
    }
}

/// Ordered list of sort keys, highest precedence first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    /// Build a spec from raw tokens, skipping empty ones.
    pub fn parse<'a>(
        tokens: impl IntoIterator<Item = &'a str>,
        remap: &HashMap<String, String>,
    ) -> Self {
        Self {
            keys: tokens
                .into_iter()
                .filter_map(|token| SortKey::parse(token, remap))
                .collect(),
        }
    }

    /// Resolve the effective sort for a request.
    ///
    /// The request parameter, when enabled and present, replaces the
    /// configured keys. Declaring both a single and a multi-field sort is a
    /// configuration error.
    pub fn resolve(
        settings: &ViewSettings,
        request: &RequestContext,
        view: &str,
    ) -> Result<Self, AggregateError> {
        if settings.sorting_field.is_some() && settings.sorting_fields.is_some() {
            return Err(AggregateError::configuration(
                view,
                "declares both `sorting_field` and `sorting_fields`; use only one",
            ));
        }

        let requested = settings
            .sorting_parameter
            .as_deref()
            .and_then(|param| request.query_param(param));
        if let Some(raw) = requested {
            debug!(view = %view, sort = %raw, "sort overridden by request");
            return Ok(Self::parse(raw.split(','), &settings.sorting_fields_map));
        }

        let spec = match (&settings.sorting_field, &settings.sorting_fields) {
            (Some(field), None) => Self::parse([field.as_str()], &settings.sorting_fields_map),
            (None, Some(fields)) => Self::parse(
                fields.iter().map(String::as_str),
                &settings.sorting_fields_map,
            ),
            _ => Self::default(),
        };
        Ok(spec)
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Sort records in place.
    ///
    /// Keys are applied one stable pass at a time from lowest precedence
    /// to highest, so ties under a higher key keep the lower key's order.
    pub fn apply(&self, records: &mut Vec<Record>) -> Result<(), AggregateError> {
        for key in self.keys.iter().rev() {
            let values = records
                .iter()
                .map(|record| key.extract(record).cloned())
                .collect::<Result<Vec<_>, _>>()?;

            let mut paired: Vec<(Value, Record)> = values.into_iter().zip(records.drain(..)).collect();
            if key.descending {
                paired.sort_by(|(a, _), (b, _)| compare_values(b, a));
            } else {
                paired.sort_by(|(a, _), (b, _)| compare_values(a, b));
            }
            records.extend(paired.into_iter().map(|(_, record)| record));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Value) -> Vec<Record> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn titles(records: &[Record]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r["title"].as_str().unwrap())
            .collect()
    }

    fn no_remap() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn parse_token_direction_and_remap() {
        let remap = HashMap::from([("author".to_string(), "author__name".to_string())]);
        let key = SortKey::parse(" -author ", &remap).unwrap();
        assert!(key.descending);
        assert_eq!(key.field, "author__name");
        assert_eq!(key.path, ["author", "name"]);

        assert!(SortKey::parse("", &remap).is_none());
        assert!(SortKey::parse("-", &remap).is_none());
    }

    #[test]
    fn parse_skips_empty_tokens() {
        let spec = SortSpec::parse("type,,-title,".split(','), &no_remap());
        assert_eq!(spec.keys().len(), 2);
        assert!(spec.keys()[1].descending);
    }

    #[test]
    fn multi_key_sort_with_mixed_direction() {
        let mut rows = records(json!([
            {"title": "Romeo And Juliet", "type": "Play"},
            {"title": "Shall I compare thee", "type": "Poem"},
            {"title": "As You Like It", "type": "Play"},
            {"title": "As a decrepit father", "type": "Poem"}
        ]));
        SortSpec::parse(["type", "-title"], &no_remap())
            .apply(&mut rows)
            .unwrap();
        assert_eq!(
            titles(&rows),
            [
                "Romeo And Juliet",
                "As You Like It",
                "Shall I compare thee",
                "As a decrepit father"
            ]
        );
    }

    #[test]
    fn sorting_twice_is_a_no_op() {
        let mut rows = records(json!([
            {"title": "Romeo And Juliet", "type": "Play", "year": 1597},
            {"title": "A Lover's Complaint", "type": "Poem", "year": 1609},
            {"title": "Julius Caesar", "type": "Play", "year": 1623},
            {"title": "As You Like It", "type": "Play", "year": 1623}
        ]));
        let spec = SortSpec::parse(["-year", "type", "title"], &no_remap());
        spec.apply(&mut rows).unwrap();
        let once = rows.clone();
        spec.apply(&mut rows).unwrap();
        assert_eq!(rows, once);
        assert_eq!(
            titles(&rows),
            [
                "As You Like It",
                "Julius Caesar",
                "A Lover's Complaint",
                "Romeo And Juliet"
            ]
        );
    }

    #[test]
    fn descending_keeps_ties_stable() {
        let mut rows = records(json!([
            {"title": "a", "year": 1623},
            {"title": "b", "year": 1597},
            {"title": "c", "year": 1623}
        ]));
        SortSpec::parse(["-year"], &no_remap())
            .apply(&mut rows)
            .unwrap();
        assert_eq!(titles(&rows), ["a", "c", "b"]);
    }

    #[test]
    fn nested_path_sort() {
        let mut rows = records(json!([
            {"title": "x", "author": {"name": "Poem Shakespeare 1"}},
            {"title": "y", "author": {"name": "Play Shakespeare 2"}}
        ]));
        SortSpec::parse(["author.name"], &no_remap())
            .apply(&mut rows)
            .unwrap();
        assert_eq!(titles(&rows), ["y", "x"]);
    }

    #[test]
    fn missing_key_is_validation_error() {
        let mut rows = records(json!([{"title": "a", "year": 1600}, {"title": "b"}]));
        let err = SortSpec::parse(["year"], &no_remap())
            .apply(&mut rows)
            .unwrap_err();
        assert!(matches!(err, AggregateError::Validation(_)));
        assert_eq!(err.to_string(), "Invalid sorting field: year");
    }

    #[test]
    fn list_valued_key_is_validation_error() {
        let mut rows = records(json!([{"name": "x", "plays": [{"title": "Hamlet"}]}]));
        let err = SortSpec::parse(["plays"], &no_remap())
            .apply(&mut rows)
            .unwrap_err();
        assert!(err.to_string().contains("resolves to a list"));
    }

    #[test]
    fn empty_result_sorts_without_validation() {
        let mut rows = Vec::new();
        SortSpec::parse(["anything"], &no_remap())
            .apply(&mut rows)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn resolve_prefers_request_parameter() {
        let settings = ViewSettings {
            sorting_fields: Some(vec!["type".to_string()]),
            sorting_parameter: Some("custom_o".to_string()),
            ..ViewSettings::default()
        };
        let request = RequestContext::new("http://testserver/").with_query("custom_o", "-title");
        let spec = SortSpec::resolve(&settings, &request, "View").unwrap();
        assert_eq!(spec.keys().len(), 1);
        assert_eq!(spec.keys()[0].field, "title");

        let plain = RequestContext::new("http://testserver/");
        let spec = SortSpec::resolve(&settings, &plain, "View").unwrap();
        assert_eq!(spec.keys()[0].field, "type");
    }

    #[test]
    fn resolve_ignores_request_when_parameter_disabled() {
        let settings = ViewSettings {
            sorting_field: Some("title".to_string()),
            sorting_parameter: None,
            ..ViewSettings::default()
        };
        let request = RequestContext::new("http://testserver/").with_query("o", "-year");
        let spec = SortSpec::resolve(&settings, &request, "View").unwrap();
        assert_eq!(spec.keys()[0].field, "title");
        assert!(!spec.keys()[0].descending);
    }

    #[test]
    fn resolve_rejects_both_sort_settings() {
        let settings = ViewSettings {
            sorting_field: Some("title".to_string()),
            sorting_fields: Some(vec!["type".to_string()]),
            ..ViewSettings::default()
        };
        let err = SortSpec::resolve(&settings, &RequestContext::default(), "View").unwrap_err();
        assert!(matches!(err, AggregateError::Configuration { .. }));
    }
}
