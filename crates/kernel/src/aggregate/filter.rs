//! View-wide filter backends.
//!
//! Backends run against every source of a view, before the source's own
//! filter function.

use std::fmt;

use serde_json::Value;

use super::types::RequestContext;
use crate::store::{QuerySet, Record, lookup_path};

/// Request-driven filter applied to every source.
pub trait FilterBackend: Send + Sync + fmt::Debug {
    fn filter_rows(&self, rows: QuerySet, request: &RequestContext) -> anyhow::Result<QuerySet>;
}

/// Case-insensitive search across a fixed set of fields.
///
/// The parameter value is split on whitespace and commas; a row matches
/// when every term occurs in at least one of the fields.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    fields: Vec<String>,
    param: String,
}

impl SearchFilter {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            param: "search".to_string(),
        }
    }

    /// Read terms from a different query parameter.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }

    pub fn terms(&self, request: &RequestContext) -> Vec<String> {
        request
            .query_param(&self.param)
            .map(|raw| {
                raw.split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|t| !t.is_empty())
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn row_matches(&self, row: &Record, terms: &[String]) -> bool {
        let haystacks: Vec<String> = self
            .fields
            .iter()
            .filter_map(|field| lookup_path(row, field))
            .filter_map(searchable_text)
            .collect();
        terms
            .iter()
            .all(|term| haystacks.iter().any(|h| h.contains(term.as_str())))
    }
}

fn searchable_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl FilterBackend for SearchFilter {
    fn filter_rows(&self, rows: QuerySet, request: &RequestContext) -> anyhow::Result<QuerySet> {
        let terms = self.terms(request);
        if terms.is_empty() || self.fields.is_empty() {
            return Ok(rows);
        }
        Ok(rows.filter(|row| self.row_matches(row, &terms)))
    }
}
