//! Aggregate engine types.
//!
//! Provides type definitions shared across the aggregation pipeline:
//! - RequestContext: query parameters, path arguments and output format
//! - SourceDescriptor: one source with its transform, label and filter
//! - ViewSettings: per-view sort, label and pagination configuration

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::AggregateError;
use crate::store::{FieldSerializer, QuerySet, Record, TableQuery};

/// Response rendering requested by the client.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Html,
}

impl OutputFormat {
    /// Parse a `format` override value.
    pub fn from_param(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" | "api" => Some(Self::Json),
            "html" => Some(Self::Html),
            _ => None,
        }
    }
}

/// Request data visible to the aggregation pipeline.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Absolute URL of the request without its query string.
    pub url: String,

    /// Query parameters in request order. Repeated keys are kept.
    pub query: Vec<(String, String)>,

    /// Named path arguments.
    pub path_params: HashMap<String, String>,

    /// Negotiated output format.
    pub format: OutputFormat,
}

impl RequestContext {
    /// Context for a request to `url` with no parameters.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Add a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a named path argument.
    pub fn with_path_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(key.into(), value.into());
        self
    }

    /// Name trailing path segments after `names`, falling back to their
    /// position.
    pub fn with_path_args<'a>(
        mut self,
        segments: impl IntoIterator<Item = &'a str>,
        names: &[String],
    ) -> Self {
        for (i, segment) in segments.into_iter().enumerate() {
            let key = names.get(i).cloned().unwrap_or_else(|| i.to_string());
            self.path_params.insert(key, segment.to_string());
        }
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Last value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a named path argument.
    pub fn path_param(&self, key: &str) -> Option<&str> {
        self.path_params.get(key).map(String::as_str)
    }
}

/// A data source: produces a fresh materialization per request.
pub trait Source: Send + Sync + fmt::Debug {
    /// Record kind of the rows, used as the default label.
    fn kind(&self) -> &str;

    /// Evaluate the source. Every call reflects current data.
    fn all(&self) -> QuerySet;
}

impl Source for TableQuery {
    fn kind(&self) -> &str {
        self.table().name()
    }

    fn all(&self) -> QuerySet {
        self.evaluate()
    }
}

impl Source for QuerySet {
    fn kind(&self) -> &str {
        QuerySet::kind(self)
    }

    fn all(&self) -> QuerySet {
        self.clone()
    }
}

/// Turns rows of a source into output records.
pub trait Transform: Send + Sync + fmt::Debug {
    fn transform(
        &self,
        rows: &QuerySet,
        request: &RequestContext,
    ) -> Result<Vec<Record>, AggregateError>;
}

impl Transform for FieldSerializer {
    fn transform(
        &self,
        rows: &QuerySet,
        _request: &RequestContext,
    ) -> Result<Vec<Record>, AggregateError> {
        Ok(self.serialize_many(rows))
    }
}

/// Per-source filter applied after the view-wide filter backends.
pub type FilterFn =
    Arc<dyn Fn(QuerySet, &RequestContext) -> anyhow::Result<QuerySet> + Send + Sync>;

/// One entry of a view's source set.
#[derive(Clone, Default)]
pub struct SourceDescriptor {
    pub source: Option<Arc<dyn Source>>,
    pub transform: Option<Arc<dyn Transform>>,
    /// Explicit label. An empty string counts as unset.
    pub label: Option<String>,
    pub filter_fn: Option<FilterFn>,
}

impl SourceDescriptor {
    /// Descriptor with its two required parts.
    pub fn new(source: impl Source + 'static, transform: impl Transform + 'static) -> Self {
        Self {
            source: Some(Arc::new(source)),
            transform: Some(Arc::new(transform)),
            label: None,
            filter_fn: None,
        }
    }

    /// Set an explicit label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach a per-source filter.
    pub fn with_filter_fn<F>(mut self, filter_fn: F) -> Self
    where
        F: Fn(QuerySet, &RequestContext) -> anyhow::Result<QuerySet> + Send + Sync + 'static,
    {
        self.filter_fn = Some(Arc::new(filter_fn));
        self
    }

    /// The explicit label, if set and non-empty.
    pub fn explicit_label(&self) -> Option<&str> {
        self.label.as_deref().filter(|l| !l.is_empty())
    }

    /// Check the required parts and hand them out.
    pub fn require(
        &self,
        view: &str,
    ) -> Result<(&Arc<dyn Source>, &Arc<dyn Transform>), AggregateError> {
        let source = self.source.as_ref().ok_or_else(|| missing_key(view, "source"))?;
        let transform = self
            .transform
            .as_ref()
            .ok_or_else(|| missing_key(view, "transform"))?;
        Ok((source, transform))
    }
}

fn missing_key(view: &str, key: &str) -> AggregateError {
    AggregateError::validation(format!(
        "{view}: every entry of the source set must contain a `{key}` key"
    ))
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("source", &self.source)
            .field("transform", &self.transform)
            .field("label", &self.label)
            .field("filter_fn", &self.filter_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Static configuration for an aggregate view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewSettings {
    /// Single sort field. Mutually exclusive with `sorting_fields`.
    #[serde(default)]
    pub sorting_field: Option<String>,

    /// Multi-key sort, applied left to right by precedence.
    #[serde(default)]
    pub sorting_fields: Option<Vec<String>>,

    /// Public sort names mapped to record paths.
    #[serde(default)]
    pub sorting_fields_map: HashMap<String, String>,

    /// Query parameter that overrides the configured sort. `None` disables
    /// request-driven sorting.
    #[serde(default = "default_sorting_parameter")]
    pub sorting_parameter: Option<String>,

    /// Fall back to the record kind as the flat label.
    #[serde(default = "default_true")]
    pub add_model_type: bool,

    /// Pagination. `None` leaves results unpaginated.
    #[serde(default)]
    pub pagination: Option<PaginationSettings>,

    /// Tera template for HTML output.
    #[serde(default)]
    pub template: Option<String>,

    /// Names for trailing URL segments, in order. Unnamed segments are
    /// keyed by position ("0", "1", ...).
    #[serde(default)]
    pub path_args: Vec<String>,
}

fn default_sorting_parameter() -> Option<String> {
    Some("o".to_string())
}

fn default_true() -> bool {
    true
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            sorting_field: None,
            sorting_fields: None,
            sorting_fields_map: HashMap::new(),
            sorting_parameter: default_sorting_parameter(),
            add_model_type: true,
            pagination: None,
            template: None,
            path_args: Vec::new(),
        }
    }
}

/// Paginator selection for a view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationSettings {
    #[serde(flatten)]
    pub style: PagerStyle,

    /// Wrap the paginator in the aggregate envelope. Without it, paginated
    /// requests fail with a configuration error.
    #[serde(default = "default_true")]
    pub aggregate: bool,
}

impl PaginationSettings {
    pub fn new(style: PagerStyle) -> Self {
        Self {
            style,
            aggregate: true,
        }
    }
}

/// Pager style and its parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum PagerStyle {
    /// `?limit=&offset=` windows.
    LimitOffset {
        #[serde(default = "default_limit")]
        default_limit: usize,
        #[serde(default)]
        max_limit: Option<usize>,
    },
    /// `?page=` numbered pages.
    PageNumber {
        #[serde(default = "default_limit")]
        page_size: usize,
        #[serde(default)]
        page_size_query_param: Option<String>,
        #[serde(default)]
        max_page_size: Option<usize>,
    },
}

fn default_limit() -> usize {
    10
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn view_settings_defaults() {
        let settings: ViewSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings, ViewSettings::default());
        assert_eq!(settings.sorting_parameter.as_deref(), Some("o"));
        assert!(settings.add_model_type);
        assert!(settings.pagination.is_none());
    }

    #[test]
    fn null_sorting_parameter_disables_override() {
        let settings: ViewSettings =
            serde_json::from_value(json!({"sorting_parameter": null})).unwrap();
        assert!(settings.sorting_parameter.is_none());
    }

    #[test]
    fn pagination_settings_deserialize() {
        let settings: PaginationSettings =
            serde_json::from_value(json!({"style": "limit_offset", "default_limit": 2})).unwrap();
        assert!(settings.aggregate);
        assert_eq!(
            settings.style,
            PagerStyle::LimitOffset {
                default_limit: 2,
                max_limit: None
            }
        );

        let plain: PaginationSettings =
            serde_json::from_value(json!({"style": "page_number", "aggregate": false})).unwrap();
        assert!(!plain.aggregate);
    }

    #[test]
    fn query_param_returns_last_value() {
        let request = RequestContext::new("http://testserver/")
            .with_query("o", "title")
            .with_query("o", "-year");
        assert_eq!(request.query_param("o"), Some("-year"));
        assert_eq!(request.query_param("limit"), None);
    }

    #[test]
    fn path_args_named_then_positional() {
        let request = RequestContext::new("http://testserver/")
            .with_path_args(["Julius Caesar", "extra"], &["play".to_string()]);
        assert_eq!(request.path_param("play"), Some("Julius Caesar"));
        assert_eq!(request.path_param("1"), Some("extra"));
    }

    #[test]
    fn output_format_param() {
        assert_eq!(OutputFormat::from_param("HTML"), Some(OutputFormat::Html));
        assert_eq!(OutputFormat::from_param("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_param("xml"), None);
    }

    #[test]
    fn empty_label_counts_as_unset() {
        let descriptor = SourceDescriptor::default().with_label("");
        assert!(descriptor.explicit_label().is_none());
    }

    #[test]
    fn require_reports_missing_key() {
        let err = SourceDescriptor::default().require("PlayView").unwrap_err();
        assert!(matches!(err, AggregateError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "PlayView: every entry of the source set must contain a `source` key"
        );
    }
}
