//! Output shaping applied after merging and sorting.

use serde_json::{Value, json};

use super::error::AggregateError;
use super::types::{OutputFormat, RequestContext};

/// Final hook over the merged result, before pagination wraps it.
pub trait ResultFormatter: Send + Sync {
    fn format(&self, results: Value, request: &RequestContext) -> Result<Value, AggregateError>;
}

/// Wraps results as `{"data": ...}` for HTML rendering so templates get a
/// named root. JSON output passes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlEnvelope;

impl ResultFormatter for HtmlEnvelope {
    fn format(&self, results: Value, request: &RequestContext) -> Result<Value, AggregateError> {
        Ok(match request.format {
            OutputFormat::Html => json!({ "data": results }),
            OutputFormat::Json => results,
        })
    }
}
