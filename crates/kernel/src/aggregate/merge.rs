//! Result merge strategies.
//!
//! Flat merging concatenates every source's records into one list and tags
//! each record with its label; grouped merging keys each source's records
//! by label.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::AggregateError;
use super::types::{SourceDescriptor, ViewSettings};
use crate::store::Record;

/// Key under which flat merging stores a record's label.
pub const TYPE_KEY: &str = "type";

/// Running merged result.
#[derive(Debug, Clone, PartialEq)]
pub enum MergedResult {
    /// One list of records in source order.
    Flat(Vec<Record>),
    /// Label to record list, in first-insertion order.
    Grouped(Record),
}

impl MergedResult {
    /// Number of records collected so far.
    pub fn record_count(&self) -> usize {
        match self {
            Self::Flat(records) => records.len(),
            Self::Grouped(groups) => groups
                .values()
                .map(|v| v.as_array().map_or(0, Vec::len))
                .sum(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Flat(records) => Value::Array(records.into_iter().map(Value::Object).collect()),
            Self::Grouped(groups) => Value::Object(groups),
        }
    }
}

/// How per-source records combine into one result.
pub trait MergeStrategy: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Initial empty result.
    fn empty_results(&self) -> MergedResult;

    /// Label for a source's records, if any.
    fn resolve_label(
        &self,
        descriptor: &SourceDescriptor,
        kind: &str,
        settings: &ViewSettings,
    ) -> Option<String>;

    /// Fold one source's records into the running result.
    fn add_to_results(
        &self,
        data: Vec<Record>,
        label: Option<&str>,
        results: MergedResult,
    ) -> Result<MergedResult, AggregateError>;

    /// Whether the configured sort applies to this shape.
    fn supports_sorting(&self) -> bool {
        false
    }
}

/// Concatenates records, tagging each with a `type` label.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatMerge;

impl MergeStrategy for FlatMerge {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn empty_results(&self) -> MergedResult {
        MergedResult::Flat(Vec::new())
    }

    fn resolve_label(
        &self,
        descriptor: &SourceDescriptor,
        kind: &str,
        settings: &ViewSettings,
    ) -> Option<String> {
        match descriptor.explicit_label() {
            Some(label) => Some(label.to_string()),
            None if settings.add_model_type => Some(kind.to_string()),
            None => None,
        }
    }

    fn add_to_results(
        &self,
        data: Vec<Record>,
        label: Option<&str>,
        results: MergedResult,
    ) -> Result<MergedResult, AggregateError> {
        let MergedResult::Flat(mut records) = results else {
            return Err(AggregateError::validation(
                "flat merge cannot extend a grouped result",
            ));
        };
        records.reserve(data.len());
        for mut record in data {
            if let Some(label) = label {
                record.shift_remove(TYPE_KEY);
                record.insert(TYPE_KEY.to_string(), Value::String(label.to_string()));
            }
            records.push(record);
        }
        Ok(MergedResult::Flat(records))
    }

    fn supports_sorting(&self) -> bool {
        true
    }
}

/// Keys each source's records by label.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupedMerge;

impl MergeStrategy for GroupedMerge {
    fn name(&self) -> &'static str {
        "grouped"
    }

    fn empty_results(&self) -> MergedResult {
        MergedResult::Grouped(Record::new())
    }

    fn resolve_label(
        &self,
        descriptor: &SourceDescriptor,
        kind: &str,
        _settings: &ViewSettings,
    ) -> Option<String> {
        Some(
            descriptor
                .explicit_label()
                .unwrap_or(kind)
                .to_string(),
        )
    }

    fn add_to_results(
        &self,
        data: Vec<Record>,
        label: Option<&str>,
        results: MergedResult,
    ) -> Result<MergedResult, AggregateError> {
        let MergedResult::Grouped(mut groups) = results else {
            return Err(AggregateError::validation(
                "grouped merge cannot extend a flat result",
            ));
        };
        let label = label
            .filter(|l| !l.is_empty())
            .ok_or_else(|| AggregateError::validation("grouped results require a non-empty label"))?;
        // A repeated label replaces the earlier group in place.
        groups.insert(
            label.to_string(),
            Value::Array(data.into_iter().map(Value::Object).collect()),
        );
        Ok(MergedResult::Grouped(groups))
    }
}

/// Declarative choice of merge strategy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    #[default]
    Flat,
    Grouped,
}

impl ResultShape {
    pub fn strategy(self) -> Arc<dyn MergeStrategy> {
        match self {
            Self::Flat => Arc::new(FlatMerge),
            Self::Grouped => Arc::new(GroupedMerge),
        }
    }
}
