//! Multi-source aggregation engine.
//!
//! This module provides:
//! - AggregateView: resolves sources, merges, sorts, formats and paginates
//! - MergeStrategy: flat (labelled list) and grouped (label-keyed) shapes
//! - SortSpec: multi-key sorting with request overrides and field remapping
//! - Paginator / AggregatePagination: per-source windows, one envelope
//! - AggregateRegistry / AggregateDefinition: named and declarative views

mod definition;
mod error;
mod filter;
mod format;
mod merge;
mod pagination;
mod registry;
mod sort;
mod source_set;
pub mod types;
mod view;

pub use definition::{AggregateDefinition, SourceDefinition, is_valid_view_id, load_definitions};
pub use error::AggregateError;
pub use filter::{FilterBackend, SearchFilter};
pub use format::{HtmlEnvelope, ResultFormatter};
pub use merge::{FlatMerge, GroupedMerge, MergeStrategy, MergedResult, ResultShape, TYPE_KEY};
pub use pagination::{
    AggregatePagination, LimitOffsetPagination, PageNumberPagination, PaginationState, Paginator,
    paginator_from_settings, remove_query_param, replace_query_param,
};
pub use registry::{AggregateRegistry, ViewSummary};
pub use sort::{SortKey, SortSpec};
pub use source_set::{CachedSourceSet, DynamicSourceSet, SourceSet, SourceSetCache};
pub use types::{
    FilterFn, OutputFormat, PagerStyle, PaginationSettings, RequestContext, Source,
    SourceDescriptor, Transform, ViewSettings,
};
pub use view::{AggregateView, LoadedSource, PaginatorFactory};
