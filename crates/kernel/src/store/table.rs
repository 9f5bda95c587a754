//! In-memory tables, lazy queries and materialized query sets.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::Record;
use super::query::{FilterOperator, FilterValue, QueryFilter};

/// A named, append-only collection of records.
///
/// Cloning is cheap; clones share the same rows.
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

struct TableInner {
    name: String,
    rows: RwLock<Vec<Record>>,
    evaluations: AtomicUsize,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rows(name, Vec::new())
    }

    /// Create a table holding the given rows.
    pub fn with_rows(name: impl Into<String>, rows: Vec<Record>) -> Self {
        Self {
            inner: Arc::new(TableInner {
                name: name.into(),
                rows: RwLock::new(rows),
                evaluations: AtomicUsize::new(0),
            }),
        }
    }

    /// Table name. Doubles as the record kind of its rows.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Append a row.
    pub fn insert(&self, row: Record) {
        self.inner.rows.write().push(row);
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> usize {
        self.inner.rows.read().len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.inner.rows.read().is_empty()
    }

    /// How many times any query over this table has been evaluated.
    pub fn evaluations(&self) -> usize {
        self.inner.evaluations.load(Ordering::Relaxed)
    }

    /// Start an unfiltered query over this table.
    pub fn query(&self) -> TableQuery {
        TableQuery {
            table: self.clone(),
            filters: Vec::new(),
            excludes: Vec::new(),
        }
    }

    fn evaluate(&self, filters: &[QueryFilter], excludes: &[QueryFilter]) -> QuerySet {
        self.inner.evaluations.fetch_add(1, Ordering::Relaxed);
        let rows = self
            .inner
            .rows
            .read()
            .iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .filter(|row| !excludes.iter().any(|f| f.matches(row)))
            .cloned()
            .collect();
        QuerySet::new(self.name(), rows)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.inner.name)
            .field("rows", &self.len())
            .finish()
    }
}

/// A lazy query over a table.
///
/// Nothing is read until [`TableQuery::evaluate`] runs, and every call
/// reads the table afresh.
#[derive(Debug, Clone)]
pub struct TableQuery {
    table: Table,
    filters: Vec<QueryFilter>,
    excludes: Vec<QueryFilter>,
}

impl TableQuery {
    /// Keep rows matching the condition.
    pub fn filter(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: FilterValue,
    ) -> Self {
        self.filters.push(QueryFilter::new(field, operator, value));
        self
    }

    /// Drop rows matching the condition.
    pub fn exclude(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: FilterValue,
    ) -> Self {
        self.excludes.push(QueryFilter::new(field, operator, value));
        self
    }

    /// Add prepared filter conditions.
    pub fn with_filters(mut self, filters: impl IntoIterator<Item = QueryFilter>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Add prepared exclusion conditions.
    pub fn with_excludes(mut self, excludes: impl IntoIterator<Item = QueryFilter>) -> Self {
        self.excludes.extend(excludes);
        self
    }

    /// The underlying table.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Read the matching rows.
    pub fn evaluate(&self) -> QuerySet {
        self.table.evaluate(&self.filters, &self.excludes)
    }
}

/// An immutable, materialized set of rows of one kind.
///
/// Combinators return new sets; the original is never modified.
#[derive(Debug, Clone)]
pub struct QuerySet {
    kind: Arc<str>,
    rows: Arc<Vec<Record>>,
}

impl QuerySet {
    /// Wrap already materialized rows.
    pub fn new(kind: &str, rows: Vec<Record>) -> Self {
        Self {
            kind: Arc::from(kind),
            rows: Arc::new(rows),
        }
    }

    /// Record kind of the rows.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Rows satisfying the predicate.
    pub fn filter(&self, predicate: impl Fn(&Record) -> bool) -> Self {
        self.derive(self.rows.iter().filter(|row| predicate(row)).cloned().collect())
    }

    /// Rows not satisfying the predicate.
    pub fn exclude(&self, predicate: impl Fn(&Record) -> bool) -> Self {
        self.filter(|row| !predicate(row))
    }

    /// Rows matching a declarative condition.
    pub fn filter_by(&self, filter: &QueryFilter) -> Self {
        self.filter(|row| filter.matches(row))
    }

    /// A window of at most `limit` rows starting at `offset`.
    pub fn slice(&self, offset: usize, limit: usize) -> Self {
        self.derive(self.rows.iter().skip(offset).take(limit).cloned().collect())
    }

    fn derive(&self, rows: Vec<Record>) -> Self {
        Self {
            kind: Arc::clone(&self.kind),
            rows: Arc::new(rows),
        }
    }
}

impl<'a> IntoIterator for &'a QuerySet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
