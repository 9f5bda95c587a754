//! In-memory record store.
//!
//! Tables of JSON records, lazy queries over them, and the serializer used
//! to shape rows for output. Datasets load from a JSON file of the form
//! `{"tables": [{"name": "Play", "rows": [...]}]}`.

mod query;
mod serializer;
mod table;

use std::path::Path;

use anyhow::Context;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::info;

pub use query::{
    ContextualValue, FilterOperator, FilterValue, QueryFilter, compare_values, lookup_path,
    split_path,
};
pub use serializer::{FieldSerializer, SerializerField};
pub use table::{QuerySet, Table, TableQuery};

/// A single record: an insertion-ordered JSON object.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// On-disk dataset layout.
#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    tables: Vec<TableData>,
}

#[derive(Debug, Deserialize)]
struct TableData {
    name: String,
    #[serde(default)]
    rows: Vec<Record>,
}

/// Registry of named tables.
#[derive(Debug, Default)]
pub struct Store {
    tables: DashMap<String, Table>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a dataset from JSON text.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let dataset: Dataset = serde_json::from_str(json).context("invalid dataset JSON")?;
        let store = Self::new();
        for table in dataset.tables {
            if store.tables.contains_key(&table.name) {
                anyhow::bail!("duplicate table '{}' in dataset", table.name);
            }
            store.add_table(Table::with_rows(table.name, table.rows));
        }
        Ok(store)
    }

    /// Load a dataset file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset {}", path.display()))?;
        let store = Self::from_json(&json)?;
        info!(path = %path.display(), tables = store.tables.len(), "dataset loaded");
        Ok(store)
    }

    /// Register a table, replacing any table of the same name.
    pub fn add_table(&self, table: Table) {
        self.tables.insert(table.name().to_string(), table);
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<Table> {
        self.tables.get(name).map(|t| t.value().clone())
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }
}
