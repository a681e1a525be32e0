//! The table-store surface the pipeline writes through.

use async_trait::async_trait;
use serde_json::Value;

use crate::DbError;

/// A row filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(String, Value),
    /// `column IN (values)`
    In(String, Vec<Value>),
}

impl Filter {
    /// Whether `row` passes this filter.
    #[must_use]
    pub fn matches(&self, row: &serde_json::Map<String, Value>) -> bool {
        match self {
            Self::Eq(column, value) => row.get(column) == Some(value),
            Self::In(column, values) => row.get(column).is_some_and(|v| values.contains(v)),
        }
    }
}

/// A paginated, filtered select.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Columns to return; empty means all.
    pub columns: Vec<String>,
    /// Filters, all of which must match.
    pub filters: Vec<Filter>,
    /// Rows to skip.
    pub offset: u64,
    /// Maximum rows to return.
    pub limit: u64,
}

impl Select {
    /// All columns of the first `limit` rows.
    #[must_use]
    pub const fn new(limit: u64) -> Self {
        Self {
            columns: Vec::new(),
            filters: Vec::new(),
            offset: 0,
            limit,
        }
    }

    /// Restricts the returned columns.
    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(ToString::to_string).collect();
        self
    }

    /// Adds a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets the offset.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

/// One page of a select.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Rows, ordered by `id`.
    pub rows: Vec<Value>,
    /// Total matching rows, when the store reports it.
    pub total: Option<u64>,
}

/// A table store reachable over some transport.
///
/// Rows are JSON objects keyed by column name. Every table has a
/// store-generated integer `id`.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Inserts `rows`, merging into existing rows that share the
    /// `on_conflict` columns. Returns the written rows including `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write is rejected, including when two
    /// rows in the same call share a conflict key.
    async fn upsert(
        &self,
        table: &str,
        on_conflict: &[&str],
        rows: &[Value],
    ) -> Result<Vec<Value>, DbError>;

    /// Inserts one row and returns it including `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write is rejected.
    async fn insert(&self, table: &str, row: &Value) -> Result<Value, DbError>;

    /// Reads one page of rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn select(&self, table: &str, query: &Select) -> Result<Page, DbError>;

    /// Deletes rows whose `column` is one of `values`. Returns the number
    /// of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    async fn delete_in(&self, table: &str, column: &str, values: &[Value])
    -> Result<u64, DbError>;

    /// Merges `changes` into the row with the given `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the update fails.
    async fn patch(&self, table: &str, id: i64, changes: &Value) -> Result<(), DbError>;
}
