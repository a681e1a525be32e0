//! Read-through store for dry runs.
//!
//! Reads see the real datastore plus whatever this process has staged;
//! writes only ever reach the staging [`MemoryStore`]. A dry run over a
//! populated datastore therefore resolves existing players and scans
//! existing snapshots exactly as a real run would, without changing them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::DbError;
use crate::memory::MemoryStore;
use crate::store::{Page, Select, TableStore};

/// Reads from `base` and stages every write in memory.
pub struct DryRunStore {
    base: Arc<dyn TableStore>,
    staged: MemoryStore,
}

impl std::fmt::Debug for DryRunStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DryRunStore")
            .field("staged", &self.staged)
            .finish_non_exhaustive()
    }
}

impl DryRunStore {
    /// Wraps `base`. Nothing is written to it.
    #[must_use]
    pub fn new(base: Arc<dyn TableStore>) -> Self {
        Self {
            base,
            staged: MemoryStore::new(),
        }
    }

    /// Writes staged so far.
    #[must_use]
    pub const fn staged(&self) -> &MemoryStore {
        &self.staged
    }
}

#[async_trait]
impl TableStore for DryRunStore {
    async fn upsert(
        &self,
        table: &str,
        on_conflict: &[&str],
        rows: &[Value],
    ) -> Result<Vec<Value>, DbError> {
        self.staged.upsert(table, on_conflict, rows).await
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<Value, DbError> {
        self.staged.insert(table, row).await
    }

    /// Pages over the base rows followed by the staged rows.
    async fn select(&self, table: &str, query: &Select) -> Result<Page, DbError> {
        let base = self.base.select(table, query).await?;
        let everything_staged = Select {
            offset: 0,
            limit: u64::MAX,
            ..query.clone()
        };
        let staged = self.staged.select(table, &everything_staged).await?.rows;
        let staged_total = staged.len() as u64;

        let fetched = base.rows.len() as u64;
        if fetched >= query.limit {
            return Ok(Page {
                rows: base.rows,
                total: base.total.map(|t| t + staged_total),
            });
        }

        // The base is exhausted at this offset.
        let base_total = base.total.unwrap_or(query.offset + fetched);
        let skip = usize::try_from(query.offset.saturating_sub(base_total)).unwrap_or(usize::MAX);
        let room = usize::try_from(query.limit - fetched).unwrap_or(usize::MAX);

        let mut rows = base.rows;
        rows.extend(staged.into_iter().skip(skip).take(room));
        Ok(Page {
            rows,
            total: Some(base_total + staged_total),
        })
    }

    async fn delete_in(
        &self,
        table: &str,
        column: &str,
        values: &[Value],
    ) -> Result<u64, DbError> {
        self.staged.delete_in(table, column, values).await
    }

    async fn patch(&self, table: &str, id: i64, changes: &Value) -> Result<(), DbError> {
        self.staged.patch(table, id, changes).await
    }
}
