//! In-process [`TableStore`].
//!
//! Mirrors the REST store's conflict semantics closely enough that a dry
//! run produces the same counts as a real one: upserts merge on the
//! conflict columns, and two rows sharing a conflict key in one call are
//! rejected the way Postgres rejects them.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::DbError;
use crate::store::{Page, Select, TableStore};

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: Vec<Map<String, Value>>,
}

impl Table {
    fn push(&mut self, mut row: Map<String, Value>) -> Map<String, Value> {
        self.next_id += 1;
        row.insert("id".to_string(), Value::from(self.next_id));
        self.rows.push(row.clone());
        row
    }
}

/// Tables held in memory, keyed by name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, Table>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row in `table`, ordered by `id`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(table)
            .map(|t| t.rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Number of rows in `table`.
    #[must_use]
    pub fn count(&self, table: &str) -> usize {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get(table).map_or(0, |t| t.rows.len())
    }
}

fn as_object(table: &str, value: &Value) -> Result<Map<String, Value>, DbError> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| DbError::Conversion {
            message: format!("{table}: row is not a JSON object"),
        })
}

fn conflict_key(row: &Map<String, Value>, columns: &[&str]) -> Vec<Value> {
    columns
        .iter()
        .map(|c| row.get(*c).cloned().unwrap_or(Value::Null))
        .collect()
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn upsert(
        &self,
        table: &str,
        on_conflict: &[&str],
        rows: &[Value],
    ) -> Result<Vec<Value>, DbError> {
        let incoming = rows
            .iter()
            .map(|r| as_object(table, r))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = Vec::with_capacity(incoming.len());
        for row in &incoming {
            let key = conflict_key(row, on_conflict);
            if seen.contains(&key) {
                return Err(DbError::Status {
                    table: table.to_string(),
                    status: 500,
                    body: "ON CONFLICT DO UPDATE command cannot affect row a second time"
                        .to_string(),
                });
            }
            seen.push(key);
        }

        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = tables.entry(table.to_string()).or_default();
        let mut written = Vec::with_capacity(incoming.len());

        for row in incoming {
            let key = conflict_key(&row, on_conflict);
            let existing = stored
                .rows
                .iter_mut()
                .find(|r| conflict_key(r, on_conflict) == key);
            if let Some(existing) = existing {
                for (column, value) in row {
                    if column != "id" {
                        existing.insert(column, value);
                    }
                }
                written.push(Value::Object(existing.clone()));
            } else {
                written.push(Value::Object(stored.push(row)));
            }
        }

        Ok(written)
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<Value, DbError> {
        let row = as_object(table, row)?;
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Value::Object(
            tables.entry(table.to_string()).or_default().push(row),
        ))
    }

    async fn select(&self, table: &str, query: &Select) -> Result<Page, DbError> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(stored) = tables.get(table) else {
            return Ok(Page {
                rows: Vec::new(),
                total: Some(0),
            });
        };

        let matching: Vec<&Map<String, Value>> = stored
            .rows
            .iter()
            .filter(|row| query.filters.iter().all(|f| f.matches(row)))
            .collect();
        let total = matching.len() as u64;

        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        let rows = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                if query.columns.is_empty() {
                    Value::Object(row.clone())
                } else {
                    Value::Object(
                        query
                            .columns
                            .iter()
                            .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                            .collect(),
                    )
                }
            })
            .collect();

        Ok(Page {
            rows,
            total: Some(total),
        })
    }

    async fn delete_in(
        &self,
        table: &str,
        column: &str,
        values: &[Value],
    ) -> Result<u64, DbError> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(stored) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = stored.rows.len();
        stored
            .rows
            .retain(|row| !row.get(column).is_some_and(|v| values.contains(v)));
        Ok((before - stored.rows.len()) as u64)
    }

    async fn patch(&self, table: &str, id: i64, changes: &Value) -> Result<(), DbError> {
        let changes = as_object(table, changes)?;
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let row = tables
            .get_mut(table)
            .and_then(|t| {
                t.rows
                    .iter_mut()
                    .find(|r| r.get("id").and_then(Value::as_i64) == Some(id))
            })
            .ok_or_else(|| DbError::Conversion {
                message: format!("{table}: no row with id {id}"),
            })?;
        for (column, value) in changes {
            row.insert(column, value);
        }
        Ok(())
    }
}
