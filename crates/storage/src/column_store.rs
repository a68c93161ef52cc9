//! Column-major row storage for a single table.
//!
//! Rows are appended in row-id order and never move relative to each other,
//! so a scan always yields rows in ascending row-id order. Removed rows leave
//! a tombstone until more than half of the slots are dead, at which point the
//! store compacts.

use std::sync::Arc;

use hashbrown::HashMap;
use vista_core::{ColumnId, Error, Record, Result, Row, RowId, Schema, Value};

/// Row storage with an optional unique index column.
#[derive(Clone, Debug)]
pub struct ColumnStore {
    schema: Arc<Schema>,
    columns: Vec<Vec<Value>>,
    row_ids: Vec<RowId>,
    live: Vec<bool>,
    positions: HashMap<RowId, usize>,
    dead: usize,
    index_column: Option<ColumnId>,
    index: HashMap<Value, RowId>,
}

impl ColumnStore {
    /// Creates an empty store. `index_column` must be a column of `schema`.
    pub fn new(schema: Arc<Schema>, index_column: Option<ColumnId>) -> Self {
        let columns = vec![Vec::new(); schema.len()];
        Self {
            schema,
            columns,
            row_ids: Vec::new(),
            live: Vec::new(),
            positions: HashMap::new(),
            dead: 0,
            index_column,
            index: HashMap::new(),
        }
    }

    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the number of live rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn index_column(&self) -> Option<ColumnId> {
        self.index_column
    }

    #[inline]
    pub fn contains(&self, row_id: RowId) -> bool {
        self.positions.contains_key(&row_id)
    }

    /// Looks up a row by its index value.
    pub fn find(&self, key: &Value) -> Option<RowId> {
        self.index.get(key).copied()
    }

    /// Appends a row. The row id must exceed every id already stored and the
    /// index value, if any, must be unique; both are checked by the caller.
    pub fn push(&mut self, row_id: RowId, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.columns.len());
        debug_assert!(self.row_ids.last().map_or(true, |&last| last < row_id));
        if let Some(col) = self.index_column {
            self.index.insert(values[col].clone(), row_id);
        }
        self.positions.insert(row_id, self.row_ids.len());
        self.row_ids.push(row_id);
        self.live.push(true);
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(value);
        }
    }

    /// Returns a cell of a live row.
    pub fn value(&self, row_id: RowId, column: ColumnId) -> Option<&Value> {
        let pos = *self.positions.get(&row_id)?;
        Some(&self.columns[column][pos])
    }

    /// Returns a copy of a live row.
    pub fn get(&self, row_id: RowId) -> Option<Row> {
        let pos = *self.positions.get(&row_id)?;
        Some(Row::new(row_id, self.row_at(pos)))
    }

    fn row_at(&self, pos: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c[pos].clone()).collect()
    }

    /// Overwrites cells of a live row, keeping the index in step.
    pub fn set(&mut self, row_id: RowId, changes: &[(ColumnId, Value)]) -> Result<()> {
        let pos = *self
            .positions
            .get(&row_id)
            .ok_or_else(|| Error::not_found("row", row_id))?;
        for (col, value) in changes {
            if Some(*col) == self.index_column {
                let old = std::mem::replace(&mut self.columns[*col][pos], value.clone());
                self.index.remove(&old);
                self.index.insert(value.clone(), row_id);
            } else {
                self.columns[*col][pos] = value.clone();
            }
        }
        Ok(())
    }

    /// Removes a live row, returning its values.
    pub fn remove(&mut self, row_id: RowId) -> Result<Vec<Value>> {
        let pos = self
            .positions
            .remove(&row_id)
            .ok_or_else(|| Error::not_found("row", row_id))?;
        let values = self.row_at(pos);
        if let Some(col) = self.index_column {
            self.index.remove(&values[col]);
        }
        self.live[pos] = false;
        self.dead += 1;
        if self.dead * 2 > self.row_ids.len() {
            self.compact();
        }
        Ok(values)
    }

    /// Drops every row.
    pub fn clear(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
        self.row_ids.clear();
        self.live.clear();
        self.positions.clear();
        self.index.clear();
        self.dead = 0;
    }

    fn compact(&mut self) {
        let live = std::mem::take(&mut self.live);
        for column in &mut self.columns {
            let mut keep = live.iter();
            column.retain(|_| keep.next().copied().unwrap_or(false));
        }
        let mut keep = live.iter();
        self.row_ids.retain(|_| keep.next().copied().unwrap_or(false));
        self.live = vec![true; self.row_ids.len()];
        self.positions = self
            .row_ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();
        self.dead = 0;
    }

    /// Live row ids in ascending order.
    pub fn row_ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.row_ids
            .iter()
            .zip(&self.live)
            .filter_map(|(id, live)| live.then_some(*id))
    }

    /// Live rows in ascending row-id order.
    pub fn scan(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.row_ids.len())
            .filter(|&pos| self.live[pos])
            .map(|pos| Row::new(self.row_ids[pos], self.row_at(pos)))
    }

    /// Live values of one column in ascending row-id order.
    pub fn column(&self, column: ColumnId) -> Vec<Value> {
        self.columns[column]
            .iter()
            .zip(&self.live)
            .filter_map(|(v, live)| live.then(|| v.clone()))
            .collect()
    }

    /// Live rows as name/value records, skipping nothing (nulls included).
    pub fn records(&self) -> Vec<Record> {
        self.scan()
            .map(|row| {
                self.schema
                    .names()
                    .zip(row.into_values())
                    .collect::<Record>()
            })
            .collect()
    }
}
