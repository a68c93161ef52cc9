//! Delta records for table change propagation.
//!
//! A Delta is an immutable record of one row-level change, stamped with a
//! per-table sequence number. Inserts carry the full row, updates carry only
//! the changed columns, removes carry nothing.

use std::sync::Arc;

use hashbrown::HashMap;
use vista_core::{ColumnId, RowId, Value};

/// Per-table sequence number. The first delta of a table is 1; 0 means
/// "nothing applied yet".
pub type Seq = u64;

/// Kind of row-level change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeltaOp {
    Insert,
    Update,
    Remove,
}

impl DeltaOp {
    /// Lowercase name used in logs and payloads.
    pub fn name(&self) -> &'static str {
        match self {
            DeltaOp::Insert => "insert",
            DeltaOp::Update => "update",
            DeltaOp::Remove => "remove",
        }
    }
}

/// A single row-level change.
#[derive(Clone, Debug, PartialEq)]
pub struct Delta {
    seq: Seq,
    op: DeltaOp,
    row_id: RowId,
    /// `(column, value)` pairs in column order.
    changes: Vec<(ColumnId, Value)>,
}

impl Delta {
    /// Creates an insert delta carrying the full row.
    pub fn insert(seq: Seq, row_id: RowId, values: Vec<Value>) -> Self {
        Self {
            seq,
            op: DeltaOp::Insert,
            row_id,
            changes: values.into_iter().enumerate().collect(),
        }
    }

    /// Creates an update delta carrying the changed columns.
    pub fn update(seq: Seq, row_id: RowId, mut changes: Vec<(ColumnId, Value)>) -> Self {
        changes.sort_by_key(|(col, _)| *col);
        Self {
            seq,
            op: DeltaOp::Update,
            row_id,
            changes,
        }
    }

    /// Creates a remove delta.
    pub fn remove(seq: Seq, row_id: RowId) -> Self {
        Self {
            seq,
            op: DeltaOp::Remove,
            row_id,
            changes: Vec::new(),
        }
    }

    #[inline]
    pub fn seq(&self) -> Seq {
        self.seq
    }

    #[inline]
    pub fn op(&self) -> DeltaOp {
        self.op
    }

    #[inline]
    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    /// Returns the changed `(column, value)` pairs.
    #[inline]
    pub fn changes(&self) -> &[(ColumnId, Value)] {
        &self.changes
    }

    /// Looks up the value this delta writes to `column`.
    pub fn get(&self, column: ColumnId) -> Option<&Value> {
        self.changes
            .binary_search_by_key(&column, |(col, _)| *col)
            .ok()
            .map(|i| &self.changes[i].1)
    }

    /// Returns true if this delta writes any of `columns`.
    pub fn touches(&self, columns: &[ColumnId]) -> bool {
        match self.op {
            DeltaOp::Update => self.changes.iter().any(|(col, _)| columns.contains(col)),
            DeltaOp::Insert | DeltaOp::Remove => true,
        }
    }

    /// Folds an earlier update of the same row into this one.
    ///
    /// The result keeps this delta's seq; columns written by both take this
    /// delta's value.
    pub fn absorb(&self, earlier: &Delta) -> Delta {
        debug_assert_eq!(self.op, DeltaOp::Update);
        debug_assert_eq!(earlier.op, DeltaOp::Update);
        debug_assert_eq!(self.row_id, earlier.row_id);
        let mut changes = self.changes.clone();
        for (col, value) in &earlier.changes {
            if self.get(*col).is_none() {
                changes.push((*col, value.clone()));
            }
        }
        Delta::update(self.seq, self.row_id, changes)
    }

    /// Applies this delta to a row mirror of `width` columns.
    ///
    /// Replaying every delta of a table from empty reproduces its live rows.
    /// An update for an unknown row materializes it with nulls elsewhere.
    pub fn apply_to(&self, rows: &mut HashMap<RowId, Vec<Value>>, width: usize) {
        match self.op {
            DeltaOp::Insert => {
                let mut values = vec![Value::Null; width];
                for (col, value) in &self.changes {
                    values[*col] = value.clone();
                }
                rows.insert(self.row_id, values);
            }
            DeltaOp::Update => {
                let values = rows
                    .entry(self.row_id)
                    .or_insert_with(|| vec![Value::Null; width]);
                for (col, value) in &self.changes {
                    values[*col] = value.clone();
                }
            }
            DeltaOp::Remove => {
                rows.remove(&self.row_id);
            }
        }
    }
}

/// An ordered run of deltas handed to one subscriber.
#[derive(Clone, Debug, Default)]
pub struct DeltaBatch {
    /// Seq of the first delta in the batch.
    pub first_seq: Seq,
    /// Seq of the last delta in the batch; the subscriber acks this.
    pub last_seq: Seq,
    /// Deltas in application order.
    pub deltas: Vec<Arc<Delta>>,
    /// Number of updates folded away by coalescing.
    pub coalesced: usize,
}

impl DeltaBatch {
    /// Returns true if there is nothing to apply.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Returns the number of deltas.
    #[inline]
    pub fn len(&self) -> usize {
        self.deltas.len()
    }
}
