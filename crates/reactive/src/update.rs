//! Update payloads delivered to view observers.
//!
//! A `ViewUpdate` describes the table changes a view has just absorbed, in
//! the order they were applied. Columns are named so observers need not hold
//! the schema.

use vista_core::{ColumnId, RowId, Schema, Value};
use vista_incremental::{DeltaBatch, DeltaOp, Seq};

/// Process-unique view identifier.
pub type ViewId = u64;

/// One row-level change.
#[derive(Clone, Debug, PartialEq)]
pub struct RowChange {
    pub op: DeltaOp,
    pub row_id: RowId,
    /// Written columns: the full row for inserts, the changed columns for
    /// updates, nothing for removes.
    pub columns: Vec<(String, Value)>,
}

/// Changes applied to one view between two seqs.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewUpdate {
    pub view_id: ViewId,
    pub first_seq: Seq,
    pub last_seq: Seq,
    pub changes: Vec<RowChange>,
}

impl ViewUpdate {
    /// Builds an update from a pulled batch, leaving out updates that write
    /// none of `reads`, the columns the view depends on.
    pub fn from_batch(
        view_id: ViewId,
        batch: &DeltaBatch,
        schema: &Schema,
        reads: &[ColumnId],
    ) -> Self {
        let changes = batch
            .deltas
            .iter()
            .filter(|delta| delta.touches(reads))
            .map(|delta| RowChange {
                op: delta.op(),
                row_id: delta.row_id(),
                columns: delta
                    .changes()
                    .iter()
                    .map(|(col, value)| (schema.name(*col).to_string(), value.clone()))
                    .collect(),
            })
            .collect();
        Self {
            view_id,
            first_seq: batch.first_seq,
            last_seq: batch.last_seq,
            changes,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Appends a later update of the same view.
    pub fn merge(&mut self, later: ViewUpdate) {
        debug_assert_eq!(self.view_id, later.view_id);
        self.last_seq = self.last_seq.max(later.last_seq);
        self.changes.extend(later.changes);
    }
}
