//! The per-table delta channel.
//!
//! `DeltaLog` keeps every delta some subscriber has not yet acknowledged.
//! Each subscriber owns a cursor holding its last acknowledged seq; pulling
//! never advances the cursor, so a subscriber that fails mid-batch simply
//! pulls the same deltas again (at-least-once, in order). Entries at or below
//! the slowest cursor are dropped on every ack.

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::HashMap;
use vista_core::{ColumnId, RowId, Value};

use crate::delta::{Delta, DeltaBatch, DeltaOp, Seq};

/// Identifies one subscriber's position in a log.
pub type CursorId = u64;

/// Default lag, in deltas, beyond which pulls coalesce updates.
pub const DEFAULT_COALESCE_AFTER: usize = 1024;

/// Ordered log of deltas for one table.
pub struct DeltaLog {
    /// Unacknowledged deltas; seqs are contiguous.
    entries: VecDeque<Arc<Delta>>,
    /// Seq of the most recently appended delta.
    head: Seq,
    /// Cursor -> last acknowledged seq.
    cursors: HashMap<CursorId, Seq>,
    next_cursor: CursorId,
    coalesce_after: usize,
}

impl Default for DeltaLog {
    fn default() -> Self {
        Self::new(DEFAULT_COALESCE_AFTER)
    }
}

impl DeltaLog {
    /// Creates an empty log.
    pub fn new(coalesce_after: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            head: 0,
            cursors: HashMap::new(),
            next_cursor: 1,
            coalesce_after,
        }
    }

    /// Seq of the most recently appended delta (0 when empty).
    #[inline]
    pub fn head(&self) -> Seq {
        self.head
    }

    /// Number of retained deltas.
    #[inline]
    pub fn retained(&self) -> usize {
        self.entries.len()
    }

    /// Number of open cursors.
    #[inline]
    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    fn push(&mut self, delta: Delta) -> Seq {
        let seq = delta.seq();
        self.head = seq;
        if !self.cursors.is_empty() {
            self.entries.push_back(Arc::new(delta));
        }
        seq
    }

    /// Appends an insert carrying the full row.
    pub fn append_insert(&mut self, row_id: RowId, values: Vec<Value>) -> Seq {
        let delta = Delta::insert(self.head + 1, row_id, values);
        self.push(delta)
    }

    /// Appends an update carrying the changed columns.
    pub fn append_update(&mut self, row_id: RowId, changes: Vec<(ColumnId, Value)>) -> Seq {
        let delta = Delta::update(self.head + 1, row_id, changes);
        self.push(delta)
    }

    /// Appends a remove.
    pub fn append_remove(&mut self, row_id: RowId) -> Seq {
        let delta = Delta::remove(self.head + 1, row_id);
        self.push(delta)
    }

    /// Opens a cursor positioned at the current head.
    pub fn open_cursor(&mut self) -> CursorId {
        let id = self.next_cursor;
        self.next_cursor += 1;
        self.cursors.insert(id, self.head);
        id
    }

    /// Closes a cursor. Returns false if it was not open.
    pub fn close_cursor(&mut self, cursor: CursorId) -> bool {
        let closed = self.cursors.remove(&cursor).is_some();
        if closed {
            self.truncate();
        }
        closed
    }

    /// Returns the last acknowledged seq of a cursor.
    pub fn checkpoint(&self, cursor: CursorId) -> Option<Seq> {
        self.cursors.get(&cursor).copied()
    }

    /// Returns how many deltas a cursor has not acknowledged.
    pub fn lag(&self, cursor: CursorId) -> Option<usize> {
        self.checkpoint(cursor).map(|seq| (self.head - seq) as usize)
    }

    /// Returns every delta after the cursor's checkpoint.
    ///
    /// When the cursor lags by more than the coalescing threshold, runs of
    /// updates to the same row are folded into the latest one. Returns `None`
    /// for an unknown cursor.
    pub fn pull(&self, cursor: CursorId) -> Option<DeltaBatch> {
        let checkpoint = self.checkpoint(cursor)?;
        let start = self.entries.partition_point(|d| d.seq() <= checkpoint);
        let pending: Vec<Arc<Delta>> = self.entries.range(start..).cloned().collect();

        let Some(last) = pending.last() else {
            return Some(DeltaBatch {
                first_seq: checkpoint + 1,
                last_seq: checkpoint,
                deltas: Vec::new(),
                coalesced: 0,
            });
        };
        let first_seq = pending[0].seq();
        let last_seq = last.seq();

        if pending.len() > self.coalesce_after {
            let before = pending.len();
            let deltas = coalesce(pending);
            let coalesced = before - deltas.len();
            if coalesced > 0 {
                log::warn!(
                    "cursor {} lagging by {} deltas, coalesced {} updates",
                    cursor,
                    before,
                    coalesced
                );
            }
            return Some(DeltaBatch {
                first_seq,
                last_seq,
                deltas,
                coalesced,
            });
        }

        Some(DeltaBatch {
            first_seq,
            last_seq,
            deltas: pending,
            coalesced: 0,
        })
    }

    /// Advances a cursor's checkpoint and drops deltas every cursor has seen.
    ///
    /// Checkpoints never move backwards and never pass the head.
    pub fn ack(&mut self, cursor: CursorId, seq: Seq) -> bool {
        let head = self.head;
        match self.cursors.get_mut(&cursor) {
            Some(checkpoint) => {
                *checkpoint = (*checkpoint).max(seq.min(head));
                self.truncate();
                true
            }
            None => false,
        }
    }

    /// Drops every entry and cursor.
    pub fn close(&mut self) {
        self.entries.clear();
        self.cursors.clear();
    }

    fn truncate(&mut self) {
        match self.cursors.values().min().copied() {
            Some(low) => {
                while self.entries.front().is_some_and(|d| d.seq() <= low) {
                    self.entries.pop_front();
                }
            }
            None => self.entries.clear(),
        }
    }
}

/// Folds each update into the next update of the same row.
///
/// The output is a subsequence of the input in the same order, so deltas of
/// different rows are never reordered. Inserts and removes always survive
/// and break a row's run: an update is only folded into a later update when
/// no insert or remove of that row lies between them.
pub fn coalesce(deltas: Vec<Arc<Delta>>) -> Vec<Arc<Delta>> {
    let mut out: Vec<Option<Arc<Delta>>> = Vec::with_capacity(deltas.len());
    let mut open_update: HashMap<RowId, usize> = HashMap::new();

    for delta in deltas {
        let row_id = delta.row_id();
        match delta.op() {
            DeltaOp::Update => {
                let merged = match open_update.get(&row_id) {
                    Some(&at) => {
                        let earlier = out[at].take();
                        match earlier {
                            Some(earlier) => Arc::new(delta.absorb(&earlier)),
                            None => delta,
                        }
                    }
                    None => delta,
                };
                open_update.insert(row_id, out.len());
                out.push(Some(merged));
            }
            DeltaOp::Insert | DeltaOp::Remove => {
                open_update.remove(&row_id);
                out.push(Some(delta));
            }
        }
    }

    out.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(batch: &DeltaBatch) -> Vec<(Seq, DeltaOp, RowId)> {
        batch
            .deltas
            .iter()
            .map(|d| (d.seq(), d.op(), d.row_id()))
            .collect()
    }

    #[test]
    fn test_seq_strictly_increasing() {
        let mut log = DeltaLog::default();
        let a = log.append_insert(0, vec![Value::Integer(1)]);
        let b = log.append_update(0, vec![(0, Value::Integer(2))]);
        let c = log.append_remove(0);
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(log.head(), 3);
    }

    #[test]
    fn test_no_retention_without_cursors() {
        let mut log = DeltaLog::default();
        log.append_insert(0, vec![Value::Integer(1)]);
        assert_eq!(log.retained(), 0);
    }

    #[test]
    fn test_cursor_sees_only_later_deltas() {
        let mut log = DeltaLog::default();
        log.append_insert(0, vec![Value::Integer(1)]);
        let cursor = log.open_cursor();
        log.append_insert(1, vec![Value::Integer(2)]);

        let batch = log.pull(cursor).unwrap();
        assert_eq!(ops(&batch), vec![(2, DeltaOp::Insert, 1)]);
        assert_eq!((batch.first_seq, batch.last_seq), (2, 2));
    }

    #[test]
    fn test_pull_is_at_least_once_until_ack() {
        let mut log = DeltaLog::default();
        let cursor = log.open_cursor();
        log.append_insert(0, vec![Value::Integer(1)]);
        log.append_insert(1, vec![Value::Integer(2)]);

        assert_eq!(log.pull(cursor).unwrap().len(), 2);
        assert_eq!(log.pull(cursor).unwrap().len(), 2);

        assert!(log.ack(cursor, 1));
        let batch = log.pull(cursor).unwrap();
        assert_eq!(ops(&batch), vec![(2, DeltaOp::Insert, 1)]);
        assert_eq!(log.retained(), 1);

        log.ack(cursor, 2);
        assert!(log.pull(cursor).unwrap().is_empty());
        assert_eq!(log.retained(), 0);
    }

    #[test]
    fn test_slowest_cursor_holds_entries() {
        let mut log = DeltaLog::default();
        let fast = log.open_cursor();
        let slow = log.open_cursor();
        for i in 0..4 {
            log.append_insert(i, vec![Value::Integer(i as i64)]);
        }
        log.ack(fast, 4);
        assert_eq!(log.retained(), 4);
        assert_eq!(log.lag(slow), Some(4));

        log.ack(slow, 2);
        assert_eq!(log.retained(), 2);

        log.close_cursor(slow);
        assert_eq!(log.retained(), 0);
    }

    #[test]
    fn test_ack_never_moves_backwards() {
        let mut log = DeltaLog::default();
        let cursor = log.open_cursor();
        log.append_insert(0, vec![Value::Integer(1)]);
        log.append_insert(1, vec![Value::Integer(1)]);
        log.ack(cursor, 2);
        log.ack(cursor, 1);
        assert_eq!(log.checkpoint(cursor), Some(2));
        log.ack(cursor, 99);
        assert_eq!(log.checkpoint(cursor), Some(2));
    }

    #[test]
    fn test_unknown_cursor() {
        let mut log = DeltaLog::default();
        assert!(log.pull(42).is_none());
        assert!(!log.ack(42, 1));
        assert!(!log.close_cursor(42));
    }

    #[test]
    fn test_coalesce_when_lagging() {
        let mut log = DeltaLog::new(2);
        let cursor = log.open_cursor();
        log.append_insert(0, vec![Value::Integer(0), Value::Integer(0)]);
        log.append_update(0, vec![(0, Value::Integer(1))]);
        log.append_insert(1, vec![Value::Integer(5), Value::Integer(5)]);
        log.append_update(0, vec![(1, Value::Integer(2))]);
        log.append_update(1, vec![(0, Value::Integer(6))]);

        let batch = log.pull(cursor).unwrap();
        assert_eq!(batch.coalesced, 1);
        assert_eq!(
            ops(&batch),
            vec![
                (1, DeltaOp::Insert, 0),
                (3, DeltaOp::Insert, 1),
                (4, DeltaOp::Update, 0),
                (5, DeltaOp::Update, 1),
            ]
        );
        let merged = &batch.deltas[2];
        assert_eq!(merged.get(0), Some(&Value::Integer(1)));
        assert_eq!(merged.get(1), Some(&Value::Integer(2)));
        assert_eq!(batch.last_seq, 5);
    }

    #[test]
    fn test_coalesce_keeps_insert_and_remove() {
        let deltas = vec![
            Arc::new(Delta::update(1, 0, vec![(0, Value::Integer(1))])),
            Arc::new(Delta::remove(2, 0)),
            Arc::new(Delta::insert(3, 0, vec![Value::Integer(3)])),
            Arc::new(Delta::update(4, 0, vec![(0, Value::Integer(4))])),
            Arc::new(Delta::update(5, 0, vec![(0, Value::Integer(5))])),
        ];
        let out = coalesce(deltas);
        let seqs: Vec<Seq> = out.iter().map(|d| d.seq()).collect();
        assert_eq!(seqs, vec![1, 2, 3, 5]);
        assert_eq!(out[3].get(0), Some(&Value::Integer(5)));
    }

    #[test]
    fn test_no_coalesce_under_threshold() {
        let mut log = DeltaLog::new(10);
        let cursor = log.open_cursor();
        log.append_update(0, vec![(0, Value::Integer(1))]);
        log.append_update(0, vec![(0, Value::Integer(2))]);
        let batch = log.pull(cursor).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.coalesced, 0);
    }
}
