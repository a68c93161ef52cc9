//! Materialized pivot state.
//!
//! `PivotState` mirrors the rows of one table and maintains, for every
//! prefix of every row's pivot tuple, a group holding per-column aggregate
//! states and the set of member row ids. A delta touches only the groups of
//! the affected row: its old contribution is retracted (deleting groups left
//! empty) and its new one is added (creating groups as needed).
//!
//! With column pivots every group also keeps one set of states per distinct
//! column pivot key, and the state counts the rows behind each key so the
//! split output columns appear and disappear with their rows.
//!
//! Output order is a pure function of the current rows and the config:
//! siblings are ordered by the configured sort, ties (and unsorted views) by the
//! smallest live member row id, which is the order groups are first seen
//! when scanning the table.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use hashbrown::HashMap;
use vista_core::{Row, RowId, Schema, Value};

use crate::config::{Aggregate, ResolvedConfig, SortOrder};
use crate::delta::{Delta, DeltaOp, Seq};
use crate::operators::{passes, AggregateState};

/// Group key: the pivot values of a group's path, outermost first. Column
/// pivot keys use the same shape.
pub type GroupKey = Vec<Value>;

/// One output row of a view.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewRow {
    /// Pivot values leading to this row; empty for the grand total.
    pub row_path: Vec<Value>,
    /// Pivot depth (`row_path.len()`); equal to the pivot count for leaves.
    pub depth: usize,
    /// Source row for flat views.
    pub row_id: Option<RowId>,
    /// Values aligned with the view's output columns.
    pub values: Vec<Value>,
}

struct Group {
    members: BTreeSet<RowId>,
    states: Vec<AggregateState>,
    /// States per column pivot key; empty for unsplit views.
    split: BTreeMap<GroupKey, Split>,
}

struct Split {
    rows: usize,
    states: Vec<AggregateState>,
}

impl Group {
    fn first_seen(&self) -> RowId {
        self.members.first().copied().unwrap_or(RowId::MAX)
    }
}

/// A group awaiting output, with its unsplit values for sorting.
struct Child<'a> {
    key: &'a GroupKey,
    group: &'a Group,
    summary: Vec<Value>,
}

/// Incrementally maintained pivot of one table.
pub struct PivotState {
    config: Arc<ResolvedConfig>,
    schema: Arc<Schema>,
    /// Mirror of every live table row, filtered or not.
    rows: HashMap<RowId, Vec<Value>>,
    /// Every group at depths 0..=pivots (pivoted views only).
    groups: HashMap<GroupKey, Group>,
    /// Rows passing the filters (flat views only).
    visible: BTreeSet<RowId>,
    /// Column pivot keys of the rows passing the filters, with row counts.
    column_keys: BTreeMap<GroupKey, usize>,
    applied_seq: Seq,
}

impl PivotState {
    /// Creates an empty state.
    pub fn new(config: Arc<ResolvedConfig>, schema: Arc<Schema>) -> Self {
        Self {
            config,
            schema,
            rows: HashMap::new(),
            groups: HashMap::new(),
            visible: BTreeSet::new(),
            column_keys: BTreeMap::new(),
            applied_seq: 0,
        }
    }

    /// Builds a state from scratch over `rows` as of `seq`.
    pub fn from_rows<I>(config: Arc<ResolvedConfig>, schema: Arc<Schema>, rows: I, seq: Seq) -> Self
    where
        I: IntoIterator<Item = Row>,
    {
        let mut state = Self::new(config, schema);
        for row in rows {
            let id = row.id();
            let values = row.into_values();
            state.contribute(id, &values, 1);
            state.rows.insert(id, values);
        }
        state.applied_seq = seq;
        state
    }

    #[inline]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Seq of the last applied delta.
    #[inline]
    pub fn applied_seq(&self) -> Seq {
        self.applied_seq
    }

    /// Number of mirrored table rows.
    #[inline]
    pub fn source_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of groups across all depths.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Column pivot keys currently present, ascending.
    pub fn column_keys(&self) -> Vec<GroupKey> {
        self.column_keys.keys().cloned().collect()
    }

    /// Output column names for the current rows.
    pub fn column_names(&self) -> Vec<String> {
        self.config.column_names(&self.column_keys())
    }

    /// Applies one delta. Deltas at or below the applied seq are skipped, so
    /// redelivered batches are harmless. Returns true if the delta was new.
    pub fn apply(&mut self, delta: &Delta) -> bool {
        if delta.seq() <= self.applied_seq {
            return false;
        }
        let width = self.schema.len();
        let id = delta.row_id();
        match delta.op() {
            DeltaOp::Insert => {
                if let Some(old) = self.rows.remove(&id) {
                    self.contribute(id, &old, -1);
                }
                let mut values = vec![Value::Null; width];
                for (col, value) in delta.changes() {
                    values[*col] = value.clone();
                }
                self.contribute(id, &values, 1);
                self.rows.insert(id, values);
            }
            DeltaOp::Update => {
                let old = self
                    .rows
                    .remove(&id)
                    .unwrap_or_else(|| vec![Value::Null; width]);
                let mut values = old.clone();
                for (col, value) in delta.changes() {
                    values[*col] = value.clone();
                }
                if delta.touches(&self.config.reads) {
                    self.contribute(id, &old, -1);
                    self.contribute(id, &values, 1);
                }
                self.rows.insert(id, values);
            }
            DeltaOp::Remove => {
                if let Some(old) = self.rows.remove(&id) {
                    self.contribute(id, &old, -1);
                }
            }
        }
        self.applied_seq = delta.seq();
        true
    }

    /// Adds (`diff = 1`) or retracts (`diff = -1`) one row's contribution.
    fn contribute(&mut self, id: RowId, row: &[Value], diff: i32) {
        if !passes(&self.config.filters, row) {
            return;
        }
        let config = Arc::clone(&self.config);
        let column_key: Option<GroupKey> = config
            .is_split()
            .then(|| config.column_pivots.iter().map(|&c| row[c].clone()).collect());
        if let Some(key) = &column_key {
            count_key(&mut self.column_keys, key, diff);
        }
        if !config.is_pivoted() {
            if diff > 0 {
                self.visible.insert(id);
            } else {
                self.visible.remove(&id);
            }
            return;
        }

        let schema = Arc::clone(&self.schema);
        let path: GroupKey = config.pivots.iter().map(|&c| row[c].clone()).collect();
        for depth in 0..=path.len() {
            let key = &path[..depth];
            if diff > 0 {
                let group = self.groups.entry_ref(key).or_insert_with(|| Group {
                    members: BTreeSet::new(),
                    states: new_states(&config, &schema),
                    split: BTreeMap::new(),
                });
                group.members.insert(id);
                fold(&mut group.states, &config, row, diff);
                if let Some(column_key) = &column_key {
                    let split = group.split.entry(column_key.clone()).or_insert_with(|| Split {
                        rows: 0,
                        states: new_states(&config, &schema),
                    });
                    split.rows += 1;
                    fold(&mut split.states, &config, row, diff);
                }
            } else {
                let emptied = match self.groups.get_mut(key) {
                    Some(group) => {
                        group.members.remove(&id);
                        fold(&mut group.states, &config, row, diff);
                        if let Some(column_key) = &column_key {
                            if let Some(split) = group.split.get_mut(column_key) {
                                split.rows = split.rows.saturating_sub(1);
                                fold(&mut split.states, &config, row, diff);
                                if split.rows == 0 {
                                    group.split.remove(column_key);
                                }
                            }
                        }
                        group.members.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    self.groups.remove(key);
                }
            }
        }
    }

    /// Returns the current output rows in display order, cut to the view's
    /// limit.
    pub fn to_rows(&self) -> Vec<ViewRow> {
        let mut rows = if self.config.is_pivoted() {
            self.pivoted_rows()
        } else {
            self.flat_rows()
        };
        if let Some(limit) = self.config.limit {
            rows.truncate(limit);
        }
        rows
    }

    fn flat_rows(&self) -> Vec<ViewRow> {
        let mut out: Vec<(RowId, Vec<Value>)> = self
            .visible
            .iter()
            .map(|id| {
                let row = &self.rows[id];
                (*id, self.config.outputs.iter().map(|o| row[o.source].clone()).collect())
            })
            .collect();
        if !self.config.sort.is_empty() {
            // Stable sort keeps row-id order for ties.
            out.sort_by(|a, b| compare_values(&self.config.sort, &a.1, &b.1));
        }
        if let Some(limit) = self.config.limit {
            out.truncate(limit);
        }
        out.into_iter()
            .map(|(id, values)| ViewRow {
                row_path: Vec::new(),
                depth: 0,
                row_id: Some(id),
                values: if self.config.is_split() {
                    self.spread(&self.rows[&id], values)
                } else {
                    values
                },
            })
            .collect()
    }

    /// Places a flat row's values under its own column pivot key; every
    /// other key's columns are null.
    fn spread(&self, row: &[Value], values: Vec<Value>) -> Vec<Value> {
        let own: GroupKey = self.config.column_pivots.iter().map(|&c| row[c].clone()).collect();
        let width = values.len();
        let mut out = Vec::with_capacity(width * self.column_keys.len());
        for key in self.column_keys.keys() {
            if *key == own {
                out.extend(values.iter().cloned());
            } else {
                out.extend(std::iter::repeat(Value::Null).take(width));
            }
        }
        out
    }

    fn pivoted_rows(&self) -> Vec<ViewRow> {
        let mut children: HashMap<&[Value], Vec<Child<'_>>> = HashMap::new();
        let mut root = None;
        for (key, group) in &self.groups {
            let child = Child {
                key,
                group,
                summary: self.summary(key, group),
            };
            if key.is_empty() {
                root = Some(child);
            } else {
                children.entry(&key[..key.len() - 1]).or_default().push(child);
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_by(|a, b| {
                compare_values(&self.config.sort, &a.summary, &b.summary)
                    .then(a.group.first_seen().cmp(&b.group.first_seen()))
            });
        }

        let mut out = Vec::with_capacity(self.groups.len());
        if let Some(root) = root {
            if self.config.rollups {
                out.push(self.group_row(root));
            }
            self.emit(&mut children, &[], &mut out);
        }
        out
    }

    fn emit<'a>(
        &self,
        children: &mut HashMap<&'a [Value], Vec<Child<'a>>>,
        parent: &[Value],
        out: &mut Vec<ViewRow>,
    ) {
        let Some(siblings) = children.remove(parent) else {
            return;
        };
        let levels = self.config.pivots.len();
        for child in siblings {
            if self.config.limit.is_some_and(|limit| out.len() >= limit) {
                return;
            }
            let key = child.key;
            if self.config.rollups || key.len() == levels {
                out.push(self.group_row(child));
            }
            self.emit(children, key, out);
        }
    }

    /// Group values in the unsplit layout: path, null padding, aggregates.
    fn summary(&self, key: &[Value], group: &Group) -> Vec<Value> {
        let mut values = self.path_values(key, self.config.outputs.len());
        values.extend(group.states.iter().map(AggregateState::get_value));
        values
    }

    fn path_values(&self, key: &[Value], capacity: usize) -> Vec<Value> {
        let levels = self.config.pivots.len();
        let mut values = Vec::with_capacity(capacity);
        values.extend(key.iter().cloned());
        values.extend(std::iter::repeat(Value::Null).take(levels - key.len()));
        values
    }

    fn group_row(&self, child: Child<'_>) -> ViewRow {
        let key = child.key;
        let values = if self.config.is_split() {
            let width = self.config.value_columns().len();
            let mut values = self.path_values(key, key.len() + width * self.column_keys.len());
            for column_key in self.column_keys.keys() {
                match child.group.split.get(column_key) {
                    Some(split) => {
                        values.extend(split.states.iter().map(AggregateState::get_value))
                    }
                    None => values.extend(std::iter::repeat(Value::Null).take(width)),
                }
            }
            values
        } else {
            child.summary
        };
        ViewRow {
            row_path: key.to_vec(),
            depth: key.len(),
            row_id: None,
            values,
        }
    }
}

fn new_states(config: &ResolvedConfig, schema: &Schema) -> Vec<AggregateState> {
    config
        .value_columns()
        .iter()
        .map(|o| {
            AggregateState::new(
                o.aggregate.unwrap_or(Aggregate::Count),
                schema.data_type(o.source),
            )
        })
        .collect()
}

fn fold(states: &mut [AggregateState], config: &ResolvedConfig, row: &[Value], diff: i32) {
    for (state, o) in states.iter_mut().zip(config.value_columns()) {
        state.apply(&row[o.source], diff);
    }
}

fn count_key(keys: &mut BTreeMap<GroupKey, usize>, key: &GroupKey, diff: i32) {
    if diff > 0 {
        *keys.entry(key.clone()).or_insert(0) += 1;
    } else if let Some(rows) = keys.get_mut(key) {
        *rows = rows.saturating_sub(1);
        if *rows == 0 {
            keys.remove(key);
        }
    }
}

fn compare_values(sort: &[(usize, SortOrder)], a: &[Value], b: &[Value]) -> Ordering {
    for &(position, order) in sort {
        let ord = a[position].cmp(&b[position]);
        let ord = match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Filter, FilterOp, ViewConfig};
    use vista_core::DataType;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(vec![
                ("a", DataType::String),
                ("b", DataType::Integer),
                ("c", DataType::String),
            ])
            .unwrap(),
        )
    }

    fn state(config: ViewConfig) -> PivotState {
        let schema = schema();
        let resolved = Arc::new(config.resolve(&schema).unwrap());
        PivotState::new(resolved, schema)
    }

    fn insert(seq: Seq, id: RowId, a: &str, b: i64, c: &str) -> Delta {
        Delta::insert(seq, id, vec![Value::from(a), Value::Integer(b), Value::from(c)])
    }

    fn values(rows: &[ViewRow]) -> Vec<Vec<Value>> {
        rows.iter().map(|r| r.values.clone()).collect()
    }

    #[test]
    fn test_pivot_sum_and_update() {
        let mut pivot = state(
            ViewConfig::new()
                .row_pivot("a")
                .columns(["b"])
                .aggregate("b", Aggregate::Sum),
        );
        pivot.apply(&insert(1, 0, "x", 1, "p"));
        pivot.apply(&insert(2, 1, "x", 2, "p"));
        pivot.apply(&insert(3, 2, "y", 5, "p"));
        assert_eq!(
            values(&pivot.to_rows()),
            vec![
                vec![Value::from("x"), Value::Integer(3)],
                vec![Value::from("y"), Value::Integer(5)],
            ]
        );

        pivot.apply(&Delta::update(4, 1, vec![(1, Value::Integer(10))]));
        assert_eq!(
            values(&pivot.to_rows()),
            vec![
                vec![Value::from("x"), Value::Integer(11)],
                vec![Value::from("y"), Value::Integer(5)],
            ]
        );
        assert_eq!(pivot.applied_seq(), 4);
    }

    #[test]
    fn test_row_moves_between_groups() {
        let mut pivot = state(ViewConfig::new().row_pivot("a").columns(["b"]));
        pivot.apply(&insert(1, 0, "x", 1, "p"));
        pivot.apply(&insert(2, 1, "y", 2, "p"));

        // The only "x" row moves to "z": "x" disappears, "z" is created.
        pivot.apply(&Delta::update(3, 0, vec![(0, Value::from("z"))]));
        let rows = pivot.to_rows();
        assert_eq!(
            values(&rows),
            vec![
                vec![Value::from("z"), Value::Integer(1)],
                vec![Value::from("y"), Value::Integer(2)],
            ]
        );
        // Root plus two leaves.
        assert_eq!(pivot.group_count(), 3);
    }

    #[test]
    fn test_remove_deletes_empty_group() {
        let mut pivot = state(ViewConfig::new().row_pivot("a").columns(["b"]));
        pivot.apply(&insert(1, 0, "x", 1, "p"));
        pivot.apply(&insert(2, 1, "y", 2, "p"));
        pivot.apply(&Delta::remove(3, 0));
        assert_eq!(values(&pivot.to_rows()), vec![vec![Value::from("y"), Value::Integer(2)]]);

        pivot.apply(&Delta::remove(4, 1));
        assert!(pivot.to_rows().is_empty());
        assert_eq!(pivot.group_count(), 0);
    }

    #[test]
    fn test_redelivered_delta_skipped() {
        let mut pivot = state(ViewConfig::new().row_pivot("a").columns(["b"]));
        let d = insert(1, 0, "x", 1, "p");
        assert!(pivot.apply(&d));
        assert!(!pivot.apply(&d));
        assert_eq!(values(&pivot.to_rows()), vec![vec![Value::from("x"), Value::Integer(1)]]);
    }

    #[test]
    fn test_rollups_in_tree_order() {
        let mut pivot = state(
            ViewConfig::new()
                .row_pivot("a")
                .row_pivot("c")
                .columns(["b"])
                .rollups(true),
        );
        pivot.apply(&insert(1, 0, "x", 1, "p"));
        pivot.apply(&insert(2, 1, "y", 2, "q"));
        pivot.apply(&insert(3, 2, "x", 4, "q"));

        let rows = pivot.to_rows();
        let summary: Vec<(usize, Vec<Value>)> =
            rows.iter().map(|r| (r.depth, r.values.clone())).collect();
        assert_eq!(
            summary,
            vec![
                (0, vec![Value::Null, Value::Null, Value::Integer(7)]),
                (1, vec![Value::from("x"), Value::Null, Value::Integer(5)]),
                (2, vec![Value::from("x"), Value::from("p"), Value::Integer(1)]),
                (2, vec![Value::from("x"), Value::from("q"), Value::Integer(4)]),
                (1, vec![Value::from("y"), Value::Null, Value::Integer(2)]),
                (2, vec![Value::from("y"), Value::from("q"), Value::Integer(2)]),
            ]
        );
    }

    #[test]
    fn test_leaves_follow_parent_sort() {
        let mut pivot = state(
            ViewConfig::new()
                .row_pivot("a")
                .row_pivot("c")
                .columns(["b"])
                .sort("b", SortOrder::Desc),
        );
        pivot.apply(&insert(1, 0, "x", 1, "p"));
        pivot.apply(&insert(2, 1, "y", 9, "q"));
        pivot.apply(&insert(3, 2, "x", 4, "q"));

        let paths: Vec<Vec<Value>> = pivot.to_rows().into_iter().map(|r| r.row_path).collect();
        assert_eq!(
            paths,
            vec![
                vec![Value::from("y"), Value::from("q")],
                vec![Value::from("x"), Value::from("q")],
                vec![Value::from("x"), Value::from("p")],
            ]
        );
    }

    #[test]
    fn test_first_seen_order_tracks_oldest_member() {
        let mut pivot = state(ViewConfig::new().row_pivot("a").columns(["b"]));
        pivot.apply(&insert(1, 0, "x", 1, "p"));
        pivot.apply(&insert(2, 1, "y", 1, "p"));
        pivot.apply(&insert(3, 2, "x", 1, "p"));
        pivot.apply(&Delta::remove(4, 0));

        let paths: Vec<Vec<Value>> = pivot.to_rows().into_iter().map(|r| r.row_path).collect();
        assert_eq!(paths, vec![vec![Value::from("y")], vec![Value::from("x")]]);
    }

    #[test]
    fn test_filter_membership_changes() {
        let mut pivot = state(
            ViewConfig::new()
                .row_pivot("a")
                .columns(["b"])
                .filter(Filter::new("b", FilterOp::Gt, 1i64)),
        );
        pivot.apply(&insert(1, 0, "x", 1, "p"));
        assert!(pivot.to_rows().is_empty());

        pivot.apply(&Delta::update(2, 0, vec![(1, Value::Integer(3))]));
        assert_eq!(values(&pivot.to_rows()), vec![vec![Value::from("x"), Value::Integer(3)]]);
    }

    #[test]
    fn test_flat_view_sorted() {
        let mut pivot = state(ViewConfig::new().columns(["a", "b"]).sort("b", SortOrder::Desc));
        pivot.apply(&insert(1, 0, "x", 1, "p"));
        pivot.apply(&insert(2, 1, "y", 3, "p"));
        pivot.apply(&insert(3, 2, "z", 2, "p"));

        let rows = pivot.to_rows();
        let ids: Vec<Option<RowId>> = rows.iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(0)]);
        assert_eq!(rows[0].values, vec![Value::from("y"), Value::Integer(3)]);
    }

    #[test]
    fn test_update_outside_reads_skips_groups() {
        let mut pivot = state(ViewConfig::new().row_pivot("a").columns(["b"]));
        pivot.apply(&insert(1, 0, "x", 1, "p"));
        pivot.apply(&Delta::update(2, 0, vec![(2, Value::from("q"))]));
        assert_eq!(values(&pivot.to_rows()), vec![vec![Value::from("x"), Value::Integer(1)]]);
        assert_eq!(pivot.applied_seq(), 2);
    }

    #[test]
    fn test_signed_zero_and_nan_share_groups() {
        let schema =
            Arc::new(Schema::new(vec![("k", DataType::Float), ("b", DataType::Integer)]).unwrap());
        let config = ViewConfig::new().row_pivot("k").columns(["b"]);
        let mut pivot = PivotState::new(Arc::new(config.resolve(&schema).unwrap()), schema);
        let other_nan = f64::from_bits(f64::NAN.to_bits() | 1);
        let rows = [(0.0, 1), (-0.0, 2), (f64::NAN, 4), (other_nan, 8)];
        for (i, (k, b)) in rows.into_iter().enumerate() {
            let seq = i as Seq + 1;
            pivot.apply(&Delta::insert(seq, i as RowId, vec![Value::Float(k), Value::Integer(b)]));
        }
        assert_eq!(
            values(&pivot.to_rows()),
            vec![
                vec![Value::Float(0.0), Value::Integer(3)],
                vec![Value::Float(f64::NAN), Value::Integer(12)],
            ]
        );
        // Root plus two leaves.
        assert_eq!(pivot.group_count(), 3);

        pivot.apply(&Delta::remove(5, 0));
        pivot.apply(&Delta::remove(6, 2));
        assert_eq!(pivot.group_count(), 3);
    }

    #[test]
    fn test_column_pivot_splits_values() {
        let mut pivot = state(
            ViewConfig::new()
                .row_pivot("a")
                .column_pivot("c")
                .columns(["b"])
                .rollups(true),
        );
        pivot.apply(&insert(1, 0, "x", 1, "q"));
        pivot.apply(&insert(2, 1, "x", 2, "p"));
        pivot.apply(&insert(3, 2, "y", 5, "q"));
        assert_eq!(pivot.column_names(), vec!["a", "p|b", "q|b"]);
        assert_eq!(
            values(&pivot.to_rows()),
            vec![
                vec![Value::Null, Value::Integer(2), Value::Integer(6)],
                vec![Value::from("x"), Value::Integer(2), Value::Integer(1)],
                vec![Value::from("y"), Value::Null, Value::Integer(5)],
            ]
        );

        // The only "p" row moves to "r": its columns follow.
        pivot.apply(&Delta::update(4, 1, vec![(2, Value::from("r"))]));
        assert_eq!(pivot.column_names(), vec!["a", "q|b", "r|b"]);
        assert_eq!(
            values(&pivot.to_rows())[1],
            vec![Value::from("x"), Value::Integer(1), Value::Integer(2)]
        );

        pivot.apply(&Delta::remove(5, 1));
        assert_eq!(pivot.column_keys(), vec![vec![Value::from("q")]]);
    }

    #[test]
    fn test_column_pivot_sorts_on_totals() {
        let mut pivot = state(
            ViewConfig::new()
                .row_pivot("a")
                .column_pivot("c")
                .columns(["b"])
                .sort("b", SortOrder::Desc),
        );
        pivot.apply(&insert(1, 0, "x", 4, "p"));
        pivot.apply(&insert(2, 1, "y", 3, "p"));
        pivot.apply(&insert(3, 2, "y", 3, "q"));
        let paths: Vec<Vec<Value>> = pivot.to_rows().into_iter().map(|r| r.row_path).collect();
        assert_eq!(paths, vec![vec![Value::from("y")], vec![Value::from("x")]]);
    }

    #[test]
    fn test_flat_column_pivot() {
        let mut pivot = state(ViewConfig::new().column_pivot("c").columns(["b"]));
        pivot.apply(&insert(1, 0, "x", 1, "q"));
        pivot.apply(&insert(2, 1, "y", 2, "p"));
        assert_eq!(pivot.column_names(), vec!["p|b", "q|b"]);
        assert_eq!(
            values(&pivot.to_rows()),
            vec![
                vec![Value::Null, Value::Integer(1)],
                vec![Value::Integer(2), Value::Null],
            ]
        );
    }

    #[test]
    fn test_limit_cuts_output() {
        let mut flat = state(ViewConfig::new().columns(["b"]).sort("b", SortOrder::Desc).limit(2));
        let mut pivot =
            state(ViewConfig::new().row_pivot("a").columns(["b"]).rollups(true).limit(2));
        for (seq, id, a, b) in [(1, 0, "x", 1), (2, 1, "y", 3), (3, 2, "z", 2)] {
            flat.apply(&insert(seq, id, a, b, "p"));
            pivot.apply(&insert(seq, id, a, b, "p"));
        }
        assert_eq!(
            values(&flat.to_rows()),
            vec![vec![Value::Integer(3)], vec![Value::Integer(2)]]
        );
        assert_eq!(
            values(&pivot.to_rows()),
            vec![
                vec![Value::Null, Value::Integer(6)],
                vec![Value::from("x"), Value::Integer(1)],
            ]
        );

        flat.apply(&Delta::remove(4, 1));
        assert_eq!(
            values(&flat.to_rows()),
            vec![vec![Value::Integer(2)], vec![Value::Integer(1)]]
        );
    }

    #[test]
    fn test_from_rows_matches_incremental() {
        let config = ViewConfig::new().row_pivot("a").columns(["b"]).rollups(true);
        let mut incremental = state(config.clone());
        incremental.apply(&insert(1, 0, "x", 1, "p"));
        incremental.apply(&insert(2, 1, "y", 2, "p"));
        incremental.apply(&insert(3, 2, "x", 3, "p"));
        incremental.apply(&Delta::update(4, 0, vec![(0, Value::from("y"))]));

        let schema = schema();
        let resolved = Arc::new(config.resolve(&schema).unwrap());
        let batch = PivotState::from_rows(
            resolved,
            schema,
            vec![
                Row::new(0, vec![Value::from("y"), Value::Integer(1), Value::from("p")]),
                Row::new(1, vec![Value::from("y"), Value::Integer(2), Value::from("p")]),
                Row::new(2, vec![Value::from("x"), Value::Integer(3), Value::from("p")]),
            ],
            4,
        );
        assert_eq!(incremental.to_rows(), batch.to_rows());
    }
}
