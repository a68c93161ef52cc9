//! Tables: typed, mutable row collections that record every change.
//!
//! A `Table` owns a copy-on-write [`ColumnStore`] and a [`DeltaLog`].
//! Mutations validate their whole input before touching anything, then apply
//! under the table's write lock and append one delta per affected row.
//! Listeners are woken after the lock is released.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use hashbrown::{HashMap, HashSet};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use vista_core::{CellMismatch, ColumnId, Error, Record, Result, Row, RowId, Schema, Value};
use vista_incremental::{CursorId, DeltaBatch, DeltaLog, Seq};

use crate::column_store::ColumnStore;
use crate::infer::{columns_to_records, infer_columns, infer_records, Columns};
use crate::options::TableOptions;

/// Process-unique table identifier.
pub type TableId = u64;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Addresses one row, either by row id or by index value.
#[derive(Clone, Debug, PartialEq)]
pub enum RowKey {
    Id(RowId),
    Index(Value),
}

impl From<RowId> for RowKey {
    fn from(id: RowId) -> Self {
        RowKey::Id(id)
    }
}

impl From<Value> for RowKey {
    fn from(value: Value) -> Self {
        RowKey::Index(value)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        RowKey::Index(Value::from(value))
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Id(id) => write!(f, "#{id}"),
            RowKey::Index(value) => write!(f, "{value}"),
        }
    }
}

/// Receives change notifications from a table.
///
/// Callbacks run on the mutating thread after the table lock is released;
/// implementations should hand work off rather than block.
pub trait TableListener: Send + Sync {
    /// New deltas up to `seq` are available.
    fn on_append(&self, table: TableId, seq: Seq);

    /// The table was released; no further deltas will arrive.
    fn on_release(&self, table: TableId);
}

/// A consistent, immutable view of a table's rows at one seq.
#[derive(Clone, Debug)]
pub struct TableSnapshot {
    store: Arc<ColumnStore>,
    seq: Seq,
}

impl TableSnapshot {
    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        self.store.schema()
    }

    /// Seq of the last delta reflected in this snapshot.
    #[inline]
    pub fn seq(&self) -> Seq {
        self.seq
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn row(&self, id: RowId) -> Option<Row> {
        self.store.get(id)
    }

    /// Rows in ascending row-id order.
    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        self.store.scan()
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.store.records()
    }

    pub fn to_columns(&self) -> Columns {
        self.schema()
            .names()
            .enumerate()
            .map(|(i, name)| (name.to_string(), self.store.column(i)))
            .collect()
    }
}

/// A new subscriber's cursor together with the rows it starts from.
#[derive(Debug)]
pub struct Attachment {
    pub cursor: CursorId,
    pub snapshot: TableSnapshot,
}

struct TableState {
    store: Arc<ColumnStore>,
    log: DeltaLog,
    next_row_id: RowId,
    listeners: HashMap<CursorId, Weak<dyn TableListener>>,
    released: bool,
}

impl TableState {
    /// Collects the listeners to wake, pruning dropped ones.
    fn wake(&mut self) -> Wake {
        let mut listeners = Vec::with_capacity(self.listeners.len());
        self.listeners.retain(|_, weak| match weak.upgrade() {
            Some(listener) => {
                listeners.push(listener);
                true
            }
            None => false,
        });
        Wake {
            listeners,
            seq: self.log.head(),
        }
    }
}

#[must_use]
struct Wake {
    listeners: Vec<Arc<dyn TableListener>>,
    seq: Seq,
}

impl Wake {
    fn fire(self, table: TableId) {
        for listener in self.listeners {
            listener.on_append(table, self.seq);
        }
    }
}

/// A mutable table.
pub struct Table {
    id: TableId,
    schema: Arc<Schema>,
    index: Option<(ColumnId, String)>,
    state: RwLock<TableState>,
}

impl Table {
    /// Creates an empty table.
    pub fn new(schema: Schema, options: TableOptions) -> Result<Self> {
        if schema.is_empty() {
            return Err(Error::schema("a table needs at least one column"));
        }
        let index = match &options.index {
            Some(name) => {
                let id = schema
                    .index_of(name)
                    .ok_or_else(|| Error::schema(format!("index column not in schema: {name}")))?;
                Some((id, name.clone()))
            }
            None => None,
        };
        let index_col = index.as_ref().map(|(col, _)| *col);
        let schema = Arc::new(schema);
        let id = NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "table {} created with {} columns, index {:?}",
            id,
            schema.len(),
            options.index
        );
        Ok(Self {
            id,
            index,
            state: RwLock::new(TableState {
                store: Arc::new(ColumnStore::new(Arc::clone(&schema), index_col)),
                log: DeltaLog::new(options.coalesce_after),
                next_row_id: 0,
                listeners: HashMap::new(),
                released: false,
            }),
            schema,
        })
    }

    /// Creates a table from records, inferring the schema.
    pub fn from_records(records: Vec<Record>, options: TableOptions) -> Result<Self> {
        let table = Self::new(infer_records(&records)?, options)?;
        table.insert(records)?;
        Ok(table)
    }

    /// Creates a table from named columns of equal length, inferring the
    /// schema.
    pub fn from_columns(columns: Columns, options: TableOptions) -> Result<Self> {
        let table = Self::new(infer_columns(&columns)?, options)?;
        table.insert(columns_to_records(columns))?;
        Ok(table)
    }

    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Name of the index column, if any.
    pub fn index(&self) -> Option<&str> {
        self.index.as_ref().map(|(_, name)| name.as_str())
    }

    /// Returns false once the table has been released.
    pub fn is_valid(&self) -> bool {
        !self.state.read().released
    }

    /// Number of live rows.
    pub fn size(&self) -> Result<usize> {
        Ok(self.read()?.store.len())
    }

    /// Seq of the last delta.
    pub fn seq(&self) -> Result<Seq> {
        Ok(self.read()?.log.head())
    }

    pub fn snapshot(&self) -> Result<TableSnapshot> {
        let state = self.read()?;
        Ok(TableSnapshot {
            store: Arc::clone(&state.store),
            seq: state.log.head(),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TableState>> {
        let state = self.state.read();
        if state.released {
            return Err(Error::not_found("table", self.id));
        }
        Ok(state)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TableState>> {
        let state = self.state.write();
        if state.released {
            return Err(Error::not_found("table", self.id));
        }
        Ok(state)
    }

    /// Appends rows. Either every record is inserted or none is.
    pub fn insert(&self, records: Vec<Record>) -> Result<Vec<RowId>> {
        let (ids, wake) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let rows = self.validate_rows(&records)?;

            if let Some((col, name)) = &self.index {
                let mut seen = HashSet::with_capacity(rows.len());
                for values in &rows {
                    let key = &values[*col];
                    if state.store.find(key).is_some() || !seen.insert(key) {
                        return Err(Error::duplicate_index(name.clone(), key.clone()));
                    }
                }
            }

            let store = Arc::make_mut(&mut state.store);
            let mut ids = Vec::with_capacity(rows.len());
            for values in rows {
                let id = state.next_row_id;
                state.next_row_id += 1;
                store.push(id, values.clone());
                state.log.append_insert(id, values);
                ids.push(id);
            }
            log::trace!("table {}: inserted {} rows", self.id, ids.len());
            (ids, state.wake())
        };
        wake.fire(self.id);
        Ok(ids)
    }

    /// Overwrites the given columns of one row.
    pub fn update(&self, key: impl Into<RowKey>, partial: Record) -> Result<()> {
        let key = key.into();
        let wake = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let id = self.resolve(&state.store, &key)?;
            let changes = self.validate_partial(0, &partial)?;
            self.check_index_change(&state.store, id, &changes)?;
            if changes.is_empty() {
                return Ok(());
            }
            Arc::make_mut(&mut state.store).set(id, &changes)?;
            state.log.append_update(id, changes);
            log::trace!("table {}: updated row {}", self.id, id);
            state.wake()
        };
        wake.fire(self.id);
        Ok(())
    }

    /// Removes one row. Its row id is never reused.
    pub fn remove(&self, key: impl Into<RowKey>) -> Result<()> {
        let key = key.into();
        let wake = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let id = self.resolve(&state.store, &key)?;
            Arc::make_mut(&mut state.store).remove(id)?;
            state.log.append_remove(id);
            log::trace!("table {}: removed row {}", self.id, id);
            state.wake()
        };
        wake.fire(self.id);
        Ok(())
    }

    /// Inserts records whose index value is new and updates the rows whose
    /// index value already exists. Requires an index column.
    pub fn upsert(&self, records: Vec<Record>) -> Result<Vec<RowId>> {
        let Some((index_col, index_name)) = self.index.clone() else {
            return Err(Error::schema("upsert requires an index column"));
        };

        enum Step {
            Insert(Vec<Value>),
            Update(RowId, Vec<(ColumnId, Value)>),
        }

        let (ids, wake) = {
            let mut guard = self.write()?;
            let state = &mut *guard;

            let mut cells = Vec::new();
            let mut steps = Vec::with_capacity(records.len());
            let mut ids = Vec::with_capacity(records.len());
            let mut pending: HashMap<Value, RowId> = HashMap::new();
            let mut next_row_id = state.next_row_id;
            for (row, record) in records.iter().enumerate() {
                let changes = self.check_partial(row, record, &mut cells)?;
                let Some(key) = changes
                    .iter()
                    .find(|(col, _)| *col == index_col)
                    .map(|(_, v)| v.clone())
                else {
                    if record.get(&index_name).is_some() {
                        // Index cell failed type validation and is in `cells`.
                        continue;
                    }
                    return Err(Error::schema(format!(
                        "row {row}: upsert needs a value for index column {index_name}"
                    )));
                };
                if key.is_null() {
                    return Err(null_index(row, &index_name));
                }
                let existing = state.store.find(&key).or_else(|| pending.get(&key).copied());
                match existing {
                    Some(id) => {
                        let changes = changes.into_iter().filter(|(c, _)| *c != index_col).collect();
                        steps.push(Step::Update(id, changes));
                        ids.push(id);
                    }
                    None => {
                        let mut values = vec![Value::Null; self.schema.len()];
                        for (col, value) in changes {
                            values[col] = value;
                        }
                        pending.insert(key, next_row_id);
                        steps.push(Step::Insert(values));
                        ids.push(next_row_id);
                        next_row_id += 1;
                    }
                }
            }
            if !cells.is_empty() {
                return Err(Error::type_mismatch(cells));
            }

            let store = Arc::make_mut(&mut state.store);
            for step in steps {
                match step {
                    Step::Insert(values) => {
                        let id = state.next_row_id;
                        state.next_row_id += 1;
                        store.push(id, values.clone());
                        state.log.append_insert(id, values);
                    }
                    Step::Update(_, changes) if changes.is_empty() => {}
                    Step::Update(id, changes) => {
                        store.set(id, &changes)?;
                        state.log.append_update(id, changes);
                    }
                }
            }
            log::trace!("table {}: upserted {} rows", self.id, ids.len());
            (ids, state.wake())
        };
        wake.fire(self.id);
        Ok(ids)
    }

    /// Removes every row, one remove delta each.
    pub fn clear(&self) -> Result<usize> {
        let (removed, wake) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let ids: Vec<RowId> = state.store.row_ids().collect();
            if ids.is_empty() {
                return Ok(0);
            }
            Arc::make_mut(&mut state.store).clear();
            for id in &ids {
                state.log.append_remove(*id);
            }
            log::trace!("table {}: cleared {} rows", self.id, ids.len());
            (ids.len(), state.wake())
        };
        wake.fire(self.id);
        Ok(removed)
    }

    /// Releases the table: every later call fails with `NotFound` and
    /// listeners are told to detach. Releasing twice is a no-op.
    pub fn release(&self) {
        let listeners: Vec<Arc<dyn TableListener>> = {
            let mut state = self.state.write();
            if state.released {
                return;
            }
            state.released = true;
            state.log.close();
            state.store = Arc::new(ColumnStore::new(
                Arc::clone(&self.schema),
                self.index.as_ref().map(|(col, _)| *col),
            ));
            state
                .listeners
                .drain()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };
        log::debug!(
            "table {} released, notifying {} listeners",
            self.id,
            listeners.len()
        );
        for listener in listeners {
            listener.on_release(self.id);
        }
    }

    /// Registers a listener and opens its cursor. The returned snapshot is
    /// exactly the state the cursor starts after.
    pub fn attach(&self, listener: &Arc<dyn TableListener>) -> Result<Attachment> {
        let mut state = self.write()?;
        let cursor = state.log.open_cursor();
        state.listeners.insert(cursor, Arc::downgrade(listener));
        log::debug!("table {}: cursor {} attached", self.id, cursor);
        Ok(Attachment {
            cursor,
            snapshot: TableSnapshot {
                store: Arc::clone(&state.store),
                seq: state.log.head(),
            },
        })
    }

    /// Closes a cursor. Detaching from a released table is a no-op.
    pub fn detach(&self, cursor: CursorId) {
        let mut state = self.state.write();
        state.listeners.remove(&cursor);
        if state.log.close_cursor(cursor) {
            log::debug!("table {}: cursor {} detached", self.id, cursor);
        }
    }

    /// Returns every delta the cursor has not acknowledged.
    pub fn pull(&self, cursor: CursorId) -> Result<DeltaBatch> {
        self.read()?
            .log
            .pull(cursor)
            .ok_or_else(|| Error::not_found("cursor", cursor))
    }

    /// Acknowledges every delta up to `seq`.
    pub fn ack(&self, cursor: CursorId, seq: Seq) -> Result<()> {
        if self.write()?.log.ack(cursor, seq) {
            Ok(())
        } else {
            Err(Error::not_found("cursor", cursor))
        }
    }

    /// Number of deltas the cursor has not acknowledged.
    pub fn lag(&self, cursor: CursorId) -> Result<usize> {
        self.read()?
            .log
            .lag(cursor)
            .ok_or_else(|| Error::not_found("cursor", cursor))
    }

    fn resolve(&self, store: &ColumnStore, key: &RowKey) -> Result<RowId> {
        match key {
            RowKey::Id(id) if store.contains(*id) => Ok(*id),
            RowKey::Index(value) => {
                let (col, _) = self
                    .index
                    .as_ref()
                    .ok_or_else(|| Error::schema("table has no index column"))?;
                value
                    .clone()
                    .coerce_to(self.schema.data_type(*col))
                    .and_then(|v| store.find(&v))
                    .ok_or_else(|| Error::not_found("row", key))
            }
            RowKey::Id(_) => Err(Error::not_found("row", key)),
        }
    }

    /// Validates full rows for insertion; absent columns are null.
    fn validate_rows(&self, records: &[Record]) -> Result<Vec<Vec<Value>>> {
        let mut cells = Vec::new();
        let mut rows = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            let mut values = vec![Value::Null; self.schema.len()];
            for (col, value) in self.check_partial(row, record, &mut cells)? {
                values[col] = value;
            }
            if let Some((col, name)) = &self.index {
                if values[*col].is_null() {
                    return Err(null_index(row, name));
                }
            }
            rows.push(values);
        }
        if !cells.is_empty() {
            return Err(Error::type_mismatch(cells));
        }
        Ok(rows)
    }

    fn validate_partial(&self, row: usize, record: &Record) -> Result<Vec<(ColumnId, Value)>> {
        let mut cells = Vec::new();
        let changes = self.check_partial(row, record, &mut cells)?;
        if !cells.is_empty() {
            return Err(Error::type_mismatch(cells));
        }
        Ok(changes)
    }

    /// Resolves and coerces one record's cells, collecting type mismatches
    /// into `cells`. Unknown columns fail immediately.
    fn check_partial(
        &self,
        row: usize,
        record: &Record,
        cells: &mut Vec<CellMismatch>,
    ) -> Result<Vec<(ColumnId, Value)>> {
        let mut changes = Vec::with_capacity(record.len());
        for (name, value) in record.iter() {
            let col = self
                .schema
                .index_of(name)
                .ok_or_else(|| Error::schema(format!("row {row}: unknown column {name}")))?;
            let expected = self.schema.data_type(col);
            match value.clone().coerce_to(expected) {
                Some(v) => changes.push((col, v)),
                None => cells.push(CellMismatch {
                    row,
                    column: name.to_string(),
                    expected,
                    got: value.data_type(),
                }),
            }
        }
        Ok(changes)
    }

    fn check_index_change(
        &self,
        store: &ColumnStore,
        id: RowId,
        changes: &[(ColumnId, Value)],
    ) -> Result<()> {
        let Some((col, name)) = &self.index else {
            return Ok(());
        };
        for (c, value) in changes {
            if c != col {
                continue;
            }
            if value.is_null() {
                return Err(null_index(0, name));
            }
            if store.find(value).is_some_and(|other| other != id) {
                return Err(Error::duplicate_index(name.clone(), value.clone()));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("columns", &self.schema.len())
            .field("index", &self.index())
            .finish()
    }
}

fn null_index(row: usize, column: &str) -> Error {
    Error::schema(format!("row {row}: index column {column} must not be null"))
}
