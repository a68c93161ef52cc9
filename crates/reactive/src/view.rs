//! Views: incrementally maintained pivots over one table.
//!
//! A `View` attaches to its table as a [`TableListener`]. When the table
//! appends deltas the view queues itself on the dispatcher; a worker then
//! calls `catch_up`, which pulls, applies and acknowledges the pending deltas
//! under the view's write lock, so deltas apply strictly in seq order and
//! readers never see a half-applied batch. Notices for observers are queued
//! under that lock and handed to the dispatcher after it is released.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use vista_core::{Error, Record, Result, Value};
use vista_incremental::{CursorId, PivotState, ResolvedConfig, Seq, ViewConfig, ViewRow};
use vista_storage::{Columns, Table, TableId, TableListener};

use crate::dispatcher::{Dispatcher, Notice, Recompute};
use crate::subscription::{SubscriptionId, SubscriptionManager};
use crate::update::{ViewId, ViewUpdate};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

struct ViewState {
    pivot: PivotState,
    cursor: Option<CursorId>,
    /// Rebuilt lazily after a batch is applied.
    output: Option<Output>,
}

/// Output rows and the column names they align with.
#[derive(Clone)]
struct Output {
    columns: Arc<[String]>,
    rows: Arc<[ViewRow]>,
}

/// A live view over one table.
pub struct View {
    id: ViewId,
    me: Weak<View>,
    table: Arc<Table>,
    config: ViewConfig,
    resolved: Arc<ResolvedConfig>,
    dispatcher: Arc<Dispatcher>,
    state: RwLock<ViewState>,
    subscriptions: Arc<Mutex<SubscriptionManager>>,
    /// Notices in seq order, waiting to leave for the dispatcher.
    outbox: Mutex<VecDeque<Notice>>,
    draining: AtomicBool,
    alive: AtomicBool,
    scheduled: AtomicBool,
    applied: Mutex<Seq>,
    progress: Condvar,
}

impl View {
    /// Creates a view and computes its initial rows from a table snapshot.
    pub fn new(table: Arc<Table>, config: ViewConfig, dispatcher: Arc<Dispatcher>) -> Result<Arc<Self>> {
        if !table.is_valid() {
            return Err(Error::not_found("table", table.id()));
        }
        let resolved = Arc::new(config.resolve(table.schema())?);
        let schema = Arc::clone(table.schema());

        let view = Arc::new_cyclic(|me| View {
            id: NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed),
            me: me.clone(),
            table,
            config,
            resolved: Arc::clone(&resolved),
            dispatcher,
            state: RwLock::new(ViewState {
                pivot: PivotState::new(Arc::clone(&resolved), Arc::clone(&schema)),
                cursor: None,
                output: None,
            }),
            subscriptions: Arc::new(Mutex::new(SubscriptionManager::new())),
            outbox: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            scheduled: AtomicBool::new(false),
            applied: Mutex::new(0),
            progress: Condvar::new(),
        });

        // Hold the view lock across attach so a catch-up triggered by a
        // concurrent mutation waits for the initial state.
        {
            let mut state = view.state.write();
            let listener: Arc<dyn TableListener> = view.clone();
            let attachment = view.table.attach(&listener)?;
            let snapshot = attachment.snapshot;
            state.pivot = PivotState::from_rows(resolved, schema, snapshot.rows(), snapshot.seq());
            state.cursor = Some(attachment.cursor);
            *view.applied.lock() = snapshot.seq();
        }
        log::debug!(
            "view {} created on table {} ({} pivots, {} column pivots, {} columns)",
            view.id,
            view.table.id(),
            view.resolved.pivots.len(),
            view.resolved.column_pivots.len(),
            view.resolved.outputs.len()
        );
        Ok(view)
    }

    #[inline]
    pub fn id(&self) -> ViewId {
        self.id
    }

    #[inline]
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    #[inline]
    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Output column names, pivot columns first. Column pivots make the
    /// names follow the current rows.
    pub fn column_names(&self) -> Result<Vec<String>> {
        Ok(self.output()?.columns.to_vec())
    }

    /// Returns false once the view was deleted or its table released.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::not_found("view", self.id))
        }
    }

    /// Seq of the last table delta reflected in the output.
    pub fn applied_seq(&self) -> Seq {
        *self.applied.lock()
    }

    /// Current output rows. Never reflects a partially applied batch.
    pub fn to_rows(&self) -> Result<Arc<[ViewRow]>> {
        Ok(self.output()?.rows)
    }

    fn output(&self) -> Result<Output> {
        self.check()?;
        {
            let state = self.state.read();
            if let Some(output) = &state.output {
                return Ok(output.clone());
            }
        }
        let mut state = self.state.write();
        // Another reader may have rebuilt it while we waited.
        if let Some(output) = &state.output {
            return Ok(output.clone());
        }
        let output = Output {
            columns: state.pivot.column_names().into(),
            rows: state.pivot.to_rows().into(),
        };
        state.output = Some(output.clone());
        Ok(output)
    }

    pub fn num_rows(&self) -> Result<usize> {
        Ok(self.to_rows()?.len())
    }

    /// Output rows as name/value records.
    pub fn to_records(&self) -> Result<Vec<Record>> {
        let output = self.output()?;
        Ok(output
            .rows
            .iter()
            .map(|row| {
                output
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.values.iter().cloned())
                    .collect::<Record>()
            })
            .collect())
    }

    /// Output as one value vector per column.
    pub fn to_columns(&self) -> Result<Columns> {
        let output = self.output()?;
        Ok(output
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let values: Vec<Value> =
                    output.rows.iter().map(|row| row.values[i].clone()).collect();
                (name.clone(), values)
            })
            .collect())
    }

    /// Subscribes to updates. Callbacks run on the notifier thread.
    pub fn on_update<F>(&self, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&ViewUpdate) + Send + Sync + 'static,
    {
        self.check()?;
        Ok(self.subscriptions.lock().subscribe(callback))
    }

    /// Cancels a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.lock().unsubscribe(id)
    }

    /// Applies every pending delta on the calling thread. Returns the
    /// applied seq.
    pub fn flush(&self) -> Result<Seq> {
        self.check()?;
        self.catch_up()?;
        Ok(self.applied_seq())
    }

    /// Blocks until the view has applied `seq` or `timeout` elapses.
    pub fn wait_for(&self, seq: Seq, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut applied = self.applied.lock();
        while *applied < seq {
            self.check()?;
            if self.progress.wait_until(&mut applied, deadline).timed_out() && *applied < seq {
                return Err(Error::timeout(
                    format!("view {} reaching seq {} (at {})", self.id, seq, *applied),
                    timeout,
                ));
            }
        }
        Ok(())
    }

    /// Pulls, applies and acknowledges pending deltas. Returns how many
    /// deltas were new to the view.
    fn catch_up(&self) -> Result<usize> {
        let mut state = self.state.write();
        if !self.is_valid() {
            return Ok(0);
        }
        let Some(cursor) = state.cursor else {
            return Ok(0);
        };
        let batch = match self.table.pull(cursor) {
            Ok(batch) => batch,
            // Released mid-dispatch; `on_release` invalidates the view.
            Err(e) if e.is_not_found() => return Ok(0),
            Err(e) => return Err(e),
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let mut applied = 0;
        for delta in &batch.deltas {
            if state.pivot.apply(delta) {
                applied += 1;
            }
        }
        state.output = None;
        if let Err(e) = self.table.ack(cursor, batch.last_seq) {
            if !e.is_not_found() {
                return Err(e);
            }
        }
        log::trace!(
            "view {}: applied {} deltas ({}..={}, {} coalesced)",
            self.id,
            applied,
            batch.first_seq,
            batch.last_seq,
            batch.coalesced
        );

        // Queued under the view lock so notices keep seq order.
        if applied > 0 && !self.subscriptions.lock().is_empty() {
            let update =
                ViewUpdate::from_batch(self.id, &batch, self.table.schema(), &self.resolved.reads);
            if !update.is_empty() {
                self.outbox.lock().push_back(Notice {
                    update,
                    subscribers: Arc::clone(&self.subscriptions),
                });
            }
        }
        let seq = state.pivot.applied_seq();
        drop(state);

        *self.applied.lock() = seq;
        self.progress.notify_all();
        self.send_notices();
        Ok(applied)
    }

    /// Hands queued notices to the dispatcher. One thread drains at a time
    /// so notices leave in queue order; a callback that re-enters the view
    /// leaves its notices to the thread already draining.
    fn send_notices(&self) {
        while !self.draining.swap(true, Ordering::AcqRel) {
            loop {
                let next = self.outbox.lock().pop_front();
                let Some(notice) = next else {
                    break;
                };
                self.dispatcher.notify(notice);
            }
            self.draining.store(false, Ordering::Release);
            if self.outbox.lock().is_empty() {
                return;
            }
        }
    }

    /// Detaches from the table and drops every subscription. Later calls
    /// fail with `NotFound`. Deleting twice is a no-op.
    pub fn delete(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        let cursor = self.state.write().cursor.take();
        if let Some(cursor) = cursor {
            self.table.detach(cursor);
        }
        self.subscriptions.lock().clear();
        self.wake_waiters();
        log::debug!("view {} deleted", self.id);
    }

    fn wake_waiters(&self) {
        let _applied = self.applied.lock();
        self.progress.notify_all();
    }
}

impl TableListener for View {
    fn on_append(&self, _table: TableId, _seq: Seq) {
        if !self.is_valid() || self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let target: Weak<dyn Recompute> = self.me.clone();
        self.dispatcher.schedule(target);
    }

    fn on_release(&self, table: TableId) {
        if self.alive.swap(false, Ordering::AcqRel) {
            self.subscriptions.lock().clear();
            self.wake_waiters();
            log::debug!("view {} invalidated: table {} released", self.id, table);
        }
    }
}

impl Recompute for View {
    fn recompute(&self) {
        self.scheduled.store(false, Ordering::Release);
        if let Err(e) = self.catch_up() {
            log::warn!("view {}: catch-up failed: {}", self.id, e);
        }
    }
}

impl Drop for View {
    fn drop(&mut self) {
        if let Some(cursor) = self.state.get_mut().cursor.take() {
            self.table.detach(cursor);
        }
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("table", &self.table.id())
            .field("pivots", &self.resolved.pivots)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatcherConfig;
    use vista_core::{DataType, Schema};
    use vista_incremental::{Aggregate, SortOrder};
    use vista_storage::TableOptions;

    fn manual() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(DispatcherConfig::new().workers(0)).unwrap())
    }

    fn table() -> Arc<Table> {
        let schema = Schema::new(vec![("a", DataType::String), ("b", DataType::Integer)]).unwrap();
        let table = Table::new(schema, TableOptions::default()).unwrap();
        table
            .insert(vec![
                Record::new().with("a", "x").with("b", 1i64),
                Record::new().with("a", "x").with("b", 2i64),
                Record::new().with("a", "y").with("b", 5i64),
            ])
            .unwrap();
        Arc::new(table)
    }

    fn sums() -> ViewConfig {
        ViewConfig::new().row_pivot("a").aggregate("b", Aggregate::Sum)
    }

    #[test]
    fn test_initial_rows_from_snapshot() {
        let view = View::new(table(), sums(), manual()).unwrap();
        assert_eq!(view.column_names().unwrap(), vec!["a", "b"]);
        assert_eq!(view.applied_seq(), 3);
        assert_eq!(
            view.to_columns().unwrap(),
            vec![
                ("a".to_string(), vec![Value::from("x"), Value::from("y")]),
                ("b".to_string(), vec![Value::Integer(3), Value::Integer(5)]),
            ]
        );
    }

    #[test]
    fn test_flush_applies_pending_updates() {
        let table = table();
        let view = View::new(Arc::clone(&table), sums(), manual()).unwrap();
        let before = view.to_rows().unwrap();

        table.update(1, Record::new().with("b", 10i64)).unwrap();
        // Nothing applied until the view catches up.
        assert_eq!(view.to_rows().unwrap(), before);

        assert_eq!(view.flush().unwrap(), 4);
        let records = view.to_records().unwrap();
        assert_eq!(records[0], Record::new().with("a", "x").with("b", 11i64));
        assert_eq!(records[1], Record::new().with("a", "y").with("b", 5i64));
        // Snapshot taken earlier is unaffected.
        assert_eq!(before[0].values[1], Value::Integer(3));
    }

    #[test]
    fn test_bad_config_rejected() {
        let err = View::new(
            table(),
            ViewConfig::new().row_pivot("a").aggregate("a", Aggregate::Sum),
            manual(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = View::new(
            table(),
            ViewConfig::new().sort("zz", SortOrder::Asc),
            manual(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_released_table_invalidates_view() {
        let table = table();
        let view = View::new(Arc::clone(&table), sums(), manual()).unwrap();
        table.release();
        assert!(!view.is_valid());
        assert!(view.to_rows().unwrap_err().is_not_found());
        assert!(view.flush().unwrap_err().is_not_found());

        let err = View::new(table, sums(), manual()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_detaches_cursor() {
        let table = table();
        let view = View::new(Arc::clone(&table), sums(), manual()).unwrap();
        view.delete();
        view.delete();
        assert!(view.to_rows().unwrap_err().is_not_found());
        // Mutations no longer wake the deleted view.
        table.insert(vec![Record::new().with("a", "z").with("b", 1i64)]).unwrap();
        assert_eq!(view.applied_seq(), 3);
    }

    #[test]
    fn test_wait_for_times_out_without_workers() {
        let table = table();
        let view = View::new(Arc::clone(&table), sums(), manual()).unwrap();
        table.remove(0).unwrap();
        let err = view.wait_for(4, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));

        view.flush().unwrap();
        view.wait_for(4, Duration::from_millis(20)).unwrap();
    }

    #[test]
    fn test_inline_observer_reenters_view() {
        let dispatcher = manual();
        dispatcher.shutdown();
        let table = table();
        let view = View::new(Arc::clone(&table), sums(), dispatcher).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let weak = Arc::downgrade(&view);
        view.on_update(move |_| {
            if let Some(view) = weak.upgrade() {
                view.flush().unwrap();
                sink.lock().push(view.to_rows().unwrap()[0].values[1].clone());
            }
        })
        .unwrap();

        table.update(1, Record::new().with("b", 10i64)).unwrap();
        assert_eq!(view.flush().unwrap(), 4);
        table.update(0, Record::new().with("b", 0i64)).unwrap();
        assert_eq!(view.flush().unwrap(), 5);
        assert_eq!(*seen.lock(), vec![Value::Integer(11), Value::Integer(10)]);
    }

    #[test]
    fn test_cached_rows_served_to_concurrent_readers() {
        let view = View::new(table(), sums(), manual()).unwrap();
        let warm = view.to_rows().unwrap();

        let held = view.state.upgradable_read();
        let (tx, rx) = crossbeam_channel::unbounded();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let view = Arc::clone(&view);
                let tx = tx.clone();
                std::thread::spawn(move || {
                    let _ = tx.send(view.to_rows().unwrap());
                })
            })
            .collect();
        for _ in 0..4 {
            let rows = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(Arc::ptr_eq(&rows, &warm));
        }
        drop(held);
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_unread_column_updates_not_notified() {
        let dispatcher = manual();
        dispatcher.shutdown();
        let table = table();
        let view = View::new(
            Arc::clone(&table),
            ViewConfig::new().row_pivot("a").columns(["a"]),
            dispatcher,
        )
        .unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        view.on_update(move |update: &ViewUpdate| {
            let _ = tx.send(update.clone());
        })
        .unwrap();

        table.update(0, Record::new().with("b", 7i64)).unwrap();
        assert_eq!(view.flush().unwrap(), 4);
        assert!(rx.try_recv().is_err());

        table.update(0, Record::new().with("a", "z")).unwrap();
        table.update(1, Record::new().with("b", 8i64)).unwrap();
        assert_eq!(view.flush().unwrap(), 6);
        let update = rx.try_recv().unwrap();
        assert_eq!((update.first_seq, update.last_seq), (5, 6));
        assert_eq!(update.len(), 1);
        assert_eq!(update.changes[0].columns, vec![("a".to_string(), Value::from("z"))]);
    }

    #[test]
    fn test_column_pivot_names_follow_rows() {
        let table = table();
        let config = ViewConfig::new()
            .row_pivot("a")
            .column_pivot("b")
            .columns(["b"])
            .aggregate("b", Aggregate::Count)
            .limit(1);
        let view = View::new(Arc::clone(&table), config, manual()).unwrap();
        assert_eq!(view.column_names().unwrap(), vec!["a", "1|b", "2|b", "5|b"]);
        assert_eq!(
            view.to_records().unwrap(),
            vec![Record::new()
                .with("a", "x")
                .with("1|b", 1i64)
                .with("2|b", 1i64)
                .with("5|b", Value::Null)]
        );

        table.update(2, Record::new().with("b", 1i64)).unwrap();
        view.flush().unwrap();
        assert_eq!(view.column_names().unwrap(), vec!["a", "1|b", "2|b"]);
        assert_eq!(view.num_rows().unwrap(), 1);
    }

    #[test]
    fn test_workers_catch_up_and_notify() {
        let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::new().workers(2)).unwrap());
        let table = table();
        let view = View::new(Arc::clone(&table), sums(), Arc::clone(&dispatcher)).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        view.on_update(move |update: &ViewUpdate| {
            let _ = tx.send(update.clone());
        })
        .unwrap();

        table.update(1, Record::new().with("b", 10i64)).unwrap();
        view.wait_for(4, Duration::from_secs(5)).unwrap();
        assert_eq!(view.to_rows().unwrap()[0].values[1], Value::Integer(11));

        let update = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(update.view_id, view.id());
        assert_eq!(update.last_seq, 4);
        assert_eq!(update.changes[0].columns, vec![("b".to_string(), Value::Integer(10))]);

        dispatcher.shutdown();
    }
}
