//! Manager - maps string handles to hosted tables and views.
//!
//! The manager owns the dispatcher shared by every view it creates. Handles
//! are unique among live entries; generated handles are unique for the
//! manager's lifetime.
//!
//! Removal is two-phase: the entry (and, for a table, every view over it) is
//! first invalidated so concurrent callers holding an `Arc` observe
//! `NotFound`, then the registry entries are reaped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use vista_core::{Error, Result};
use vista_incremental::ViewConfig;
use vista_reactive::{Dispatcher, View};
use vista_storage::{Table, TableOptions};

use crate::config::ManagerConfig;
use crate::handle::HandleGenerator;
use crate::input::TableInput;

/// A hosted table or view.
#[derive(Clone, Debug)]
pub enum Entry {
    Table(Arc<Table>),
    View(Arc<View>),
}

impl Entry {
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::Table(_) => "table",
            Entry::View(_) => "view",
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Entry::Table(table) => table.is_valid(),
            Entry::View(view) => view.is_valid(),
        }
    }

    fn same(&self, other: &Entry) -> bool {
        match (self, other) {
            (Entry::Table(a), Entry::Table(b)) => Arc::ptr_eq(a, b),
            (Entry::View(a), Entry::View(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn views_table(&self, table: &Arc<Table>) -> bool {
        matches!(self, Entry::View(view) if Arc::ptr_eq(view.table(), table))
    }
}

struct Registry {
    entries: HashMap<String, Entry>,
    handles: HandleGenerator,
}

impl Registry {
    /// Picks the handle for a new entry.
    fn assign(&mut self, handle: Option<&str>) -> Result<String> {
        let Registry { entries, handles } = self;
        match handle {
            Some(handle) => {
                if entries.get(handle).is_some_and(Entry::is_valid) {
                    return Err(Error::duplicate_handle(handle));
                }
                handles.reserve(handle);
                Ok(handle.to_string())
            }
            None => Ok(handles.next(|candidate| entries.contains_key(candidate))),
        }
    }

    fn handle_of(&self, entry: &Entry) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, e)| e.same(entry))
            .map(|(handle, _)| handle.as_str())
    }
}

/// Registry of hosted tables and views.
pub struct Manager {
    config: ManagerConfig,
    dispatcher: Arc<Dispatcher>,
    registry: RwLock<Registry>,
    running: AtomicBool,
}

impl Manager {
    /// Creates a manager and starts its dispatcher threads.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let dispatcher = Arc::new(Dispatcher::new(config.dispatcher.clone())?);
        let handles = HandleGenerator::new(config.handle_strategy.clone());
        Ok(Self {
            config,
            dispatcher,
            registry: RwLock::new(Registry {
                entries: HashMap::new(),
                handles,
            }),
            running: AtomicBool::new(true),
        })
    }

    #[inline]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The dispatcher views created by this manager run on.
    #[inline]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    fn check_running(&self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::config("manager is shut down"))
        }
    }

    /// Hosts `table` under `handle`, or under a generated handle when `None`.
    pub fn host_table(&self, handle: Option<&str>, table: Arc<Table>) -> Result<String> {
        self.check_running()?;
        if !table.is_valid() {
            return Err(Error::not_found("table", table.id()));
        }
        let mut registry = self.registry.write();
        let handle = registry.assign(handle)?;
        log::debug!("hosting table {} as {handle}", table.id());
        registry.entries.insert(handle.clone(), Entry::Table(table));
        Ok(handle)
    }

    /// Hosts `view` under `handle`. The view's table must be hosted here.
    pub fn host_view(&self, handle: Option<&str>, view: Arc<View>) -> Result<String> {
        self.check_running()?;
        if !view.is_valid() {
            return Err(Error::not_found("view", view.id()));
        }
        let mut registry = self.registry.write();
        let hosted = registry.entries.values().any(|entry| {
            matches!(entry, Entry::Table(table) if Arc::ptr_eq(table, view.table()) && table.is_valid())
        });
        if !hosted {
            return Err(Error::not_found("table", view.table().id()));
        }
        let handle = registry.assign(handle)?;
        log::debug!("hosting view {} as {handle}", view.id());
        registry.entries.insert(handle.clone(), Entry::View(view));
        Ok(handle)
    }

    /// Builds a table from `input` and hosts it under a generated handle.
    /// An `Existing` table that is already hosted keeps its handle.
    pub fn load(&self, input: TableInput, options: TableOptions) -> Result<String> {
        self.check_running()?;
        log::debug!("loading {input:?}");
        let table = input.into_table(options)?;
        if let Some(handle) = self
            .registry
            .read()
            .handle_of(&Entry::Table(Arc::clone(&table)))
        {
            return Ok(handle.to_string());
        }
        self.host_table(None, table)
    }

    /// Creates a view over the table hosted at `table` and hosts it.
    pub fn create_view(&self, table: &str, config: ViewConfig, handle: Option<&str>) -> Result<String> {
        self.check_running()?;
        let table = self.get_table(table)?;
        let view = View::new(table, config, Arc::clone(&self.dispatcher))?;
        self.host_view(handle, Arc::clone(&view)).map_err(|e| {
            view.delete();
            e
        })
    }

    pub fn get(&self, handle: &str) -> Result<Entry> {
        match self.registry.read().entries.get(handle) {
            Some(entry) if entry.is_valid() => Ok(entry.clone()),
            _ => Err(Error::not_found("handle", handle)),
        }
    }

    /// Returns the table at `handle`; `NotFound` if it is absent, removed, or
    /// names a view.
    pub fn get_table(&self, handle: &str) -> Result<Arc<Table>> {
        match self.registry.read().entries.get(handle) {
            Some(Entry::Table(table)) if table.is_valid() => Ok(Arc::clone(table)),
            _ => Err(Error::not_found("table", handle)),
        }
    }

    /// Returns the view at `handle`; `NotFound` if it is absent, removed, or
    /// names a table.
    pub fn get_view(&self, handle: &str) -> Result<Arc<View>> {
        match self.registry.read().entries.get(handle) {
            Some(Entry::View(view)) if view.is_valid() => Ok(Arc::clone(view)),
            _ => Err(Error::not_found("view", handle)),
        }
    }

    /// Removes the entry at `handle`. Removing a table releases it and drops
    /// every view over it. Returns false if nothing was hosted there.
    pub fn remove(&self, handle: &str) -> bool {
        let (target, views) = {
            let registry = self.registry.read();
            let Some(target) = registry.entries.get(handle).cloned() else {
                log::warn!("remove: no entry at {handle}");
                return false;
            };
            let views: Vec<Entry> = match &target {
                Entry::Table(table) => registry
                    .entries
                    .values()
                    .filter(|entry| entry.views_table(table))
                    .cloned()
                    .collect(),
                Entry::View(_) => Vec::new(),
            };
            (target, views)
        };

        // Invalidate first.
        match &target {
            Entry::Table(table) => {
                table.release();
                for entry in &views {
                    if let Entry::View(view) = entry {
                        view.delete();
                    }
                }
            }
            Entry::View(view) => view.delete(),
        }

        // Then reap. A view hosted over the table in between is caught by
        // the scan as well.
        let mut registry = self.registry.write();
        let before = registry.entries.len();
        registry.entries.retain(|_, entry| {
            let reap = entry.same(&target)
                || matches!(&target, Entry::Table(table) if entry.views_table(table));
            if reap {
                if let Entry::View(view) = entry {
                    view.delete();
                }
            }
            !reap
        });
        log::debug!(
            "removed {} {handle} ({} entries reaped)",
            target.kind(),
            before - registry.entries.len()
        );
        true
    }

    /// Live handles in sorted order.
    pub fn handles(&self) -> Vec<String> {
        let registry = self.registry.read();
        let mut handles: Vec<String> = registry
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_valid())
            .map(|(handle, _)| handle.clone())
            .collect();
        handles.sort();
        handles
    }

    /// Deletes every hosted view, unregisters everything and stops the
    /// dispatcher. Tables stay usable by callers that still hold them.
    /// Idempotent; also run on drop.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let entries: Vec<(String, Entry)> = self.registry.write().entries.drain().collect();
        for (_, entry) in &entries {
            if let Entry::View(view) = entry {
                view.delete();
            }
        }
        self.dispatcher.shutdown();
        log::debug!("manager shut down ({} entries dropped)", entries.len());
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("handles", &self.handles())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}
