//! Vista Reactive - live views over tables.
//!
//! A [`View`] keeps a pivot of one table current. Mutations on the table
//! wake the view through the [`TableListener`](vista_storage::TableListener)
//! hook; the view queues itself on a shared [`Dispatcher`], whose workers
//! fold the new deltas in and hand the resulting [`ViewUpdate`]s to the
//! notifier thread for delivery to subscribers.
//!
//! # Core Concepts
//!
//! - `View`: incrementally maintained output rows plus subscriptions
//! - `Dispatcher`: recompute worker pool and notifier thread
//! - `SubscriptionManager`: callbacks registered on a view
//! - `ViewUpdate`: the row changes applied to a view in one batch
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vista_core::{Record, Value};
//! use vista_incremental::{Aggregate, ViewConfig};
//! use vista_reactive::{Dispatcher, DispatcherConfig, View};
//! use vista_storage::{Table, TableOptions};
//!
//! let table = Arc::new(
//!     Table::from_records(
//!         vec![
//!             Record::new().with("a", "x").with("b", 1i64),
//!             Record::new().with("a", "y").with("b", 5i64),
//!         ],
//!         TableOptions::default(),
//!     )
//!     .unwrap(),
//! );
//! let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::new().workers(0)).unwrap());
//! let view = View::new(
//!     Arc::clone(&table),
//!     ViewConfig::new().row_pivot("a").aggregate("b", Aggregate::Sum),
//!     dispatcher,
//! )
//! .unwrap();
//!
//! table.update(0, Record::new().with("b", 4i64)).unwrap();
//! view.flush().unwrap();
//! assert_eq!(view.to_rows().unwrap()[0].values[1], Value::Integer(4));
//! ```

pub mod dispatcher;
pub mod subscription;
pub mod update;
pub mod view;

pub use dispatcher::{Dispatcher, DispatcherConfig, Notice, Recompute};
pub use subscription::{Subscription, SubscriptionId, SubscriptionManager, UpdateCallback};
pub use update::{RowChange, ViewId, ViewUpdate};
pub use view::View;
