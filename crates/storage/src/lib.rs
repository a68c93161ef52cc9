//! Vista Storage - typed tables that record every change.
//!
//! This crate provides:
//!
//! - `Table`: a schema-checked row collection with an optional unique index
//!   column, copy-on-write snapshots and a delta log
//! - `TableListener`: the seam through which views learn about new deltas
//! - `TableOptions`: index column and coalescing threshold
//! - Schema inference for record- and column-oriented input
//!
//! # Example
//!
//! ```rust
//! use vista_core::{Record, Value};
//! use vista_storage::{Table, TableOptions};
//!
//! let table = Table::from_records(
//!     vec![
//!         Record::new().with("a", "x").with("b", 1i64),
//!         Record::new().with("a", "y").with("b", 5i64),
//!     ],
//!     TableOptions::new().index("a"),
//! )
//! .unwrap();
//!
//! table.update("x", Record::new().with("b", 3i64)).unwrap();
//! let snapshot = table.snapshot().unwrap();
//! assert_eq!(snapshot.row(0).unwrap().values()[1], Value::Integer(3));
//! assert_eq!(snapshot.seq(), 3);
//! ```

pub mod column_store;
pub mod infer;
pub mod options;
pub mod table;

pub use column_store::ColumnStore;
pub use infer::{columns_to_records, infer_columns, infer_records, Columns};
pub use options::TableOptions;
pub use table::{Attachment, RowKey, Table, TableId, TableListener, TableSnapshot};
