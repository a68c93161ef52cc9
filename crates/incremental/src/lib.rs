//! Vista Incremental - delta propagation and incremental pivot maintenance.
//!
//! Tables record every mutation as a [`Delta`] in a [`DeltaLog`]. Views
//! consume the log through cursors and fold each delta into a
//! [`PivotState`], which maintains per-group aggregates without rescanning
//! the table.
//!
//! # Core Concepts
//!
//! - `Delta`: one row-level change (insert, update, remove) stamped with a
//!   per-table sequence number
//! - `DeltaLog`: ordered log with one cursor per subscriber, at-least-once
//!   delivery and update coalescing for lagging subscribers
//! - `ViewConfig`: serde-loadable pivot, aggregate, sort and filter settings
//! - `PivotState`: incrementally maintained group tree producing `ViewRow`s
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vista_core::{DataType, Schema, Value};
//! use vista_incremental::{Aggregate, Delta, PivotState, ViewConfig};
//!
//! let schema = Arc::new(
//!     Schema::new(vec![("a", DataType::String), ("b", DataType::Integer)]).unwrap(),
//! );
//! let config = ViewConfig::new().row_pivot("a").aggregate("b", Aggregate::Sum);
//! let mut state = PivotState::new(Arc::new(config.resolve(&schema).unwrap()), schema);
//!
//! state.apply(&Delta::insert(1, 0, vec![Value::from("x"), Value::Integer(1)]));
//! state.apply(&Delta::insert(2, 1, vec![Value::from("x"), Value::Integer(2)]));
//!
//! let rows = state.to_rows();
//! assert_eq!(rows[0].values, vec![Value::from("x"), Value::Integer(3)]);
//! ```

pub mod channel;
pub mod config;
pub mod delta;
pub mod materialize;
pub mod operators;

pub use channel::{coalesce, CursorId, DeltaLog, DEFAULT_COALESCE_AFTER};
pub use config::{
    Aggregate, Filter, FilterOp, OutputColumn, ResolvedConfig, ResolvedFilter, Sort, SortOrder,
    ViewConfig,
};
pub use delta::{Delta, DeltaBatch, DeltaOp, Seq};
pub use materialize::{GroupKey, PivotState, ViewRow};
pub use operators::{
    AggregateState, IncrementalAvg, IncrementalCount, IncrementalExtremum, IncrementalSum,
};
