//! Vista Core - Core types and schema definitions for Vista tables and views.
//!
//! This crate provides the foundational types shared by every other Vista crate:
//!
//! - `DataType`: Supported column types (Integer, Float, String, Boolean, Timestamp)
//! - `Value`: Runtime values that can be stored in a table cell
//! - `Row` / `Record`: Positional and named row forms
//! - `schema`: Ordered, typed column definitions
//! - `Error`: The error taxonomy for table, view and manager operations
//!
//! # Example
//!
//! ```rust
//! use vista_core::{DataType, Record, Value};
//! use vista_core::schema::Schema;
//!
//! let schema = Schema::builder()
//!     .add_column("a", DataType::String)
//!     .unwrap()
//!     .add_column("b", DataType::Integer)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let record = Record::new().with("a", "x").with("b", 1i64);
//!
//! assert_eq!(schema.index_of("b"), Some(1));
//! assert_eq!(record.get("b"), Some(&Value::Integer(1)));
//! ```

mod error;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{CellMismatch, Error, Result};
pub use row::{Record, Row, RowId};
pub use schema::{Column, ColumnId, Schema};
pub use types::DataType;
pub use value::Value;
