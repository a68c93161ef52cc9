//! Vista Manager - hosts tables and views under string handles.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use vista_core::{Record, Value};
//! use vista_incremental::{Aggregate, ViewConfig};
//! use vista_manager::{Manager, ManagerConfig, TableInput};
//! use vista_storage::TableOptions;
//!
//! let manager = Manager::new(ManagerConfig::default()).unwrap();
//! let input = TableInput::from_json(
//!     r#"[{"a": "x", "b": 1}, {"a": "x", "b": 2}, {"a": "y", "b": 5}]"#,
//! )
//! .unwrap();
//! let table = manager.load(input, TableOptions::default()).unwrap();
//! let view = manager
//!     .create_view(
//!         &table,
//!         ViewConfig::new().row_pivot("a").aggregate("b", Aggregate::Sum),
//!         None,
//!     )
//!     .unwrap();
//!
//! manager
//!     .get_table(&table)
//!     .unwrap()
//!     .update(1, Record::new().with("b", 10i64))
//!     .unwrap();
//!
//! let view = manager.get_view(&view).unwrap();
//! view.wait_for(4, Duration::from_secs(5)).unwrap();
//! let rows = view.to_rows().unwrap();
//! assert_eq!(rows[0].values, vec![Value::from("x"), Value::Integer(11)]);
//! assert_eq!(rows[1].values, vec![Value::from("y"), Value::Integer(5)]);
//! ```

pub mod config;
pub mod handle;
pub mod input;
pub mod manager;

pub use config::ManagerConfig;
pub use handle::HandleStrategy;
pub use input::TableInput;
pub use manager::{Entry, Manager};
