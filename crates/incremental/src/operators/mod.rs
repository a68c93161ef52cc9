//! Incremental operators for view maintenance.
//!
//! - Filter: row predicates deciding group membership
//! - Aggregate: per-group aggregate states updated by weighted contributions

mod aggregate;
mod filter;

pub use aggregate::{
    AggregateState, IncrementalAvg, IncrementalCount, IncrementalExtremum, IncrementalSum,
};
pub use filter::passes;
