//! Row predicates.

use vista_core::Value;

use crate::config::{FilterOp, ResolvedFilter};

impl ResolvedFilter {
    /// Evaluates this filter against a full table row.
    ///
    /// Comparisons against a null cell are false; only `is null` matches it.
    pub fn matches(&self, row: &[Value]) -> bool {
        let cell = &row[self.column];
        match self.op {
            FilterOp::IsNull => cell.is_null(),
            FilterOp::IsNotNull => !cell.is_null(),
            _ if cell.is_null() => false,
            FilterOp::Eq => *cell == self.value,
            FilterOp::NotEq => *cell != self.value,
            FilterOp::Lt => *cell < self.value,
            FilterOp::LtEq => *cell <= self.value,
            FilterOp::Gt => *cell > self.value,
            FilterOp::GtEq => *cell >= self.value,
            FilterOp::Contains => match (cell.as_str(), self.value.as_str()) {
                (Some(s), Some(needle)) => s.contains(needle),
                _ => false,
            },
            FilterOp::BeginsWith => match (cell.as_str(), self.value.as_str()) {
                (Some(s), Some(prefix)) => s.starts_with(prefix),
                _ => false,
            },
            FilterOp::In => self.values.contains(cell),
        }
    }
}

/// Returns true if `row` passes every filter.
pub fn passes(filters: &[ResolvedFilter], row: &[Value]) -> bool {
    filters.iter().all(|f| f.matches(row))
}
