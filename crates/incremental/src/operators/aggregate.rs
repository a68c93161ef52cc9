//! Incremental aggregate operators.
//!
//! Each state absorbs weighted contributions (`+1` when a row enters a group,
//! `-1` when it leaves), so a group never needs rescanning: count updates in
//! O(1), sum and average in time bounded by the partials an exact float sum
//! keeps; min and max keep an ordered multiset and update in O(log n).

use std::collections::BTreeMap;

use vista_core::{DataType, Value};

use crate::config::Aggregate;

/// Incremental COUNT aggregate. Counts rows, nulls included.
#[derive(Clone, Debug, Default)]
pub struct IncrementalCount {
    count: i64,
}

impl IncrementalCount {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    pub fn apply(&mut self, diff: i32) {
        self.count += diff as i64;
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.count
    }
}

/// Incremental SUM aggregate. Nulls are skipped.
///
/// Integer columns accumulate exactly in `i128`. Finite floats accumulate
/// as exact non-overlapping partials, and infinities and NaNs are counted
/// apart, so retractions cancel without drift and the result is the
/// correctly rounded sum of the values still present.
#[derive(Clone, Debug)]
pub struct IncrementalSum {
    int_sum: i128,
    partials: Vec<f64>,
    pos_inf: i64,
    neg_inf: i64,
    nan: i64,
    is_float: bool,
}

impl IncrementalSum {
    pub fn new(data_type: DataType) -> Self {
        Self {
            int_sum: 0,
            partials: Vec::new(),
            pos_inf: 0,
            neg_inf: 0,
            nan: 0,
            is_float: data_type == DataType::Float,
        }
    }

    pub fn apply(&mut self, value: &Value, diff: i32) {
        match value {
            Value::Integer(v) => self.int_sum += *v as i128 * diff as i128,
            Value::Float(v) if v.is_nan() => self.nan += diff as i64,
            Value::Float(v) if *v == f64::INFINITY => self.pos_inf += diff as i64,
            Value::Float(v) if *v == f64::NEG_INFINITY => self.neg_inf += diff as i64,
            Value::Float(v) => {
                let signed = if diff < 0 { -*v } else { *v };
                for _ in 0..diff.unsigned_abs() {
                    add_partial(&mut self.partials, signed);
                }
            }
            _ => {}
        }
    }

    /// Returns the sum in the column's type.
    pub fn get(&self) -> Value {
        if !self.is_float {
            return Value::Integer(self.int_sum.clamp(i64::MIN as i128, i64::MAX as i128) as i64);
        }
        let sum = if self.nan > 0 || (self.pos_inf > 0 && self.neg_inf > 0) {
            f64::NAN
        } else if self.pos_inf > 0 {
            f64::INFINITY
        } else if self.neg_inf > 0 {
            f64::NEG_INFINITY
        } else {
            round_partials(&self.partials) + self.int_sum as f64
        };
        Value::Float(sum)
    }
}

/// Adds `x` to `partials`, keeping them non-overlapping and increasing in
/// magnitude so that their exact sum is the exact running total.
fn add_partial(partials: &mut Vec<f64>, mut x: f64) {
    let mut kept = 0;
    for j in 0..partials.len() {
        let mut y = partials[j];
        if x.abs() < y.abs() {
            std::mem::swap(&mut x, &mut y);
        }
        let hi = x + y;
        let lo = y - (hi - x);
        if lo != 0.0 {
            partials[kept] = lo;
            kept += 1;
        }
        x = hi;
    }
    partials.truncate(kept);
    partials.push(x);
}

/// Rounds the exact sum of `partials` to the nearest `f64`, ties to even.
fn round_partials(partials: &[f64]) -> f64 {
    let Some((&last, rest)) = partials.split_last() else {
        return 0.0;
    };
    let mut hi = last;
    let mut lo = 0.0;
    let mut n = rest.len();
    while n > 0 {
        n -= 1;
        let x = hi;
        let y = rest[n];
        hi = x + y;
        lo = y - (hi - x);
        if lo != 0.0 {
            break;
        }
    }
    // Halfway cases: the remaining partials decide the rounding direction.
    if n > 0 && ((lo < 0.0 && rest[n - 1] < 0.0) || (lo > 0.0 && rest[n - 1] > 0.0)) {
        let y = lo * 2.0;
        let x = hi + y;
        if y == x - hi {
            hi = x;
        }
    }
    hi
}

/// Incremental AVG aggregate over non-null values.
#[derive(Clone, Debug)]
pub struct IncrementalAvg {
    sum: IncrementalSum,
    count: i64,
}

impl IncrementalAvg {
    pub fn new(data_type: DataType) -> Self {
        Self {
            sum: IncrementalSum::new(data_type),
            count: 0,
        }
    }

    pub fn apply(&mut self, value: &Value, diff: i32) {
        if value.is_null() {
            return;
        }
        self.sum.apply(value, diff);
        self.count += diff as i64;
    }

    /// Returns the current average, or Null when no values contribute.
    pub fn get(&self) -> Value {
        if self.count == 0 {
            return Value::Null;
        }
        let total = self.sum.get().to_f64().unwrap_or(0.0);
        Value::Float(total / self.count as f64)
    }

    #[inline]
    pub fn count(&self) -> i64 {
        self.count
    }
}

/// Ordered multiset of non-null values, shared by MIN and MAX.
#[derive(Clone, Debug, Default)]
pub struct IncrementalExtremum {
    values: BTreeMap<Value, i32>,
}

impl IncrementalExtremum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, value: &Value, diff: i32) {
        if value.is_null() {
            return;
        }
        let entry = self.values.entry(value.clone()).or_insert(0);
        *entry += diff;
        if *entry <= 0 {
            self.values.remove(value);
        }
    }

    pub fn min(&self) -> Value {
        self.values.keys().next().cloned().unwrap_or(Value::Null)
    }

    pub fn max(&self) -> Value {
        self.values.keys().next_back().cloned().unwrap_or(Value::Null)
    }
}

/// State of one aggregate function within one group.
#[derive(Clone, Debug)]
pub enum AggregateState {
    Count(IncrementalCount),
    Sum(IncrementalSum),
    Avg(IncrementalAvg),
    Min(IncrementalExtremum),
    Max(IncrementalExtremum),
}

impl AggregateState {
    /// Creates an empty state for `aggregate` over a `data_type` column.
    pub fn new(aggregate: Aggregate, data_type: DataType) -> Self {
        match aggregate {
            Aggregate::Count => AggregateState::Count(IncrementalCount::new()),
            Aggregate::Sum => AggregateState::Sum(IncrementalSum::new(data_type)),
            Aggregate::Avg => AggregateState::Avg(IncrementalAvg::new(data_type)),
            Aggregate::Min => AggregateState::Min(IncrementalExtremum::new()),
            Aggregate::Max => AggregateState::Max(IncrementalExtremum::new()),
        }
    }

    /// Applies one weighted contribution.
    pub fn apply(&mut self, value: &Value, diff: i32) {
        match self {
            AggregateState::Count(s) => s.apply(diff),
            AggregateState::Sum(s) => s.apply(value, diff),
            AggregateState::Avg(s) => s.apply(value, diff),
            AggregateState::Min(s) | AggregateState::Max(s) => s.apply(value, diff),
        }
    }

    /// Returns the current aggregate value.
    pub fn get_value(&self) -> Value {
        match self {
            AggregateState::Count(s) => Value::Integer(s.get()),
            AggregateState::Sum(s) => s.get(),
            AggregateState::Avg(s) => s.get(),
            AggregateState::Min(s) => s.min(),
            AggregateState::Max(s) => s.max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_count() {
        let mut count = AggregateState::new(Aggregate::Count, DataType::String);
        count.apply(&Value::from("x"), 1);
        count.apply(&Value::Null, 1);
        assert_eq!(count.get_value(), Value::Integer(2));
        count.apply(&Value::from("x"), -1);
        assert_eq!(count.get_value(), Value::Integer(1));
    }

    #[test]
    fn test_incremental_sum_integer() {
        let mut sum = AggregateState::new(Aggregate::Sum, DataType::Integer);
        sum.apply(&Value::Integer(10), 1);
        sum.apply(&Value::Integer(20), 1);
        sum.apply(&Value::Null, 1);
        assert_eq!(sum.get_value(), Value::Integer(30));

        sum.apply(&Value::Integer(10), -1);
        assert_eq!(sum.get_value(), Value::Integer(20));
    }

    #[test]
    fn test_incremental_sum_float() {
        let mut sum = AggregateState::new(Aggregate::Sum, DataType::Float);
        sum.apply(&Value::Float(1.5), 1);
        sum.apply(&Value::Float(2.5), 1);
        assert_eq!(sum.get_value(), Value::Float(4.0));
    }

    fn float_state(aggregate: Aggregate, values: &[f64]) -> AggregateState {
        let mut state = AggregateState::new(aggregate, DataType::Float);
        for v in values {
            state.apply(&Value::Float(*v), 1);
        }
        state
    }

    #[test]
    fn test_float_sum_retraction_is_exact() {
        let mut sum = float_state(Aggregate::Sum, &[0.1, 0.2]);
        sum.apply(&Value::Float(0.1), -1);
        assert_eq!(sum.get_value(), Value::Float(0.2));

        let mut sum = float_state(Aggregate::Sum, &[1e100, 1.0, -1e100]);
        assert_eq!(sum.get_value(), Value::Float(1.0));
        sum.apply(&Value::Float(1.0), -1);
        assert_eq!(sum.get_value(), Value::Float(0.0));

        // Order of arrival does not matter.
        let values = [0.1, 0.7, 1e16, -3.3, 2.5e-8, -1e16];
        let mut reversed = values;
        reversed.reverse();
        assert_eq!(
            float_state(Aggregate::Sum, &values).get_value(),
            float_state(Aggregate::Sum, &reversed).get_value()
        );
    }

    #[test]
    fn test_float_sum_non_finite() {
        let mut sum = float_state(Aggregate::Sum, &[1.5, f64::INFINITY]);
        assert_eq!(sum.get_value(), Value::Float(f64::INFINITY));
        sum.apply(&Value::Float(f64::NEG_INFINITY), 1);
        assert!(sum.get_value().as_f64().is_some_and(f64::is_nan));
        sum.apply(&Value::Float(f64::INFINITY), -1);
        assert_eq!(sum.get_value(), Value::Float(f64::NEG_INFINITY));
        sum.apply(&Value::Float(f64::NEG_INFINITY), -1);
        assert_eq!(sum.get_value(), Value::Float(1.5));

        sum.apply(&Value::Float(f64::NAN), 1);
        assert!(sum.get_value().as_f64().is_some_and(f64::is_nan));
        sum.apply(&Value::Float(f64::NAN), -1);
        sum.apply(&Value::Float(-0.0), 1);
        assert_eq!(sum.get_value(), Value::Float(1.5));
    }

    #[test]
    fn test_float_avg_matches_fresh_state() {
        let mut avg = float_state(Aggregate::Avg, &[0.1, 0.2, 0.3, f64::INFINITY]);
        assert_eq!(avg.get_value(), Value::Float(f64::INFINITY));
        avg.apply(&Value::Float(f64::INFINITY), -1);
        avg.apply(&Value::Float(0.3), -1);
        assert_eq!(avg.get_value(), float_state(Aggregate::Avg, &[0.1, 0.2]).get_value());
    }

    #[test]
    fn test_incremental_avg() {
        let mut avg = AggregateState::new(Aggregate::Avg, DataType::Integer);
        assert_eq!(avg.get_value(), Value::Null);

        avg.apply(&Value::Integer(10), 1);
        avg.apply(&Value::Integer(20), 1);
        avg.apply(&Value::Integer(30), 1);
        avg.apply(&Value::Null, 1);
        assert_eq!(avg.get_value(), Value::Float(20.0));

        avg.apply(&Value::Integer(30), -1);
        assert_eq!(avg.get_value(), Value::Float(15.0));
    }

    #[test]
    fn test_incremental_min_survives_delete() {
        let mut min = AggregateState::new(Aggregate::Min, DataType::Integer);
        for v in [30, 10, 20, 10] {
            min.apply(&Value::Integer(v), 1);
        }
        assert_eq!(min.get_value(), Value::Integer(10));

        // One of two tens leaves: minimum unchanged
        min.apply(&Value::Integer(10), -1);
        assert_eq!(min.get_value(), Value::Integer(10));

        min.apply(&Value::Integer(10), -1);
        assert_eq!(min.get_value(), Value::Integer(20));
    }

    #[test]
    fn test_incremental_max() {
        let mut max = AggregateState::new(Aggregate::Max, DataType::String);
        max.apply(&Value::from("a"), 1);
        max.apply(&Value::from("c"), 1);
        max.apply(&Value::from("b"), 1);
        assert_eq!(max.get_value(), Value::from("c"));

        max.apply(&Value::from("c"), -1);
        assert_eq!(max.get_value(), Value::from("b"));

        max.apply(&Value::from("a"), -1);
        max.apply(&Value::from("b"), -1);
        assert_eq!(max.get_value(), Value::Null);
    }
}
