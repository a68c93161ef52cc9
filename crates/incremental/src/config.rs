//! View configuration.
//!
//! `ViewConfig` is the user-facing, serde-loadable description of a view;
//! `ViewConfig::resolve` validates it against a table schema and produces a
//! `ResolvedConfig` addressed by column position.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vista_core::{ColumnId, DataType, Error, Result, Schema, Value};

use crate::materialize::GroupKey;

/// Aggregate function applied to a value column within each group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Sum,
    #[serde(alias = "mean", alias = "average")]
    Avg,
    Count,
    Min,
    Max,
}

impl Aggregate {
    /// Default aggregate for a column of the given type.
    pub fn default_for(dt: DataType) -> Self {
        if dt.is_numeric() {
            Aggregate::Sum
        } else {
            Aggregate::Count
        }
    }

    /// Returns whether this aggregate can be computed over `dt` values.
    pub fn accepts(&self, dt: DataType) -> bool {
        match self {
            Aggregate::Sum | Aggregate::Avg => dt.is_numeric(),
            Aggregate::Min | Aggregate::Max => dt.is_ordered(),
            Aggregate::Count => true,
        }
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Sort on one output column. Serializes as `["column", "asc" | "desc"]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, SortOrder)", into = "(String, SortOrder)")]
pub struct Sort {
    pub column: String,
    pub order: SortOrder,
}

impl From<(String, SortOrder)> for Sort {
    fn from((column, order): (String, SortOrder)) -> Self {
        Sort { column, order }
    }
}

impl From<Sort> for (String, SortOrder) {
    fn from(sort: Sort) -> Self {
        (sort.column, sort.order)
    }
}

/// Filter operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "begins with")]
    BeginsWith,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "is null")]
    IsNull,
    #[serde(rename = "is not null")]
    IsNotNull,
}

/// A row predicate on one column.
///
/// `value` is the operand of comparison and string operators; `values` is
/// the operand list of `in`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    #[serde(default = "null_value")]
    pub value: Value,
    #[serde(default)]
    pub values: Vec<Value>,
}

fn null_value() -> Value {
    Value::Null
}

impl Filter {
    /// Creates a filter with a single operand.
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
            values: Vec::new(),
        }
    }

    /// Creates an `in` filter.
    pub fn one_of<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            column: column.into(),
            op: FilterOp::In,
            value: Value::Null,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates an operand-free filter (`is null` / `is not null`).
    pub fn unary(column: impl Into<String>, op: FilterOp) -> Self {
        Self::new(column, op, Value::Null)
    }
}

/// Configuration of a view over one table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Columns to group by, outermost first.
    pub row_pivots: Vec<String>,
    /// Columns whose distinct values split every value column, outermost
    /// first.
    pub column_pivots: Vec<String>,
    /// Value columns to show; all non-pivot columns when unset.
    pub columns: Option<Vec<String>>,
    /// Aggregate per value column; unset columns use `Aggregate::default_for`.
    pub aggregates: BTreeMap<String, Aggregate>,
    /// Sibling order; first-seen order when empty.
    pub sort: Vec<Sort>,
    /// Row predicates, all of which must hold.
    pub filters: Vec<Filter>,
    /// Emit the grand total and intermediate pivot levels as rows.
    pub rollups: bool,
    /// Keep only the first `limit` output rows.
    pub limit: Option<usize>,
}

impl ViewConfig {
    /// Creates an empty config (a flat projection of every column).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_pivot(mut self, column: impl Into<String>) -> Self {
        self.row_pivots.push(column.into());
        self
    }

    pub fn column_pivot(mut self, column: impl Into<String>) -> Self {
        self.column_pivots.push(column.into());
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn aggregate(mut self, column: impl Into<String>, aggregate: Aggregate) -> Self {
        self.aggregates.insert(column.into(), aggregate);
        self
    }

    pub fn sort(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(Sort {
            column: column.into(),
            order,
        });
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn rollups(mut self, rollups: bool) -> Self {
        self.rollups = rollups;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Validates this config against `schema`.
    pub fn resolve(&self, schema: &Schema) -> Result<ResolvedConfig> {
        let lookup = |column: &str, role: &str| {
            schema
                .index_of(column)
                .ok_or_else(|| Error::config(format!("{role} column not in schema: {column}")))
        };

        let mut pivots = Vec::with_capacity(self.row_pivots.len());
        for name in &self.row_pivots {
            let id = lookup(name, "pivot")?;
            if pivots.contains(&id) {
                return Err(Error::config(format!("column pivoted twice: {name}")));
            }
            pivots.push(id);
        }

        let mut column_pivots = Vec::with_capacity(self.column_pivots.len());
        for name in &self.column_pivots {
            let id = lookup(name, "column pivot")?;
            if pivots.contains(&id) || column_pivots.contains(&id) {
                return Err(Error::config(format!("column pivoted twice: {name}")));
            }
            column_pivots.push(id);
        }
        if self.limit == Some(0) {
            return Err(Error::config("view limit must be positive"));
        }

        for (name, aggregate) in &self.aggregates {
            let id = lookup(name, "aggregate")?;
            let dt = schema.data_type(id);
            if !aggregate.accepts(dt) {
                return Err(Error::config(format!(
                    "{aggregate:?} cannot aggregate {dt} column {name}"
                )));
            }
        }

        let value_names: Vec<&str> = match &self.columns {
            Some(columns) => columns.iter().map(String::as_str).collect(),
            None => schema.names().collect(),
        };

        let mut outputs: Vec<OutputColumn> = pivots
            .iter()
            .map(|&id| OutputColumn {
                name: schema.name(id).to_string(),
                source: id,
                aggregate: None,
            })
            .collect();
        for name in value_names {
            let id = lookup(name, "value")?;
            if pivots.contains(&id) || outputs[pivots.len()..].iter().any(|o| o.source == id) {
                continue;
            }
            let aggregate = if pivots.is_empty() {
                None
            } else {
                Some(
                    self.aggregates
                        .get(name)
                        .copied()
                        .unwrap_or_else(|| Aggregate::default_for(schema.data_type(id))),
                )
            };
            outputs.push(OutputColumn {
                name: name.to_string(),
                source: id,
                aggregate,
            });
        }

        let mut sort = Vec::with_capacity(self.sort.len());
        for s in &self.sort {
            let position = outputs
                .iter()
                .position(|o| o.name == s.column)
                .ok_or_else(|| Error::config(format!("sort column not in view: {}", s.column)))?;
            sort.push((position, s.order));
        }

        let mut filters = Vec::with_capacity(self.filters.len());
        for f in &self.filters {
            let id = lookup(&f.column, "filter")?;
            filters.push(ResolvedFilter::resolve(f, id, schema.data_type(id))?);
        }

        let mut reads: Vec<ColumnId> = outputs.iter().map(|o| o.source).collect();
        reads.extend(&column_pivots);
        reads.extend(filters.iter().map(|f| f.column));
        reads.sort_unstable();
        reads.dedup();

        Ok(ResolvedConfig {
            pivots,
            column_pivots,
            outputs,
            sort,
            filters,
            rollups: self.rollups,
            limit: self.limit,
            reads,
        })
    }
}

/// One column of view output.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    /// Table column the output is computed from.
    pub source: ColumnId,
    /// `None` for pivot columns and for flat views.
    pub aggregate: Option<Aggregate>,
}

/// A filter with its operand coerced to the column type.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedFilter {
    pub column: ColumnId,
    pub op: FilterOp,
    pub value: Value,
    pub values: Vec<Value>,
}

impl ResolvedFilter {
    fn resolve(filter: &Filter, column: ColumnId, dt: DataType) -> Result<Self> {
        let coerce = |v: &Value| -> Result<Value> {
            match v.clone().coerce_to(dt) {
                Some(Value::Null) | None => Err(Error::config(format!(
                    "filter operand {v:?} does not fit {dt} column {}",
                    filter.column
                ))),
                Some(coerced) => Ok(coerced),
            }
        };

        let (value, values) = match filter.op {
            FilterOp::IsNull | FilterOp::IsNotNull => (Value::Null, Vec::new()),
            FilterOp::In => (
                Value::Null,
                filter.values.iter().map(coerce).collect::<Result<Vec<_>>>()?,
            ),
            FilterOp::Contains | FilterOp::BeginsWith => {
                if dt != DataType::String || filter.value.as_str().is_none() {
                    return Err(Error::config(format!(
                        "{:?} needs a string column and operand: {}",
                        filter.op, filter.column
                    )));
                }
                (filter.value.clone(), Vec::new())
            }
            _ => (coerce(&filter.value)?, Vec::new()),
        };

        Ok(ResolvedFilter {
            column,
            op: filter.op,
            value,
            values,
        })
    }
}

/// A view config validated against a schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfig {
    /// Pivot columns, outermost first.
    pub pivots: Vec<ColumnId>,
    pub column_pivots: Vec<ColumnId>,
    /// Output columns: pivots first, then value columns. With column pivots
    /// this is the unsplit layout that sorting compares.
    pub outputs: Vec<OutputColumn>,
    /// `(output position, order)` pairs.
    pub sort: Vec<(usize, SortOrder)>,
    pub filters: Vec<ResolvedFilter>,
    pub rollups: bool,
    pub limit: Option<usize>,
    /// Every table column the view reads, ascending.
    pub reads: Vec<ColumnId>,
}

impl ResolvedConfig {
    /// Returns true when the view groups rows.
    #[inline]
    pub fn is_pivoted(&self) -> bool {
        !self.pivots.is_empty()
    }

    /// Value columns (everything after the pivot columns).
    pub fn value_columns(&self) -> &[OutputColumn] {
        &self.outputs[self.pivots.len()..]
    }

    /// Returns true when value columns are split by column pivot values.
    #[inline]
    pub fn is_split(&self) -> bool {
        !self.column_pivots.is_empty()
    }

    /// Output column names in order, given the column pivot keys present
    /// in the view. A split column is named by its key values and its
    /// source column, joined by `|`.
    pub fn column_names(&self, column_keys: &[GroupKey]) -> Vec<String> {
        if !self.is_split() {
            return self.outputs.iter().map(|o| o.name.clone()).collect();
        }
        let (pivots, values) = self.outputs.split_at(self.pivots.len());
        let mut names: Vec<String> = pivots.iter().map(|o| o.name.clone()).collect();
        for key in column_keys {
            let prefix = key.iter().map(Value::to_string).collect::<Vec<_>>().join("|");
            names.extend(values.iter().map(|o| format!("{prefix}|{}", o.name)));
        }
        names
    }
}
