//! Schema inference for raw records and columns.
//!
//! The first non-null value of a column decides its type. Integer columns
//! widen to Float when a float shows up later; an Integer seen in a
//! Timestamp column is accepted as a timestamp.

use vista_core::{CellMismatch, DataType, Error, Record, Result, Schema, Value};

/// Column-oriented input: `(name, values)` pairs of equal length.
pub type Columns = Vec<(String, Vec<Value>)>;

fn widen(current: DataType, seen: DataType) -> Option<DataType> {
    use DataType::*;
    match (current, seen) {
        (a, b) if a == b => Some(a),
        (Integer, Float) | (Float, Integer) => Some(Float),
        (Timestamp, Integer) => Some(Timestamp),
        _ => None,
    }
}

struct Inference {
    names: Vec<String>,
    types: Vec<Option<DataType>>,
    conflicts: Vec<CellMismatch>,
}

impl Inference {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            types: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    fn column(&mut self, name: &str) -> usize {
        match self.names.iter().position(|n| n == name) {
            Some(i) => i,
            None => {
                self.names.push(name.to_string());
                self.types.push(None);
                self.names.len() - 1
            }
        }
    }

    fn observe(&mut self, row: usize, column: usize, value: &Value) {
        let Some(seen) = value.data_type() else {
            return;
        };
        match self.types[column] {
            None => self.types[column] = Some(seen),
            Some(current) => match widen(current, seen) {
                Some(dt) => self.types[column] = Some(dt),
                None => self.conflicts.push(CellMismatch {
                    row,
                    column: self.names[column].clone(),
                    expected: current,
                    got: Some(seen),
                }),
            },
        }
    }

    fn finish(self) -> Result<Schema> {
        if !self.conflicts.is_empty() {
            return Err(Error::type_mismatch(self.conflicts));
        }
        if self.names.is_empty() {
            return Err(Error::schema("cannot infer a schema from empty input"));
        }
        let mut columns = Vec::with_capacity(self.names.len());
        for (name, dt) in self.names.into_iter().zip(self.types) {
            match dt {
                Some(dt) => columns.push((name, dt)),
                None => {
                    return Err(Error::schema(format!(
                        "cannot infer type of all-null column: {name}"
                    )))
                }
            }
        }
        Schema::new(columns)
    }
}

/// Infers a schema from records. Columns appear in first-seen order.
pub fn infer_records(records: &[Record]) -> Result<Schema> {
    let mut inference = Inference::new();
    for (row, record) in records.iter().enumerate() {
        for (name, value) in record.iter() {
            let column = inference.column(name);
            inference.observe(row, column, value);
        }
    }
    inference.finish()
}

/// Infers a schema from columns, which must all have the same length.
pub fn infer_columns(columns: &Columns) -> Result<Schema> {
    if let Some((first, values)) = columns.first() {
        for (name, other) in &columns[1..] {
            if other.len() != values.len() {
                return Err(Error::schema(format!(
                    "column {name} has {} values, column {first} has {}",
                    other.len(),
                    values.len()
                )));
            }
        }
    }
    let mut inference = Inference::new();
    for (name, values) in columns {
        let column = inference.column(name);
        for (row, value) in values.iter().enumerate() {
            inference.observe(row, column, value);
        }
    }
    inference.finish()
}

/// Turns column-oriented input into records.
pub fn columns_to_records(columns: Columns) -> Vec<Record> {
    let len = columns.first().map_or(0, |(_, v)| v.len());
    let mut records = vec![Record::new(); len];
    for (name, values) in columns {
        for (record, value) in records.iter_mut().zip(values) {
            record.set(name.clone(), value);
        }
    }
    records
}
