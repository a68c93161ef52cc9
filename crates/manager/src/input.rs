//! Polymorphic table input, resolved once at the manager boundary.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;
use vista_core::{DataType, Error, Record, Result, Schema, Value};
use vista_storage::{Columns, Table, TableOptions};

/// Everything [`Manager::load`](crate::Manager::load) accepts.
pub enum TableInput {
    /// An already built table.
    Existing(Arc<Table>),
    /// Row-oriented data; the schema is inferred.
    Records(Vec<Record>),
    /// Column-oriented data; the schema is inferred.
    Columns(Columns),
    /// An empty table with this schema.
    Schema(Schema),
}

impl TableInput {
    /// Parses JSON input.
    ///
    /// - an array of objects is row data
    /// - an object of arrays is column data
    /// - an object of type names (`"integer"`, `"float"`, `"string"`,
    ///   `"boolean"`, `"timestamp"`) is a schema
    ///
    /// Column order follows the document. Anything else is a `Schema` error.
    pub fn from_json(input: &str) -> Result<Self> {
        let json: Json =
            serde_json::from_str(input).map_err(|e| Error::schema(format!("invalid JSON input: {e}")))?;
        match json {
            Json::Array(rows) => rows
                .into_iter()
                .enumerate()
                .map(|(i, row)| match row {
                    Json::Object(fields) => fields
                        .into_iter()
                        .map(|(name, cell)| Ok((name, cell_value(cell)?)))
                        .collect::<Result<Record>>(),
                    other => Err(Error::schema(format!(
                        "row {i}: expected an object, got {}",
                        kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(TableInput::Records),
            Json::Object(fields) if fields.values().all(Json::is_string) => {
                let columns = fields
                    .into_iter()
                    .map(|(name, ty)| {
                        let ty: DataType = ty.as_str().unwrap_or_default().parse()?;
                        Ok((name, ty))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(TableInput::Schema(Schema::new(columns)?))
            }
            Json::Object(fields) => fields
                .into_iter()
                .map(|(name, column)| match column {
                    Json::Array(cells) => {
                        let values = cells.into_iter().map(cell_value).collect::<Result<Vec<_>>>()?;
                        Ok((name, values))
                    }
                    other => Err(Error::schema(format!(
                        "column {name}: expected an array or a type name, got {}",
                        kind(&other)
                    ))),
                })
                .collect::<Result<Columns>>()
                .map(TableInput::Columns),
            other => Err(Error::schema(format!(
                "expected an array or an object, got {}",
                kind(&other)
            ))),
        }
    }

    /// Builds the table this input describes. `Existing` tables are returned
    /// as they are and `options` is ignored for them.
    pub fn into_table(self, options: TableOptions) -> Result<Arc<Table>> {
        match self {
            TableInput::Existing(table) => Ok(table),
            TableInput::Records(records) => Ok(Arc::new(Table::from_records(records, options)?)),
            TableInput::Columns(columns) => Ok(Arc::new(Table::from_columns(columns, options)?)),
            TableInput::Schema(schema) => Ok(Arc::new(Table::new(schema, options)?)),
        }
    }
}

impl From<Arc<Table>> for TableInput {
    fn from(table: Arc<Table>) -> Self {
        TableInput::Existing(table)
    }
}

impl From<Vec<Record>> for TableInput {
    fn from(records: Vec<Record>) -> Self {
        TableInput::Records(records)
    }
}

impl From<Schema> for TableInput {
    fn from(schema: Schema) -> Self {
        TableInput::Schema(schema)
    }
}

impl fmt::Debug for TableInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableInput::Existing(table) => f.debug_tuple("Existing").field(&table.id()).finish(),
            TableInput::Records(records) => write!(f, "Records({} rows)", records.len()),
            TableInput::Columns(columns) => write!(f, "Columns({} columns)", columns.len()),
            TableInput::Schema(schema) => f.debug_tuple("Schema").field(schema).finish(),
        }
    }
}

fn cell_value(cell: Json) -> Result<Value> {
    match cell {
        Json::Array(_) | Json::Object(_) => Err(Error::schema(format!(
            "unsupported cell value: {}",
            kind(&cell)
        ))),
        scalar => serde_json::from_value(scalar)
            .map_err(|e| Error::schema(format!("unsupported cell value: {e}"))),
    }
}

fn kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}
