//! Table schema definitions.
//!
//! A schema is an ordered list of uniquely named, typed columns. Column
//! positions are stable for the lifetime of a table and double as the
//! column ids carried by deltas.

mod column;

pub use column::Column;

use crate::error::{Error, Result};
use crate::types::DataType;

/// Position of a column within its schema.
pub type ColumnId = usize;

/// An ordered mapping from column name to primitive type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Creates a schema from `(name, type)` pairs, validating names.
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        columns
            .into_iter()
            .try_fold(SchemaBuilder::new(), |b, (name, dt)| b.add_column(name, dt))?
            .build()
    }

    /// Starts a schema builder.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Returns the columns in declaration order.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Gets a column position by name.
    pub fn index_of(&self, name: &str) -> Option<ColumnId> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Gets a column position by name, failing with a schema error.
    pub fn require(&self, name: &str) -> Result<ColumnId> {
        self.index_of(name)
            .ok_or_else(|| Error::schema(format!("unknown column: {name}")))
    }

    /// Returns the column name at a position.
    ///
    /// Panics if `id` is out of range; ids come from this schema.
    #[inline]
    pub fn name(&self, id: ColumnId) -> &str {
        self.columns[id].name()
    }

    /// Returns the data type at a position.
    #[inline]
    pub fn data_type(&self, id: ColumnId) -> DataType {
        self.columns[id].data_type()
    }

    /// Iterates column names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name())
    }
}

/// Builder for schemas.
#[derive(Default)]
pub struct SchemaBuilder {
    columns: Vec<Column>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::schema("column name cannot be empty"));
        }
        if self.columns.iter().any(|c| c.name() == name) {
            return Err(Error::schema(format!("column already exists: {name}")));
        }
        self.columns.push(Column::new(name, data_type));
        Ok(self)
    }

    /// Finishes the schema.
    pub fn build(self) -> Result<Schema> {
        Ok(Schema {
            columns: self.columns,
        })
    }
}
