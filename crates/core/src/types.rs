//! Data type definitions for Vista tables.
//!
//! This module defines the primitive column types a table schema may declare.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Supported column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit signed integer
    Integer,
    /// 64-bit floating point number
    Float,
    /// UTF-8 string
    String,
    /// Boolean type (true/false)
    Boolean,
    /// Date and time stored as Unix timestamp (milliseconds)
    Timestamp,
}

impl DataType {
    /// Returns the lowercase name used in schemas and JSON.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Timestamp => "timestamp",
        }
    }

    /// Returns whether values of this type can be summed and averaged.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    /// Returns whether values of this type have a meaningful min/max.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        !matches!(self, DataType::Boolean)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(DataType::Integer),
            "float" | "double" => Ok(DataType::Float),
            "string" | "str" => Ok(DataType::String),
            "boolean" | "bool" => Ok(DataType::Boolean),
            "timestamp" | "datetime" => Ok(DataType::Timestamp),
            other => Err(Error::schema(format!("unknown column type: {other}"))),
        }
    }
}
