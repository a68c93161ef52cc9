//! Table construction options.

use serde::{Deserialize, Serialize};
use vista_incremental::DEFAULT_COALESCE_AFTER;

/// Options applied when a table is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Column whose values identify rows externally. Values must be unique
    /// and non-null.
    pub index: Option<String>,
    /// Subscriber lag above which pending updates to the same row are
    /// coalesced.
    pub coalesce_after: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            index: None,
            coalesce_after: DEFAULT_COALESCE_AFTER,
        }
    }
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(mut self, column: impl Into<String>) -> Self {
        self.index = Some(column.into());
        self
    }

    pub fn coalesce_after(mut self, lag: usize) -> Self {
        self.coalesce_after = lag;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let options: TableOptions = serde_json::from_str(r#"{"index": "id"}"#).unwrap();
        assert_eq!(options.index.as_deref(), Some("id"));
        assert_eq!(options.coalesce_after, DEFAULT_COALESCE_AFTER);
    }
}
