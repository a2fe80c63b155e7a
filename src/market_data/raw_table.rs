// =============================================================================
// Raw OHLCV Table
// =============================================================================
//
// The loosely-typed shape in which price history arrives from a provider or
// from the dashboard: an optional index plus named columns of JSON cells.
// Nothing here is trusted yet; `normalizer` turns it into an `OhlcvSeries`.
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One named column of raw cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    #[serde(default)]
    pub values: Vec<Value>,
}

/// Table-like OHLCV input.
///
/// `index == None` means a positional (0, 1, 2, ...) index; the normalizer
/// then looks for a date-like column to promote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    #[serde(default)]
    pub index: Option<Vec<Value>>,
    #[serde(default)]
    pub columns: Vec<RawColumn>,
}

impl RawTable {
    pub fn new(index: Option<Vec<Value>>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Builder-style column append.
    pub fn with_column(mut self, name: &str, values: Vec<Value>) -> Self {
        self.columns.push(RawColumn {
            name: name.to_string(),
            values,
        });
        self
    }

    /// Build a table from list-of-records JSON (`[{"date": .., "close": ..}]`).
    ///
    /// Columns appear in first-seen order.  A record missing a key gets a
    /// `null` cell for it.
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|r| r.get(&name).cloned().unwrap_or(Value::Null))
                    .collect();
                RawColumn { name, values }
            })
            .collect();

        Self {
            index: None,
            columns,
        }
    }

    /// Case-insensitive column lookup (`Close`, `close`, `CLOSE`).
    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Number of rows, taken from the index or else the first column.
    pub fn row_count(&self) -> usize {
        match &self.index {
            Some(index) => index.len(),
            None => self.columns.first().map_or(0, |c| c.values.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}
