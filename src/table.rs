use serde::de::Deserializer;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const MAX_CSV_BYTES: usize = 5_000_000;

const DEFAULT_COLUMNS: [&str; 2] = ["Biomarker 1", "Biomarker 2"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("file size should be less than 5MB")]
    TooLarge,
    #[error("the file contains no data rows")]
    Empty,
    #[error("cannot delete the last column")]
    LastColumn,
    #[error("a column named \"{0}\" already exists")]
    DuplicateColumn(String),
    #[error("invalid CSV: {0}")]
    Csv(String),
}

/// Tabular payload attached to a message.
///
/// On the wire this is an array of records keyed by column name, in column
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn from_csv(bytes: &[u8]) -> Result<Self, TableError> {
        if bytes.len() > MAX_CSV_BYTES {
            return Err(TableError::TooLarge);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|err| TableError::Csv(err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        for (index, column) in columns.iter().enumerate() {
            if columns[..index].contains(column) {
                return Err(TableError::DuplicateColumn(column.clone()));
            }
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| TableError::Csv(err.to_string()))?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            if record.len() > columns.len() {
                let line = record.position().map_or(0, |position| position.line());
                return Err(TableError::Csv(format!(
                    "line {line} has {} fields but the header has {}",
                    record.len(),
                    columns.len()
                )));
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(columns.len(), String::new());
            rows.push(row);
        }

        if columns.is_empty() || rows.is_empty() {
            return Err(TableError::Empty);
        }

        Ok(Self { columns, rows })
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

struct Record<'a> {
    columns: &'a [String],
    row: &'a [String],
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (index, column) in self.columns.iter().enumerate() {
            let cell = self.row.get(index).map(String::as_str).unwrap_or("");
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&Record {
                columns: &self.columns,
                row,
            })?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Table {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Vec::<Map<String, Value>>::deserialize(deserializer)?;
        Ok(Self::from_records(records))
    }
}

/// Editable table held by the composer until the message is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDraft {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableDraft {
    pub fn blank() -> Self {
        let columns: Vec<String> = DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect();
        let rows = vec![vec![String::new(); columns.len()]];
        Self { columns, rows }
    }

    pub fn from_csv(bytes: &[u8]) -> Result<Self, TableError> {
        let table = Table::from_csv(bytes)?;
        Ok(Self {
            columns: table.columns,
            rows: table.rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn add_column(&mut self, name: &str) -> Result<(), TableError> {
        let name = name.trim();
        let name = if name.is_empty() {
            format!("Column {}", self.columns.len() + 1)
        } else {
            name.to_string()
        };
        if self.columns.contains(&name) {
            return Err(TableError::DuplicateColumn(name));
        }

        self.columns.push(name);
        for row in &mut self.rows {
            row.push(String::new());
        }
        Ok(())
    }

    pub fn rename_column(&mut self, index: usize, name: &str) -> Result<(), TableError> {
        let name = name.trim();
        let Some(current) = self.columns.get(index) else {
            return Ok(());
        };
        if name.is_empty() || name == current {
            return Ok(());
        }
        if self.columns.iter().any(|column| column == name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }

        self.columns[index] = name.to_string();
        Ok(())
    }

    pub fn delete_column(&mut self, index: usize) -> Result<(), TableError> {
        if self.columns.len() <= 1 {
            return Err(TableError::LastColumn);
        }
        if index >= self.columns.len() {
            return Ok(());
        }

        self.columns.remove(index);
        for row in &mut self.rows {
            if index < row.len() {
                row.remove(index);
            }
        }
        Ok(())
    }

    pub fn add_row(&mut self) {
        self.rows.push(vec![String::new(); self.columns.len()]);
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: impl Into<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value.into();
        }
    }

    pub fn to_table(&self) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
        }
    }
}
